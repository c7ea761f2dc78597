//! Delivery targets: local filesystem destinations a finished file is
//! copied into. Grounded on the document store's storage-path
//! conventions (a named root directory, parent directories created on
//! demand) generalized from content-addressed paths to the configured
//! per-target layout a media library expects.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use mf_engine::ports::{AdapterError, DeliveryAdapter};
use tracing::debug;

/// Maps a delivery target name (e.g. "plex", "nas") to the root
/// directory it copies into.
#[derive(Debug, Clone, Default)]
pub struct DeliveryTargets {
    roots: HashMap<String, PathBuf>,
}

impl DeliveryTargets {
    pub fn new(roots: HashMap<String, PathBuf>) -> Self {
        Self { roots }
    }

    fn root(&self, target: &str) -> Result<&Path, AdapterError> {
        self.roots
            .get(target)
            .map(PathBuf::as_path)
            .ok_or_else(|| AdapterError::Invalid(format!("unknown delivery target: {target}")))
    }
}

pub struct LocalFilesystemDeliveryAdapter {
    targets: DeliveryTargets,
}

impl LocalFilesystemDeliveryAdapter {
    pub fn new(targets: DeliveryTargets) -> Self {
        Self { targets }
    }

    fn destination_path(&self, target: &str, source_path: &str) -> Result<PathBuf, AdapterError> {
        let root = self.targets.root(target)?;
        let filename = Path::new(source_path)
            .file_name()
            .ok_or_else(|| AdapterError::Invalid(format!("source path has no filename: {source_path}")))?;
        Ok(root.join(filename))
    }
}

#[async_trait]
impl DeliveryAdapter for LocalFilesystemDeliveryAdapter {
    async fn deliver(&self, target: &str, source_path: &str) -> Result<String, AdapterError> {
        let destination = self.destination_path(target, source_path)?;
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AdapterError::Other(e.into()))?;
        }
        tokio::fs::copy(source_path, &destination)
            .await
            .map_err(|e| AdapterError::Other(anyhow::anyhow!("failed to deliver to {target}: {e}")))?;
        debug!(target, destination = %destination.display(), "delivered file");
        Ok(destination.to_string_lossy().into_owned())
    }

    async fn exists(&self, target: &str, expected_path: &str) -> Result<bool, AdapterError> {
        let destination = self.destination_path(target, expected_path)?;
        Ok(tokio::fs::metadata(&destination).await.is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter_with_root(dir: &Path) -> LocalFilesystemDeliveryAdapter {
        let mut roots = HashMap::new();
        roots.insert("plex".to_string(), dir.to_path_buf());
        LocalFilesystemDeliveryAdapter::new(DeliveryTargets::new(roots))
    }

    #[tokio::test]
    async fn deliver_copies_file_into_target_root() {
        let src_dir = tempfile::tempdir().unwrap();
        let dst_dir = tempfile::tempdir().unwrap();
        let source_path = src_dir.path().join("Arrival.2016.mkv");
        tokio::fs::write(&source_path, b"movie bytes").await.unwrap();

        let adapter = adapter_with_root(dst_dir.path());
        let delivered = adapter
            .deliver("plex", source_path.to_str().unwrap())
            .await
            .unwrap();

        assert!(tokio::fs::metadata(&delivered).await.is_ok());
    }

    #[tokio::test]
    async fn exists_is_false_before_delivery_and_true_after() {
        let src_dir = tempfile::tempdir().unwrap();
        let dst_dir = tempfile::tempdir().unwrap();
        let source_path = src_dir.path().join("Arrival.2016.mkv");
        tokio::fs::write(&source_path, b"movie bytes").await.unwrap();

        let adapter = adapter_with_root(dst_dir.path());
        let source_str = source_path.to_str().unwrap();
        assert!(!adapter.exists("plex", source_str).await.unwrap());

        adapter.deliver("plex", source_str).await.unwrap();
        assert!(adapter.exists("plex", source_str).await.unwrap());
    }

    #[tokio::test]
    async fn unknown_target_is_invalid() {
        let dst_dir = tempfile::tempdir().unwrap();
        let adapter = adapter_with_root(dst_dir.path());
        let err = adapter.exists("unknown", "/tmp/x.mkv").await.unwrap_err();
        assert!(matches!(err, AdapterError::Invalid(_)));
    }
}
