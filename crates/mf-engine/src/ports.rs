//! Ports for the external collaborators spec.md §1 calls out as
//! "interfaces only, not specified in depth": indexers, the download
//! client, delivery targets, and notification sinks. `mf-adapters`
//! provides concrete implementations; handlers in [`crate::handlers`]
//! only depend on these traits, injected at the composition root (spec.md
//! §9 "Global singletons").

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("transient network error: {0}")]
    TransientNetwork(String),
    #[error("rate limited, retry after {retry_after_ms}ms: {message}")]
    RateLimited { message: String, retry_after_ms: u64 },
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("invalid request: {0}")]
    Invalid(String),
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AdapterError {
    /// Whether spec.md §7's error taxonomy treats this as retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TransientNetwork(_) | Self::RateLimited { .. } | Self::ServiceUnavailable(_)
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReleaseQuery {
    pub title: String,
    pub year: Option<i32>,
    pub season: Option<i32>,
    pub episode: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct ReleaseCandidate {
    pub indexer: String,
    pub release_name: String,
    pub torrent_hash: String,
    pub download_uri: String,
    pub season_pack: bool,
    pub size: Option<i64>,
}

/// Release search across indexers (spec.md §1 C8, §4.1 SEARCH step).
#[async_trait]
pub trait IndexerAdapter: Send + Sync {
    async fn search(&self, query: &ReleaseQuery) -> Result<Vec<ReleaseCandidate>, AdapterError>;
}

#[derive(Debug, Clone)]
pub struct DownloadStatusInfo {
    pub progress: f32,
    pub completed: bool,
    pub content_path: Option<String>,
    pub size: Option<i64>,
}

/// The external download client (spec.md §1 C8, §4.1 DOWNLOAD step).
#[async_trait]
pub trait DownloadClientAdapter: Send + Sync {
    async fn start(&self, candidate: &ReleaseCandidate, save_path: &str) -> Result<String, AdapterError>;
    async fn status(&self, torrent_hash: &str) -> Result<DownloadStatusInfo, AdapterError>;
}

/// A storage target delivery receives files to (spec.md §1 C8, §4.1
/// DELIVER step).
#[async_trait]
pub trait DeliveryAdapter: Send + Sync {
    async fn deliver(&self, target: &str, source_path: &str) -> Result<String, AdapterError>;
    async fn exists(&self, target: &str, expected_path: &str) -> Result<bool, AdapterError>;
}

/// Outbound notification sink (webhook/email/chat), spec.md §1 C8, §4.1
/// NOTIFICATION step.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn notify(&self, sink: &str, message: &str) -> Result<(), AdapterError>;
}
