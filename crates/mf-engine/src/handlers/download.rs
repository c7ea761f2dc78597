use std::sync::Arc;

use async_trait::async_trait;
use mf_core::models::{Download, DownloadStatus, RequestKind};
use mf_core::repository::StateStore;

use crate::context::{ContextSlice, DownloadOutput, PipelineContext};
use crate::error::{EngineError, EngineResult};
use crate::ports::{DownloadClientAdapter, ReleaseCandidate};
use crate::registry::{ProgressSink, StepHandler, StepOutput};
use crate::template::StepType;

/// DOWNLOAD: starts (or reuses) an external download for the release
/// selected by SEARCH, recording the download's id in context and pausing
/// the branch until a recovery worker or the client adapter observes
/// completion (spec.md §1: "records an external handle ... returns").
pub struct DownloadHandler {
    pub store: Arc<StateStore>,
    pub client: Arc<dyn DownloadClientAdapter>,
}

#[async_trait]
impl StepHandler for DownloadHandler {
    fn kind(&self) -> StepType {
        StepType::Download
    }

    fn validate_config(&self, _config: &serde_json::Value) -> EngineResult<()> {
        Ok(())
    }

    async fn execute(
        &self,
        context: &serde_json::Value,
        config: &serde_json::Value,
        progress: Arc<dyn ProgressSink>,
    ) -> EngineResult<StepOutput> {
        let ctx = PipelineContext::from_json(context.clone());

        if let Some(download) = &ctx.download {
            if download.already_present || download.content_path.is_some() {
                progress.report(100.0).await;
                return Ok(StepOutput::ok(ContextSlice::Download(download.clone())));
            }
            // Already started in a prior (paused) pass: check whether the
            // backing Download row finished without re-issuing the client call.
            if let Some(download_id) = &download.download_id {
                if let Some(row) = self.store.downloads.get(download_id).await? {
                    if row.status == DownloadStatus::Completed {
                        progress.report(100.0).await;
                        let out = DownloadOutput {
                            download_id: Some(row.id),
                            content_path: row.content_path.clone(),
                            source_file_path: row.content_path,
                            already_present: false,
                        };
                        return Ok(StepOutput::ok(ContextSlice::Download(out)));
                    }
                }
                return Ok(StepOutput::pause("awaiting download completion"));
            }
        }

        let search = ctx
            .search
            .clone()
            .ok_or_else(|| EngineError::InvalidConfig("DOWNLOAD step requires SEARCH output".into()))?;
        let torrent_hash = search
            .torrent_hash
            .clone()
            .ok_or_else(|| EngineError::InvalidConfig("SEARCH output missing torrent_hash".into()))?;

        if let Some(existing) = self.store.downloads.get_by_torrent_hash(&torrent_hash).await? {
            progress.report(50.0).await;
            let out = DownloadOutput {
                download_id: Some(existing.id),
                content_path: existing.content_path.clone(),
                source_file_path: None,
                already_present: existing.status == DownloadStatus::Completed,
            };
            return Ok(match out.already_present {
                true => StepOutput::ok(ContextSlice::Download(out)),
                false => StepOutput::pause("awaiting download completion").with_data(ContextSlice::Download(out)),
            });
        }

        let request_id = ctx.request["id"].as_str().unwrap_or_default().to_string();
        let kind = if ctx.request["season"].is_i64() {
            RequestKind::Tv
        } else {
            RequestKind::Movie
        };
        let save_path = config["save_path"]
            .as_str()
            .unwrap_or("/data/downloads")
            .to_string();

        let candidate = ReleaseCandidate {
            indexer: search.indexer.clone().unwrap_or_default(),
            release_name: search.torrent_name.clone().unwrap_or_default(),
            torrent_hash: torrent_hash.clone(),
            download_uri: torrent_hash.clone(),
            season_pack: search.season_pack,
            size: None,
        };

        self.client
            .start(&candidate, &save_path)
            .await
            .map_err(|e| EngineError::Other(anyhow::anyhow!(e.to_string())))?;

        let download = Download::new(
            uuid::Uuid::new_v4().to_string(),
            request_id,
            torrent_hash,
            candidate.release_name,
            kind,
            save_path,
        );
        self.store.downloads.insert(&download).await?;
        progress.report(25.0).await;

        Ok(StepOutput::pause("awaiting download completion").with_data(ContextSlice::Download(DownloadOutput {
            download_id: Some(download.id),
            content_path: None,
            source_file_path: None,
            already_present: false,
        })))
    }
}
