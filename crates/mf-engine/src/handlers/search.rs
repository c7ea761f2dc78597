use std::sync::Arc;

use async_trait::async_trait;
use mf_core::rate_limit::{Admission, RateLimiter};

use crate::context::{ContextSlice, PipelineContext, SearchOutput};
use crate::error::EngineResult;
use crate::ports::{IndexerAdapter, ReleaseQuery};
use crate::registry::{ProgressSink, StepHandler, StepOutput};
use crate::template::StepType;

/// SEARCH: queries indexers for a release matching the request (or
/// episode, for branch executions), admitted through the shared rate
/// limiter (spec.md §4.6).
pub struct SearchHandler {
    pub indexer: Arc<dyn IndexerAdapter>,
    pub rate_limiter: RateLimiter,
}

#[async_trait]
impl StepHandler for SearchHandler {
    fn kind(&self) -> StepType {
        StepType::Search
    }

    fn validate_config(&self, config: &serde_json::Value) -> EngineResult<()> {
        if !config.is_object() {
            return Err(crate::error::EngineError::InvalidConfig(
                "SEARCH config must be an object".into(),
            ));
        }
        Ok(())
    }

    async fn execute(
        &self,
        context: &serde_json::Value,
        config: &serde_json::Value,
        progress: Arc<dyn ProgressSink>,
    ) -> EngineResult<StepOutput> {
        let ctx = PipelineContext::from_json(context.clone());
        if ctx.search.as_ref().is_some_and(|s| s.release_id.is_some()) {
            return Ok(StepOutput::ok(ContextSlice::Search(ctx.search.unwrap())));
        }

        let title = ctx.request["title"].as_str().unwrap_or_default().to_string();
        let year = ctx.request["year"].as_i64().map(|y| y as i32);
        let season = ctx.request["season"].as_i64().map(|s| s as i32);
        let episode = ctx.request["episode"].as_i64().map(|e| e as i32);
        let indexer_name = config["indexer"].as_str().unwrap_or("default").to_string();
        let max_requests = config["rate_limit_max"].as_u64().unwrap_or(10) as u32;
        let window_secs = config["rate_limit_window_secs"].as_u64().unwrap_or(60) as u32;

        let admission = self
            .rate_limiter
            .try_acquire(&indexer_name, max_requests, window_secs)
            .await
            .map_err(|e| crate::error::EngineError::Other(anyhow::anyhow!(e.to_string())))?;
        if let Admission::Denied { retry_after } = admission {
            return Ok(StepOutput::fail(format!(
                "rate limited by {indexer_name}, retry after {}ms",
                retry_after.as_millis()
            )));
        }

        progress.report(25.0).await;
        let candidates = self
            .indexer
            .search(&ReleaseQuery {
                title,
                year,
                season,
                episode,
            })
            .await;
        progress.report(75.0).await;

        let candidates = match candidates {
            Ok(c) => c,
            Err(e) => return Ok(StepOutput::fail(e.to_string())),
        };

        let Some(best) = candidates.into_iter().next() else {
            return Ok(StepOutput::fail("no matching release found"));
        };

        progress.report(100.0).await;
        Ok(StepOutput::ok(ContextSlice::Search(SearchOutput {
            release_id: Some(best.torrent_hash.clone()),
            indexer: Some(best.indexer),
            torrent_name: Some(best.release_name),
            torrent_hash: Some(best.torrent_hash),
            season_pack: best.season_pack,
        })))
    }
}
