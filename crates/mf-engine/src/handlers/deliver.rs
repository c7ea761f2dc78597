use std::sync::Arc;

use async_trait::async_trait;

use crate::context::{ContextSlice, DeliverOutput, PipelineContext};
use crate::error::{EngineError, EngineResult};
use crate::ports::DeliveryAdapter;
use crate::registry::{ProgressSink, StepHandler, StepOutput};
use crate::template::StepType;

/// DELIVER: copies the encoded file to every target named in the
/// request (spec.md §3 "Request.targets"), idempotent against a target
/// that already has the file (checked via `DeliveryAdapter::exists`).
pub struct DeliverHandler {
    pub delivery: Arc<dyn DeliveryAdapter>,
}

#[async_trait]
impl StepHandler for DeliverHandler {
    fn kind(&self) -> StepType {
        StepType::Deliver
    }

    fn validate_config(&self, _config: &serde_json::Value) -> EngineResult<()> {
        Ok(())
    }

    async fn execute(
        &self,
        context: &serde_json::Value,
        _config: &serde_json::Value,
        progress: Arc<dyn ProgressSink>,
    ) -> EngineResult<StepOutput> {
        let ctx = PipelineContext::from_json(context.clone());
        let encode = ctx
            .encode
            .clone()
            .ok_or_else(|| EngineError::InvalidConfig("DELIVER step requires ENCODE output".into()))?;
        let source_path = encode
            .encoded_files
            .first()
            .cloned()
            .ok_or_else(|| EngineError::InvalidConfig("ENCODE output has no encoded files".into()))?;

        let targets: Vec<String> = ctx.request["targets"]
            .as_array()
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            .unwrap_or_default();
        if targets.is_empty() {
            return Ok(StepOutput::fail("request has no delivery targets"));
        }

        let mut delivered = Vec::new();
        let mut delivered_path = None;
        let total = targets.len() as f32;
        for (i, target) in targets.iter().enumerate() {
            let already = self
                .delivery
                .exists(target, &source_path)
                .await
                .map_err(|e| EngineError::Other(anyhow::anyhow!(e.to_string())))?;
            let path = if already {
                source_path.clone()
            } else {
                match self.delivery.deliver(target, &source_path).await {
                    Ok(p) => p,
                    Err(e) => return Ok(StepOutput::fail(e.to_string())),
                }
            };
            delivered_path.get_or_insert_with(|| path.clone());
            delivered.push(target.clone());
            progress.report(((i + 1) as f32 / total) * 100.0).await;
        }

        Ok(StepOutput::ok(ContextSlice::Deliver(DeliverOutput {
            delivered_targets: delivered,
            delivered_path,
        })))
    }
}
