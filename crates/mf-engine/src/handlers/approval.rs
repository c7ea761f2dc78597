use std::sync::Arc;

use async_trait::async_trait;

use crate::context::{ApprovalOutput, ContextSlice, PipelineContext};
use crate::error::EngineResult;
use crate::registry::{ProgressSink, StepHandler, StepOutput};
use crate::template::StepType;

/// APPROVAL: a manual gate. Pauses the execution until an operator calls
/// back with a decision (via the HTTP surface, which writes `approval`
/// into the context and calls `resumeExecution`), unless `config.auto`
/// is set for unattended templates.
pub struct ApprovalHandler;

#[async_trait]
impl StepHandler for ApprovalHandler {
    fn kind(&self) -> StepType {
        StepType::Approval
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
        if let Some(approval) = &ctx.approval {
            if let Some(approved) = approval.approved {
                progress.report(100.0).await;
                return Ok(if approved {
                    StepOutput::ok(ContextSlice::Approval(approval.clone()))
                } else {
                    StepOutput::fail("approval was rejected")
                });
            }
        }

        if config["auto"].as_bool().unwrap_or(false) {
            return Ok(StepOutput::ok(ContextSlice::Approval(ApprovalOutput {
                approved: Some(true),
                decided_by: Some("auto".into()),
            })));
        }

        Ok(StepOutput::pause("awaiting manual approval"))
    }
}
