use std::sync::Arc;

use async_trait::async_trait;

use crate::context::{ContextSlice, NotificationOutput, PipelineContext};
use crate::error::EngineResult;
use crate::ports::NotificationDispatcher;
use crate::registry::{ProgressSink, StepHandler, StepOutput};
use crate::template::StepType;

/// NOTIFICATION: a fire-and-forget dispatch to a webhook/email/chat sink.
/// Never pauses; a failed send is surfaced as a step failure so templates
/// can mark it `continueOnError` if notification is non-essential.
pub struct NotificationHandler {
    pub dispatcher: Arc<dyn NotificationDispatcher>,
}

#[async_trait]
impl StepHandler for NotificationHandler {
    fn kind(&self) -> StepType {
        StepType::Notification
    }

    fn validate_config(&self, config: &serde_json::Value) -> EngineResult<()> {
        if config["sink"].as_str().is_none() {
            return Err(crate::error::EngineError::InvalidConfig(
                "NOTIFICATION config requires a \"sink\" field".into(),
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
        let sink = config["sink"].as_str().unwrap_or_default().to_string();
        let title = ctx.request["title"].as_str().unwrap_or("request");
        let message = config["message"]
            .as_str()
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("{title} reached a notification step"));

        match self.dispatcher.notify(&sink, &message).await {
            Ok(()) => {
                progress.report(100.0).await;
                Ok(StepOutput::ok(ContextSlice::Notification(NotificationOutput {
                    sent: true,
                    sink: Some(sink),
                })))
            }
            Err(e) => Ok(StepOutput::fail(e.to_string())),
        }
    }
}
