//! S4: a root with two parallel children, A (required) and B (optional).
//! B fails; the execution still reaches COMPLETED with A.COMPLETED and
//! B.FAILED.

mod support;

use std::sync::Arc;

use async_trait::async_trait;
use mf_core::models::{ExecutionStatus, StepExecutionStatus};
use mf_engine::error::EngineResult;
use mf_engine::registry::{ProgressSink, StepHandler, StepOutput};
use mf_engine::{Engine, StepRegistry, StepType};

struct AlwaysOk;

#[async_trait]
impl StepHandler for AlwaysOk {
    fn kind(&self) -> StepType {
        StepType::Notification
    }

    fn validate_config(&self, _config: &serde_json::Value) -> EngineResult<()> {
        Ok(())
    }

    async fn execute(
        &self,
        _context: &serde_json::Value,
        _config: &serde_json::Value,
        _progress: Arc<dyn ProgressSink>,
    ) -> EngineResult<StepOutput> {
        Ok(StepOutput::ok(mf_engine::ContextSlice::Notification(mf_engine::context::NotificationOutput {
            sent: true,
            sink: Some("a".into()),
        })))
    }
}

struct AlwaysFail;

#[async_trait]
impl StepHandler for AlwaysFail {
    fn kind(&self) -> StepType {
        StepType::Approval
    }

    fn validate_config(&self, _config: &serde_json::Value) -> EngineResult<()> {
        Ok(())
    }

    async fn execute(
        &self,
        _context: &serde_json::Value,
        _config: &serde_json::Value,
        _progress: Arc<dyn ProgressSink>,
    ) -> EngineResult<StepOutput> {
        Ok(StepOutput::fail("optional branch failed on purpose"))
    }
}

#[tokio::test]
async fn optional_sibling_failure_does_not_fail_the_execution() {
    let (store, _dir) = support::test_store().await;
    support::insert_movie_request(&store, "req-4", "Two Branches").await;

    let steps = serde_json::json!([
        { "type": "NOTIFICATION", "name": "a", "required": true, "children": [] },
        { "type": "APPROVAL", "name": "b", "required": false, "continue_on_error": true, "children": [] },
    ]);
    support::insert_template(&store, "tmpl-4", steps).await;

    let mut registry = StepRegistry::new();
    registry
        .register(StepType::Notification, Arc::new(|| Box::new(AlwaysOk) as Box<dyn StepHandler>))
        .unwrap();
    registry
        .register(StepType::Approval, Arc::new(|| Box::new(AlwaysFail) as Box<dyn StepHandler>))
        .unwrap();

    let engine = Engine::new(store.clone(), Arc::new(registry));
    let execution = engine.start_execution("req-4", "tmpl-4").await.unwrap();

    assert_eq!(execution.status, ExecutionStatus::Completed);

    let steps = store.executions.list_steps(&execution.id).await.unwrap();
    let a = steps.iter().find(|s| s.step_type == "NOTIFICATION").unwrap();
    let b = steps.iter().find(|s| s.step_type == "APPROVAL").unwrap();
    assert_eq!(a.status, StepExecutionStatus::Completed);
    assert_eq!(b.status, StepExecutionStatus::Failed);
}
