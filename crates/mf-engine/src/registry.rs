//! The Step Registry (spec.md §4.1): maps step kinds to handlers that
//! implement a uniform contract. Grounded on the teacher's
//! `work_queue::WorkQueue` trait shape (a handful of async methods that
//! every implementation provides uniformly), adapted from a claim/complete
//! lifecycle to validate/evaluate/execute.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::context::ContextSlice;
use crate::error::{EngineError, EngineResult};
use crate::template::{ConditionRule, StepType};

/// Output of one step's `execute()` (spec.md §4.1 `StepOutput`).
#[derive(Debug, Clone, Default)]
pub struct StepOutput {
    pub success: bool,
    pub data: Option<ContextSlice>,
    pub error: Option<String>,
    pub should_skip: bool,
    pub should_pause: bool,
    pub pause_reason: Option<String>,
}

impl StepOutput {
    pub fn ok(data: ContextSlice) -> Self {
        Self {
            success: true,
            data: Some(data),
            ..Default::default()
        }
    }

    pub fn skip() -> Self {
        Self {
            success: true,
            should_skip: true,
            ..Default::default()
        }
    }

    pub fn pause(reason: impl Into<String>) -> Self {
        Self {
            success: true,
            should_pause: true,
            pause_reason: Some(reason.into()),
            ..Default::default()
        }
    }

    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn with_data(mut self, data: ContextSlice) -> Self {
        self.data = Some(data);
        self
    }
}

/// Persists step progress as a handler reports it (spec.md §4.1: "wired
/// with a progress callback that persists to StepExecution.progress").
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn report(&self, progress: f32);
}

/// No-op sink for tests and dry runs.
pub struct NullProgressSink;

#[async_trait]
impl ProgressSink for NullProgressSink {
    async fn report(&self, _progress: f32) {}
}

/// One step kind's handler. Instances are constructed per invocation
/// (stateless) by a [`StepHandlerFactory`] — this mirrors the teacher's
/// `PipelineStage` trait, generalized from "count/run_chunk" to
/// "validate/evaluate/execute".
#[async_trait]
pub trait StepHandler: Send + Sync {
    fn kind(&self) -> StepType;

    /// Fail fast on malformed template config.
    fn validate_config(&self, config: &serde_json::Value) -> EngineResult<()>;

    /// Returns whether this step should execute; missing condition means
    /// `true` (spec.md §4.1).
    fn evaluate_condition(&self, context: &serde_json::Value, condition: Option<&ConditionRule>) -> bool {
        condition
            .map(|rule| crate::template::evaluate(context, rule))
            .unwrap_or(true)
    }

    async fn execute(
        &self,
        context: &serde_json::Value,
        config: &serde_json::Value,
        progress: Arc<dyn ProgressSink>,
    ) -> EngineResult<StepOutput>;
}

/// Constructs a fresh, stateless handler instance for one invocation.
pub trait StepHandlerFactory: Send + Sync {
    fn build(&self) -> Box<dyn StepHandler>;
}

impl<F> StepHandlerFactory for F
where
    F: Fn() -> Box<dyn StepHandler> + Send + Sync,
{
    fn build(&self) -> Box<dyn StepHandler> {
        (self)()
    }
}

/// Registry of step-kind -> handler factory. Enforces single registration
/// per kind (spec.md §4.1).
#[derive(Default)]
pub struct StepRegistry {
    factories: HashMap<StepType, Arc<dyn StepHandlerFactory>>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: StepType, factory: Arc<dyn StepHandlerFactory>) -> EngineResult<()> {
        if self.factories.contains_key(&kind) {
            return Err(EngineError::DuplicateRegistration(kind));
        }
        self.factories.insert(kind, factory);
        Ok(())
    }

    pub fn build(&self, kind: StepType) -> EngineResult<Box<dyn StepHandler>> {
        self.factories
            .get(&kind)
            .map(|f| f.build())
            .ok_or(EngineError::UnregisteredKind(kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SearchOutput;

    struct EchoHandler;

    #[async_trait]
    impl StepHandler for EchoHandler {
        fn kind(&self) -> StepType {
            StepType::Search
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
            Ok(StepOutput::ok(ContextSlice::Search(SearchOutput::default())))
        }
    }

    #[test]
    fn registering_same_kind_twice_errors() {
        let mut registry = StepRegistry::new();
        registry
            .register(StepType::Search, Arc::new(|| Box::new(EchoHandler) as Box<dyn StepHandler>))
            .unwrap();
        let err = registry
            .register(StepType::Search, Arc::new(|| Box::new(EchoHandler) as Box<dyn StepHandler>))
            .unwrap_err();
        assert!(matches!(err, EngineError::DuplicateRegistration(StepType::Search)));
    }

    #[test]
    fn unregistered_kind_errors() {
        let registry = StepRegistry::new();
        let err = registry.build(StepType::Deliver).unwrap_err();
        assert!(matches!(err, EngineError::UnregisteredKind(StepType::Deliver)));
    }

    #[tokio::test]
    async fn built_handler_executes() {
        let mut registry = StepRegistry::new();
        registry
            .register(StepType::Search, Arc::new(|| Box::new(EchoHandler) as Box<dyn StepHandler>))
            .unwrap();
        let handler = registry.build(StepType::Search).unwrap();
        let out = handler
            .execute(&serde_json::json!({}), &serde_json::json!({}), Arc::new(NullProgressSink))
            .await
            .unwrap();
        assert!(out.success);
    }
}
