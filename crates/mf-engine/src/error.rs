//! Engine-local error taxonomy, layered over [`mf_core::CoreError`] the
//! way the teacher's `PipelineError` layers over `WorkQueueError`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("state store error: {0}")]
    Store(#[from] mf_core::CoreError),

    #[error("step config invalid: {0}")]
    InvalidConfig(String),

    #[error("no handler registered for step kind {0:?}")]
    UnregisteredKind(crate::template::StepType),

    #[error("a handler for {0:?} is already registered")]
    DuplicateRegistration(crate::template::StepType),

    #[error("execution {0} not found")]
    ExecutionNotFound(String),

    #[error("template {0} not found")]
    TemplateNotFound(String),

    #[error("request {0} not found")]
    RequestNotFound(String),

    #[error("step timed out after {0}ms")]
    Timeout(u64),

    #[error("task join error: {0}")]
    Join(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;
