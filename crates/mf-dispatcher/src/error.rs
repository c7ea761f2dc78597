//! Error taxonomy for the encoder dispatcher (spec.md §7, via mf-core's
//! layered `thiserror` style).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatcherError {
    #[error(transparent)]
    Core(#[from] mf_core::error::CoreError),

    #[error("unknown encoder: {0}")]
    UnknownEncoder(String),

    #[error("assignment not found: {0}")]
    AssignmentNotFound(String),

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

pub type DispatcherResult<T> = Result<T, DispatcherError>;
