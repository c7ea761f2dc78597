//! Layered error taxonomy for the state store and its supporting modules.
//!
//! Mirrors the teacher's `RateLimitError`/`WorkQueueError` style: one
//! `thiserror` enum per subsystem, with `#[from]` conversions so callers
//! can use `?` across module boundaries without manual mapping.

use thiserror::Error;

/// Errors surfaced by `mf-core` (state store, rate limiting, secrets, config).
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("connection pool error: {0}")]
    Pool(String),

    #[error("migration error: {0}")]
    Migration(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid state transition: {0}")]
    InvalidTransition(String),

    #[error("secret store error: {0}")]
    Secret(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

pub type CoreResult<T> = Result<T, CoreError>;
