//! Error taxonomy for recovery sweeps, layered over `mf-core`/`mf-engine`
//! the way every other crate's error enum wraps its collaborators.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error(transparent)]
    Store(#[from] mf_core::CoreError),

    #[error(transparent)]
    Adapter(#[from] mf_engine::ports::AdapterError),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

pub type RecoveryResult<T> = Result<T, RecoveryError>;
