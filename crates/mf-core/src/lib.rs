//! mf-core — durable state store, rate limiting, secrets and configuration
//! shared by every other mediaforge crate.

pub mod config;
pub mod error;
pub mod models;
pub mod rate_limit;
pub mod repository;
pub mod schema;
pub mod secrets;

pub use error::CoreError;

/// Run a closure with a pooled database connection, mapping pool
/// checkout failures into [`error::CoreError`].
///
/// Mirrors the teacher's `with_conn!` helper: callers write the query
/// body inline and this macro handles acquiring/releasing the
/// connection around it.
#[macro_export]
macro_rules! with_conn {
    ($pool:expr, $conn:ident, $body:block) => {{
        let mut $conn = $pool
            .get()
            .await
            .map_err(|e| $crate::error::CoreError::Pool(e.to_string()))?;
        $body
    }};
}
