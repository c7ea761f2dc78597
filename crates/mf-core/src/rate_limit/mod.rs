//! Sliding-window admission control for outbound indexer requests
//! (spec.md §4.6 "Rate Limiter"). Pluggable backends mirror the teacher's
//! in-memory/SQLite split, generalized from a single adaptive delay to an
//! explicit `(maxRequests, windowSecs)` bucket.

mod backend;
mod memory;
mod sqlite;

pub use backend::{
    backoff_delay, get_delay_from_env, parse_retry_after, Admission, RateLimitBackend,
    RateLimitBucket, RateLimitError, RateLimitResult,
};
pub use memory::InMemoryRateLimitBackend;
pub use sqlite::DieselRateLimitBackend;

use std::sync::Arc;

/// Type-erased backend handle, so callers can hold either implementation
/// behind one field (mirrors the teacher's `BoxedRateLimitBackend`).
pub type BoxedRateLimitBackend = Arc<dyn RateLimitBackend>;

/// Facade used by `mf-adapters` and `mf-dispatcher`: holds per-indexer
/// `(max, window)` config and forwards to a pluggable backend.
#[derive(Clone)]
pub struct RateLimiter {
    backend: BoxedRateLimitBackend,
}

impl RateLimiter {
    pub fn new(backend: BoxedRateLimitBackend) -> Self {
        Self { backend }
    }

    pub async fn try_acquire(
        &self,
        indexer: &str,
        max_requests: u32,
        window_secs: u32,
    ) -> RateLimitResult<Admission> {
        self.backend.try_acquire(indexer, max_requests, window_secs).await
    }

    pub async fn record_backoff(&self, indexer: &str, delay: std::time::Duration) -> RateLimitResult<()> {
        self.backend.record_backoff(indexer, delay).await
    }

    pub async fn stats(&self, indexer: &str) -> RateLimitResult<Option<RateLimitBucket>> {
        self.backend.stats(indexer).await
    }
}
