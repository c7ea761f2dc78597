//! Pluggable backend trait for sliding-window admission control.
//!
//! Generalizes the teacher's adaptive per-domain delay backend (which only
//! tracked a single `current_delay_ms`) into the `(maxRequests,
//! windowSecs)` sliding-window bucket spec.md §4.6 requires for indexer
//! rate limiting.

use async_trait::async_trait;
use std::time::Duration;

pub type RateLimitResult<T> = Result<T, RateLimitError>;

#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("database error: {0}")]
    Database(String),
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

impl From<diesel::result::Error> for RateLimitError {
    fn from(e: diesel::result::Error) -> Self {
        RateLimitError::Database(e.to_string())
    }
}

/// The outcome of an admission check (spec.md §4.6: "requests beyond the
/// window bound are rejected, not queued").
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    Admitted,
    Denied { retry_after: Duration },
}

/// Bucket configuration and counters for one indexer.
#[derive(Debug, Clone)]
pub struct RateLimitBucket {
    pub indexer: String,
    pub max_requests: u32,
    pub window_secs: u32,
    pub current_delay_ms: u64,
    pub in_backoff: bool,
    pub total_requests: u64,
    pub rate_limit_hits: u64,
}

impl RateLimitBucket {
    pub fn new(indexer: String, max_requests: u32, window_secs: u32) -> Self {
        Self {
            indexer,
            max_requests,
            window_secs,
            current_delay_ms: 0,
            in_backoff: false,
            total_requests: 0,
            rate_limit_hits: 0,
        }
    }
}

/// Trait for sliding-window rate limit storage backends. Implementations
/// must be thread-safe and handle concurrent access.
#[async_trait]
pub trait RateLimitBackend: Send + Sync {
    /// Get or create bucket config for an indexer.
    async fn get_or_create_bucket(
        &self,
        indexer: &str,
        max_requests: u32,
        window_secs: u32,
    ) -> RateLimitResult<RateLimitBucket>;

    /// Atomically check whether a request against `indexer` is admitted
    /// under its `(max, window)` bound, recording the attempt either way.
    async fn try_acquire(&self, indexer: &str, max_requests: u32, window_secs: u32) -> RateLimitResult<Admission>;

    /// Put an indexer into backoff after an upstream 429/Retry-After,
    /// widening its delay (spec.md §4.6 Non-goal carve-out: backoff still
    /// applies on top of the sliding window).
    async fn record_backoff(&self, indexer: &str, delay: Duration) -> RateLimitResult<()>;

    async fn clear_backoff(&self, indexer: &str) -> RateLimitResult<()>;

    async fn stats(&self, indexer: &str) -> RateLimitResult<Option<RateLimitBucket>>;

    /// Drop request records older than the widest tracked window
    /// (housekeeping, run by the recovery scheduler).
    async fn cleanup_expired(&self, window_secs: u32) -> RateLimitResult<u64>;
}

/// Parse a `Retry-After` header value in seconds.
pub fn parse_retry_after(header_value: Option<&str>) -> Option<Duration> {
    let value = header_value?;
    value.parse::<u64>().ok().map(|secs| Duration::from_secs(secs.min(60)))
}

/// Exponential backoff delay for a given attempt count.
pub fn backoff_delay(attempt: u32, base_ms: u64) -> Duration {
    let delay_ms = base_ms.saturating_mul(2u64.saturating_pow(attempt));
    Duration::from_millis(delay_ms.min(60_000))
}

/// Read a millisecond delay from an environment variable, falling back to
/// `default_ms` when unset or unparsable.
pub fn get_delay_from_env(env_var: &str, default_ms: u64) -> Duration {
    std::env::var(env_var)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_millis(default_ms))
}
