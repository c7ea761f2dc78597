//! In-memory sliding-window rate limit backend for single-process
//! operation. State is not persisted across restarts.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::backend::{Admission, RateLimitBackend, RateLimitBucket, RateLimitResult};

struct IndexerEntry {
    max_requests: u32,
    window_secs: u32,
    current_delay_ms: u64,
    in_backoff: bool,
    backoff_until: Option<Instant>,
    total_requests: u64,
    rate_limit_hits: u64,
    recent_requests: VecDeque<Instant>,
}

impl IndexerEntry {
    fn new(max_requests: u32, window_secs: u32) -> Self {
        Self {
            max_requests,
            window_secs,
            current_delay_ms: 0,
            in_backoff: false,
            backoff_until: None,
            total_requests: 0,
            rate_limit_hits: 0,
            recent_requests: VecDeque::new(),
        }
    }

    fn to_bucket(&self, indexer: &str) -> RateLimitBucket {
        RateLimitBucket {
            indexer: indexer.to_string(),
            max_requests: self.max_requests,
            window_secs: self.window_secs,
            current_delay_ms: self.current_delay_ms,
            in_backoff: self.in_backoff,
            total_requests: self.total_requests,
            rate_limit_hits: self.rate_limit_hits,
        }
    }

    fn evict_expired(&mut self, now: Instant) {
        let window = Duration::from_secs(self.window_secs as u64);
        while let Some(&front) = self.recent_requests.front() {
            if now.duration_since(front) > window {
                self.recent_requests.pop_front();
            } else {
                break;
            }
        }
    }
}

/// In-memory rate limit backend, the default for a single dispatcher
/// process (spec.md §4.6).
#[derive(Clone)]
pub struct InMemoryRateLimitBackend {
    indexers: Arc<RwLock<HashMap<String, IndexerEntry>>>,
}

impl Default for InMemoryRateLimitBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRateLimitBackend {
    pub fn new() -> Self {
        Self {
            indexers: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

#[async_trait]
impl RateLimitBackend for InMemoryRateLimitBackend {
    async fn get_or_create_bucket(
        &self,
        indexer: &str,
        max_requests: u32,
        window_secs: u32,
    ) -> RateLimitResult<RateLimitBucket> {
        let mut indexers = self.indexers.write().await;
        let entry = indexers
            .entry(indexer.to_string())
            .or_insert_with(|| IndexerEntry::new(max_requests, window_secs));
        Ok(entry.to_bucket(indexer))
    }

    async fn try_acquire(
        &self,
        indexer: &str,
        max_requests: u32,
        window_secs: u32,
    ) -> RateLimitResult<Admission> {
        let now = Instant::now();
        let mut indexers = self.indexers.write().await;
        let entry = indexers
            .entry(indexer.to_string())
            .or_insert_with(|| IndexerEntry::new(max_requests, window_secs));

        if let Some(until) = entry.backoff_until {
            if now < until {
                return Ok(Admission::Denied {
                    retry_after: until - now,
                });
            }
            entry.in_backoff = false;
            entry.backoff_until = None;
        }

        entry.evict_expired(now);
        entry.total_requests += 1;

        if max_requests == 0 {
            entry.rate_limit_hits += 1;
            return Ok(Admission::Denied {
                retry_after: Duration::from_secs(window_secs as u64),
            });
        }

        if entry.recent_requests.len() >= max_requests as usize {
            entry.rate_limit_hits += 1;
            let oldest = *entry.recent_requests.front().expect("len >= max_requests > 0");
            let window = Duration::from_secs(window_secs as u64);
            let retry_after = window.saturating_sub(now.duration_since(oldest));
            return Ok(Admission::Denied { retry_after });
        }

        entry.recent_requests.push_back(now);
        Ok(Admission::Admitted)
    }

    async fn record_backoff(&self, indexer: &str, delay: std::time::Duration) -> RateLimitResult<()> {
        let mut indexers = self.indexers.write().await;
        let entry = indexers
            .entry(indexer.to_string())
            .or_insert_with(|| IndexerEntry::new(1, 60));
        entry.in_backoff = true;
        entry.current_delay_ms = delay.as_millis() as u64;
        entry.backoff_until = Some(Instant::now() + delay);
        Ok(())
    }

    async fn clear_backoff(&self, indexer: &str) -> RateLimitResult<()> {
        let mut indexers = self.indexers.write().await;
        if let Some(entry) = indexers.get_mut(indexer) {
            entry.in_backoff = false;
            entry.backoff_until = None;
            entry.current_delay_ms = 0;
        }
        Ok(())
    }

    async fn stats(&self, indexer: &str) -> RateLimitResult<Option<RateLimitBucket>> {
        let indexers = self.indexers.read().await;
        Ok(indexers.get(indexer).map(|e| e.to_bucket(indexer)))
    }

    async fn cleanup_expired(&self, window_secs: u32) -> RateLimitResult<u64> {
        let now = Instant::now();
        let window = Duration::from_secs(window_secs as u64);
        let mut indexers = self.indexers.write().await;
        let mut removed = 0u64;
        for entry in indexers.values_mut() {
            let before = entry.recent_requests.len();
            entry
                .recent_requests
                .retain(|t| now.duration_since(*t) <= window);
            removed += (before - entry.recent_requests.len()) as u64;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn admits_up_to_max_within_window() {
        let backend = InMemoryRateLimitBackend::new();
        for _ in 0..5 {
            assert_eq!(
                backend.try_acquire("indexer-a", 5, 60).await.unwrap(),
                Admission::Admitted
            );
        }
        let sixth = backend.try_acquire("indexer-a", 5, 60).await.unwrap();
        assert!(matches!(sixth, Admission::Denied { .. }));
    }

    #[tokio::test]
    async fn backoff_denies_until_expiry() {
        let backend = InMemoryRateLimitBackend::new();
        backend
            .record_backoff("indexer-b", Duration::from_millis(50))
            .await
            .unwrap();
        let denied = backend.try_acquire("indexer-b", 5, 60).await.unwrap();
        assert!(matches!(denied, Admission::Denied { .. }));

        tokio::time::sleep(Duration::from_millis(60)).await;
        let admitted = backend.try_acquire("indexer-b", 5, 60).await.unwrap();
        assert_eq!(admitted, Admission::Admitted);
    }

    #[tokio::test]
    async fn independent_indexers_have_independent_buckets() {
        let backend = InMemoryRateLimitBackend::new();
        for _ in 0..3 {
            backend.try_acquire("a", 3, 60).await.unwrap();
        }
        assert!(matches!(
            backend.try_acquire("a", 3, 60).await.unwrap(),
            Admission::Denied { .. }
        ));
        assert_eq!(
            backend.try_acquire("b", 3, 60).await.unwrap(),
            Admission::Admitted
        );
    }
}
