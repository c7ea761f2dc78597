//! Diesel-backed sliding-window rate limit backend for multi-process
//! deployments sharing one database (spec.md §4.6).

use async_trait::async_trait;
use diesel::prelude::*;
use diesel::upsert::excluded;
use diesel_async::RunQueryDsl;
use std::time::Duration;

use super::backend::{Admission, RateLimitBackend, RateLimitBucket, RateLimitError, RateLimitResult};
use crate::repository::DbPool;
use crate::schema::{rate_limit_buckets, rate_limit_records};

#[derive(Queryable, Insertable, AsChangeset)]
#[diesel(table_name = rate_limit_buckets)]
struct BucketRecord {
    indexer: String,
    max_requests: i32,
    window_secs: i32,
    current_delay_ms: i32,
    in_backoff: i32,
    total_requests: i64,
    rate_limit_hits: i64,
    updated_at: String,
}

impl BucketRecord {
    fn into_bucket(self) -> RateLimitBucket {
        RateLimitBucket {
            indexer: self.indexer,
            max_requests: self.max_requests as u32,
            window_secs: self.window_secs as u32,
            current_delay_ms: self.current_delay_ms as u64,
            in_backoff: self.in_backoff != 0,
            total_requests: self.total_requests as u64,
            rate_limit_hits: self.rate_limit_hits as u64,
        }
    }
}

#[derive(Insertable)]
#[diesel(table_name = rate_limit_records)]
struct NewRecord {
    indexer: String,
    requested_at: String,
}

/// Diesel-based rate limit backend, sharing the crate's [`DbPool`] with
/// every other repository.
#[derive(Clone)]
pub struct DieselRateLimitBackend {
    pool: DbPool,
}

impl DieselRateLimitBackend {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn ensure_bucket(
        &self,
        indexer: &str,
        max_requests: u32,
        window_secs: u32,
    ) -> RateLimitResult<()> {
        let record = BucketRecord {
            indexer: indexer.to_string(),
            max_requests: max_requests as i32,
            window_secs: window_secs as i32,
            current_delay_ms: 0,
            in_backoff: 0,
            total_requests: 0,
            rate_limit_hits: 0,
            updated_at: chrono::Utc::now().to_rfc3339(),
        };
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| RateLimitError::Unavailable(e.to_string()))?;
        diesel::insert_into(rate_limit_buckets::table)
            .values(&record)
            .on_conflict(rate_limit_buckets::indexer)
            .do_nothing()
            .execute(&mut conn)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl RateLimitBackend for DieselRateLimitBackend {
    async fn get_or_create_bucket(
        &self,
        indexer: &str,
        max_requests: u32,
        window_secs: u32,
    ) -> RateLimitResult<RateLimitBucket> {
        self.ensure_bucket(indexer, max_requests, window_secs).await?;
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| RateLimitError::Unavailable(e.to_string()))?;
        let record = rate_limit_buckets::table
            .find(indexer)
            .first::<BucketRecord>(&mut conn)
            .await?;
        Ok(record.into_bucket())
    }

    async fn try_acquire(
        &self,
        indexer: &str,
        max_requests: u32,
        window_secs: u32,
    ) -> RateLimitResult<Admission> {
        self.ensure_bucket(indexer, max_requests, window_secs).await?;
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| RateLimitError::Unavailable(e.to_string()))?;

        let now = chrono::Utc::now();
        let cutoff = (now - chrono::Duration::seconds(window_secs as i64)).to_rfc3339();

        let count: i64 = rate_limit_records::table
            .filter(rate_limit_records::indexer.eq(indexer))
            .filter(rate_limit_records::requested_at.ge(&cutoff))
            .count()
            .get_result(&mut conn)
            .await?;

        diesel::update(rate_limit_buckets::table.find(indexer))
            .set(rate_limit_buckets::total_requests.eq(rate_limit_buckets::total_requests + 1))
            .execute(&mut conn)
            .await?;

        if count >= max_requests as i64 {
            diesel::update(rate_limit_buckets::table.find(indexer))
                .set(rate_limit_buckets::rate_limit_hits.eq(rate_limit_buckets::rate_limit_hits + 1))
                .execute(&mut conn)
                .await?;

            let oldest: Option<String> = rate_limit_records::table
                .filter(rate_limit_records::indexer.eq(indexer))
                .filter(rate_limit_records::requested_at.ge(&cutoff))
                .order(rate_limit_records::requested_at.asc())
                .select(rate_limit_records::requested_at)
                .first(&mut conn)
                .await
                .optional()?;

            let retry_after = oldest
                .and_then(|s| chrono::DateTime::parse_from_rfc3339(&s).ok())
                .map(|oldest_at| {
                    let oldest_at = oldest_at.with_timezone(&chrono::Utc);
                    let elapsed = now.signed_duration_since(oldest_at).num_milliseconds().max(0) as u64;
                    let window_ms = (window_secs as u64) * 1000;
                    Duration::from_millis(window_ms.saturating_sub(elapsed))
                })
                .unwrap_or_else(|| Duration::from_secs(window_secs as u64));

            return Ok(Admission::Denied { retry_after });
        }

        diesel::insert_into(rate_limit_records::table)
            .values(&NewRecord {
                indexer: indexer.to_string(),
                requested_at: now.to_rfc3339(),
            })
            .execute(&mut conn)
            .await?;

        Ok(Admission::Admitted)
    }

    async fn record_backoff(&self, indexer: &str, delay: Duration) -> RateLimitResult<()> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| RateLimitError::Unavailable(e.to_string()))?;
        diesel::update(rate_limit_buckets::table.find(indexer))
            .set((
                rate_limit_buckets::in_backoff.eq(1),
                rate_limit_buckets::current_delay_ms.eq(delay.as_millis() as i32),
                rate_limit_buckets::updated_at.eq(chrono::Utc::now().to_rfc3339()),
            ))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    async fn clear_backoff(&self, indexer: &str) -> RateLimitResult<()> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| RateLimitError::Unavailable(e.to_string()))?;
        diesel::update(rate_limit_buckets::table.find(indexer))
            .set((
                rate_limit_buckets::in_backoff.eq(0),
                rate_limit_buckets::current_delay_ms.eq(0),
            ))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    async fn stats(&self, indexer: &str) -> RateLimitResult<Option<RateLimitBucket>> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| RateLimitError::Unavailable(e.to_string()))?;
        let record = rate_limit_buckets::table
            .find(indexer)
            .first::<BucketRecord>(&mut conn)
            .await
            .optional()?;
        Ok(record.map(BucketRecord::into_bucket))
    }

    async fn cleanup_expired(&self, window_secs: u32) -> RateLimitResult<u64> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| RateLimitError::Unavailable(e.to_string()))?;
        let cutoff = (chrono::Utc::now() - chrono::Duration::seconds(window_secs as i64)).to_rfc3339();
        let rows = diesel::delete(
            rate_limit_records::table.filter(rate_limit_records::requested_at.lt(cutoff)),
        )
        .execute(&mut conn)
        .await?;
        Ok(rows as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::test_pool;

    #[tokio::test]
    async fn denies_past_the_window_bound() {
        let (pool, _dir) = test_pool().await;
        let backend = DieselRateLimitBackend::new(pool);

        for _ in 0..3 {
            assert_eq!(
                backend.try_acquire("indexer-a", 3, 60).await.unwrap(),
                Admission::Admitted
            );
        }
        assert!(matches!(
            backend.try_acquire("indexer-a", 3, 60).await.unwrap(),
            Admission::Denied { .. }
        ));
    }
}
