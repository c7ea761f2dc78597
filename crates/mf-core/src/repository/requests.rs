use diesel::prelude::*;
use diesel::upsert::excluded;
use diesel_async::RunQueryDsl;

use super::pool::{parse_datetime, parse_datetime_opt, DbPool};
use super::records::RequestRecord;
use crate::error::{CoreError, CoreResult};
use crate::models::{RequestKind, RequestRow, RequestStatus};
use crate::schema::requests;
use crate::with_conn;

impl TryFrom<RequestRecord> for RequestRow {
    type Error = CoreError;

    fn try_from(r: RequestRecord) -> CoreResult<Self> {
        Ok(RequestRow {
            id: r.id,
            kind: RequestKind::from_str(&r.kind)
                .ok_or_else(|| CoreError::Other(anyhow::anyhow!("bad request kind: {}", r.kind)))?,
            tmdb_id: r.tmdb_id,
            title: r.title,
            year: r.year,
            requested_seasons: r
                .requested_seasons
                .map(|s| serde_json::from_str(&s))
                .transpose()?,
            requested_episodes: r
                .requested_episodes
                .map(|s| serde_json::from_str(&s))
                .transpose()?,
            targets: serde_json::from_str(&r.targets)?,
            status: RequestStatus::from_str(&r.status)
                .ok_or_else(|| CoreError::Other(anyhow::anyhow!("bad request status: {}", r.status)))?,
            progress: r.progress,
            error: r.error,
            created_at: parse_datetime(&r.created_at),
            completed_at: parse_datetime_opt(r.completed_at),
        })
    }
}

fn to_record(row: &RequestRow) -> CoreResult<RequestRecord> {
    Ok(RequestRecord {
        id: row.id.clone(),
        kind: row.kind.as_str().to_string(),
        tmdb_id: row.tmdb_id,
        title: row.title.clone(),
        year: row.year,
        requested_seasons: row
            .requested_seasons
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?,
        requested_episodes: row
            .requested_episodes
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?,
        targets: serde_json::to_string(&row.targets)?,
        status: row.status.as_str().to_string(),
        progress: row.progress,
        error: row.error.clone(),
        created_at: row.created_at.to_rfc3339(),
        completed_at: row.completed_at.map(|t| t.to_rfc3339()),
    })
}

/// Diesel-backed repository for acquisition requests (spec.md §3
/// "Request").
#[derive(Clone)]
pub struct RequestRepository {
    pool: DbPool,
}

impl RequestRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, id: &str) -> CoreResult<Option<RequestRow>> {
        with_conn!(self.pool, conn, {
            let record = requests::table
                .find(id)
                .first::<RequestRecord>(&mut conn)
                .await
                .optional()?;
            record.map(RequestRow::try_from).transpose()
        })
    }

    pub async fn list(&self) -> CoreResult<Vec<RequestRow>> {
        with_conn!(self.pool, conn, {
            let records = requests::table
                .order(requests::created_at.desc())
                .load::<RequestRecord>(&mut conn)
                .await?;
            records.into_iter().map(RequestRow::try_from).collect()
        })
    }

    pub async fn insert(&self, row: &RequestRow) -> CoreResult<()> {
        let record = to_record(row)?;
        with_conn!(self.pool, conn, {
            diesel::insert_into(requests::table)
                .values(&record)
                .execute(&mut conn)
                .await?;
            Ok(())
        })
    }

    pub async fn save(&self, row: &RequestRow) -> CoreResult<()> {
        let record = to_record(row)?;
        with_conn!(self.pool, conn, {
            diesel::insert_into(requests::table)
                .values(&record)
                .on_conflict(requests::id)
                .do_update()
                .set((
                    requests::status.eq(excluded(requests::status)),
                    requests::progress.eq(excluded(requests::progress)),
                    requests::error.eq(excluded(requests::error)),
                    requests::requested_seasons.eq(excluded(requests::requested_seasons)),
                    requests::requested_episodes.eq(excluded(requests::requested_episodes)),
                    requests::completed_at.eq(excluded(requests::completed_at)),
                ))
                .execute(&mut conn)
                .await?;
            Ok(())
        })
    }

    /// Update the derived status/progress pair (spec.md §3: "Request.status
    /// is derived ... computed from ProcessingItem aggregate").
    pub async fn update_derived_status(
        &self,
        id: &str,
        status: RequestStatus,
        progress: f32,
    ) -> CoreResult<()> {
        let completed_at = status
            .is_terminal()
            .then(|| chrono::Utc::now().to_rfc3339());
        with_conn!(self.pool, conn, {
            diesel::update(requests::table.find(id))
                .set((
                    requests::status.eq(status.as_str()),
                    requests::progress.eq(progress),
                    requests::completed_at.eq(completed_at),
                ))
                .execute(&mut conn)
                .await?;
            Ok(())
        })
    }

    pub async fn delete(&self, id: &str) -> CoreResult<bool> {
        with_conn!(self.pool, conn, {
            let rows = diesel::delete(requests::table.find(id))
                .execute(&mut conn)
                .await?;
            Ok(rows > 0)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::test_pool;

    #[tokio::test]
    async fn insert_and_fetch_round_trips() {
        let (pool, _dir) = test_pool().await;
        let repo = RequestRepository::new(pool);
        let row = RequestRow::new(
            "r1".into(),
            RequestKind::Movie,
            603,
            "The Matrix".into(),
            Some(1999),
            vec!["plex".into()],
        );
        repo.insert(&row).await.unwrap();

        let fetched = repo.get("r1").await.unwrap().unwrap();
        assert_eq!(fetched.title, "The Matrix");
        assert_eq!(fetched.status, RequestStatus::Pending);
    }

    #[tokio::test]
    async fn update_derived_status_sets_completed_at_on_terminal() {
        let (pool, _dir) = test_pool().await;
        let repo = RequestRepository::new(pool);
        let row = RequestRow::new("r2".into(), RequestKind::Movie, 1, "X".into(), None, vec![]);
        repo.insert(&row).await.unwrap();

        repo.update_derived_status("r2", RequestStatus::Completed, 100.0)
            .await
            .unwrap();
        let fetched = repo.get("r2").await.unwrap().unwrap();
        assert_eq!(fetched.status, RequestStatus::Completed);
        assert!(fetched.completed_at.is_some());
    }
}
