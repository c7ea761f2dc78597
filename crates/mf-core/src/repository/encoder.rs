use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::pool::{parse_datetime, parse_datetime_opt, DbPool};
use super::records::{EncoderAssignmentRecord, EncoderWorkerRecord};
use crate::error::{CoreError, CoreResult};
use crate::models::{
    EncoderAssignment, EncoderAssignmentStatus, EncoderWorker, WorkerCapabilities, WorkerStatus,
};
use crate::schema::{encoder_assignments, encoder_workers};
use crate::with_conn;

impl TryFrom<EncoderWorkerRecord> for EncoderWorker {
    type Error = CoreError;

    fn try_from(r: EncoderWorkerRecord) -> CoreResult<Self> {
        Ok(EncoderWorker {
            id: r.id,
            status: WorkerStatus::from_str(&r.status)
                .ok_or_else(|| CoreError::Other(anyhow::anyhow!("bad worker status")))?,
            current_jobs: r.current_jobs,
            max_concurrent: r.max_concurrent,
            blocked_until: parse_datetime_opt(r.blocked_until),
            last_heartbeat_at: parse_datetime(&r.last_heartbeat_at),
            capabilities: serde_json::from_str::<WorkerCapabilities>(&r.capabilities)?,
        })
    }
}

fn worker_to_record(w: &EncoderWorker) -> CoreResult<EncoderWorkerRecord> {
    Ok(EncoderWorkerRecord {
        id: w.id.clone(),
        status: w.status.as_str().to_string(),
        current_jobs: w.current_jobs,
        max_concurrent: w.max_concurrent,
        blocked_until: w.blocked_until.map(|t| t.to_rfc3339()),
        last_heartbeat_at: w.last_heartbeat_at.to_rfc3339(),
        capabilities: serde_json::to_string(&w.capabilities)?,
    })
}

impl TryFrom<EncoderAssignmentRecord> for EncoderAssignment {
    type Error = CoreError;

    fn try_from(r: EncoderAssignmentRecord) -> CoreResult<Self> {
        Ok(EncoderAssignment {
            id: r.id,
            job_id: r.job_id,
            encoder_id: r.encoder_id,
            status: EncoderAssignmentStatus::from_str(&r.status)
                .ok_or_else(|| CoreError::Other(anyhow::anyhow!("bad assignment status")))?,
            input_path: r.input_path,
            output_path: r.output_path,
            attempt: r.attempt,
            max_attempts: r.max_attempts,
            sent_at: parse_datetime_opt(r.sent_at),
            started_at: parse_datetime_opt(r.started_at),
            last_progress_at: parse_datetime_opt(r.last_progress_at),
            completed_at: parse_datetime_opt(r.completed_at),
            progress: r.progress,
            output_size: r.output_size,
            compression_ratio: r.compression_ratio,
            encode_duration_secs: r.encode_duration_secs,
            error: r.error,
        })
    }
}

fn assignment_to_record(a: &EncoderAssignment) -> EncoderAssignmentRecord {
    EncoderAssignmentRecord {
        id: a.id.clone(),
        job_id: a.job_id.clone(),
        encoder_id: a.encoder_id.clone(),
        status: a.status.as_str().to_string(),
        input_path: a.input_path.clone(),
        output_path: a.output_path.clone(),
        attempt: a.attempt,
        max_attempts: a.max_attempts,
        sent_at: a.sent_at.map(|t| t.to_rfc3339()),
        started_at: a.started_at.map(|t| t.to_rfc3339()),
        last_progress_at: a.last_progress_at.map(|t| t.to_rfc3339()),
        completed_at: a.completed_at.map(|t| t.to_rfc3339()),
        progress: a.progress,
        output_size: a.output_size,
        compression_ratio: a.compression_ratio,
        encode_duration_secs: a.encode_duration_secs,
        error: a.error.clone(),
    }
}

/// Diesel-backed repository for encoder workers and job assignments
/// (spec.md §4.4 "Encoder Dispatcher").
#[derive(Clone)]
pub struct EncoderRepository {
    pool: DbPool,
}

impl EncoderRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn get_worker(&self, id: &str) -> CoreResult<Option<EncoderWorker>> {
        with_conn!(self.pool, conn, {
            let record = encoder_workers::table
                .find(id)
                .first::<EncoderWorkerRecord>(&mut conn)
                .await
                .optional()?;
            record.map(EncoderWorker::try_from).transpose()
        })
    }

    pub async fn list_workers(&self) -> CoreResult<Vec<EncoderWorker>> {
        with_conn!(self.pool, conn, {
            let records = encoder_workers::table
                .load::<EncoderWorkerRecord>(&mut conn)
                .await?;
            records.into_iter().map(EncoderWorker::try_from).collect()
        })
    }

    pub async fn upsert_worker(&self, worker: &EncoderWorker) -> CoreResult<()> {
        use diesel::upsert::excluded;
        let record = worker_to_record(worker)?;
        with_conn!(self.pool, conn, {
            diesel::insert_into(encoder_workers::table)
                .values(&record)
                .on_conflict(encoder_workers::id)
                .do_update()
                .set((
                    encoder_workers::status.eq(excluded(encoder_workers::status)),
                    encoder_workers::current_jobs.eq(excluded(encoder_workers::current_jobs)),
                    encoder_workers::max_concurrent.eq(excluded(encoder_workers::max_concurrent)),
                    encoder_workers::blocked_until.eq(excluded(encoder_workers::blocked_until)),
                    encoder_workers::last_heartbeat_at.eq(excluded(encoder_workers::last_heartbeat_at)),
                    encoder_workers::capabilities.eq(excluded(encoder_workers::capabilities)),
                ))
                .execute(&mut conn)
                .await?;
            Ok(())
        })
    }

    pub async fn mark_worker_offline(&self, id: &str) -> CoreResult<()> {
        with_conn!(self.pool, conn, {
            diesel::update(encoder_workers::table.find(id))
                .set(encoder_workers::status.eq(WorkerStatus::Offline.as_str()))
                .execute(&mut conn)
                .await?;
            Ok(())
        })
    }

    /// Atomically adjust `current_jobs` by `delta`, clamped at zero. Used
    /// when an assignment is handed out or released.
    pub async fn adjust_worker_load(&self, id: &str, delta: i32) -> CoreResult<()> {
        with_conn!(self.pool, conn, {
            diesel::sql_query(
                "UPDATE encoder_workers SET current_jobs = MAX(0, current_jobs + ?1) WHERE id = ?2",
            )
            .bind::<diesel::sql_types::Integer, _>(delta)
            .bind::<diesel::sql_types::Text, _>(id)
            .execute(&mut conn)
            .await?;
            Ok(())
        })
    }

    pub async fn insert_assignment(&self, assignment: &EncoderAssignment) -> CoreResult<()> {
        let record = assignment_to_record(assignment);
        with_conn!(self.pool, conn, {
            diesel::insert_into(encoder_assignments::table)
                .values(&record)
                .execute(&mut conn)
                .await?;
            Ok(())
        })
    }

    pub async fn get_assignment(&self, id: &str) -> CoreResult<Option<EncoderAssignment>> {
        with_conn!(self.pool, conn, {
            let record = encoder_assignments::table
                .find(id)
                .first::<EncoderAssignmentRecord>(&mut conn)
                .await
                .optional()?;
            record.map(EncoderAssignment::try_from).transpose()
        })
    }

    /// All assignments for a job that have not reached a terminal state.
    /// Used to enforce "at most one non-terminal assignment per jobId"
    /// (spec.md §5).
    pub async fn non_terminal_for_job(&self, job_id: &str) -> CoreResult<Vec<EncoderAssignment>> {
        with_conn!(self.pool, conn, {
            let records = encoder_assignments::table
                .filter(encoder_assignments::job_id.eq(job_id))
                .filter(
                    encoder_assignments::status
                        .ne(EncoderAssignmentStatus::Completed.as_str())
                        .and(encoder_assignments::status.ne(EncoderAssignmentStatus::Failed.as_str())),
                )
                .load::<EncoderAssignmentRecord>(&mut conn)
                .await?;
            records.into_iter().map(EncoderAssignment::try_from).collect()
        })
    }

    /// The earliest-queued PENDING assignment not yet offered to any
    /// encoder, for the scheduler's dispatch loop (spec.md §4.4).
    pub async fn next_pending(&self) -> CoreResult<Option<EncoderAssignment>> {
        with_conn!(self.pool, conn, {
            let record = encoder_assignments::table
                .filter(encoder_assignments::status.eq(EncoderAssignmentStatus::Pending.as_str()))
                .order(encoder_assignments::id.asc())
                .first::<EncoderAssignmentRecord>(&mut conn)
                .await
                .optional()?;
            record.map(EncoderAssignment::try_from).transpose()
        })
    }

    pub async fn list_by_encoder(&self, encoder_id: &str) -> CoreResult<Vec<EncoderAssignment>> {
        with_conn!(self.pool, conn, {
            let records = encoder_assignments::table
                .filter(encoder_assignments::encoder_id.eq(encoder_id))
                .load::<EncoderAssignmentRecord>(&mut conn)
                .await?;
            records.into_iter().map(EncoderAssignment::try_from).collect()
        })
    }

    /// Offer an assignment to a worker, but only if it is still PENDING —
    /// a CAS guard against a concurrent dispatcher loop offering the same
    /// job twice.
    pub async fn cas_offer(&self, id: &str, encoder_id: &str) -> CoreResult<bool> {
        with_conn!(self.pool, conn, {
            let rows = diesel::update(
                encoder_assignments::table
                    .filter(encoder_assignments::id.eq(id))
                    .filter(encoder_assignments::status.eq(EncoderAssignmentStatus::Pending.as_str())),
            )
            .set((
                encoder_assignments::status.eq(EncoderAssignmentStatus::Assigned.as_str()),
                encoder_assignments::encoder_id.eq(encoder_id),
                encoder_assignments::sent_at.eq(chrono::Utc::now().to_rfc3339()),
            ))
            .execute(&mut conn)
            .await?;
            Ok(rows > 0)
        })
    }

    pub async fn mark_started(&self, id: &str) -> CoreResult<()> {
        with_conn!(self.pool, conn, {
            diesel::update(encoder_assignments::table.find(id))
                .set((
                    encoder_assignments::status.eq(EncoderAssignmentStatus::Encoding.as_str()),
                    encoder_assignments::started_at.eq(chrono::Utc::now().to_rfc3339()),
                    encoder_assignments::last_progress_at.eq(chrono::Utc::now().to_rfc3339()),
                ))
                .execute(&mut conn)
                .await?;
            Ok(())
        })
    }

    pub async fn update_progress(&self, id: &str, progress: f32) -> CoreResult<()> {
        with_conn!(self.pool, conn, {
            diesel::update(encoder_assignments::table.find(id))
                .set((
                    encoder_assignments::progress.eq(progress),
                    encoder_assignments::last_progress_at.eq(chrono::Utc::now().to_rfc3339()),
                ))
                .execute(&mut conn)
                .await?;
            Ok(())
        })
    }

    pub async fn mark_completed(
        &self,
        id: &str,
        output_path: &str,
        output_size: i64,
        compression_ratio: f32,
        encode_duration_secs: i64,
    ) -> CoreResult<()> {
        with_conn!(self.pool, conn, {
            diesel::update(encoder_assignments::table.find(id))
                .set((
                    encoder_assignments::status.eq(EncoderAssignmentStatus::Completed.as_str()),
                    encoder_assignments::output_path.eq(output_path),
                    encoder_assignments::output_size.eq(output_size),
                    encoder_assignments::compression_ratio.eq(compression_ratio),
                    encoder_assignments::encode_duration_secs.eq(encode_duration_secs),
                    encoder_assignments::progress.eq(100.0_f32),
                    encoder_assignments::completed_at.eq(chrono::Utc::now().to_rfc3339()),
                ))
                .execute(&mut conn)
                .await?;
            Ok(())
        })
    }

    /// Revert an assignment to PENDING for retry, incrementing `attempt`
    /// (spec.md §4.4: assignedTimeout revert-to-PENDING semantics).
    pub async fn revert_to_pending(&self, id: &str) -> CoreResult<()> {
        with_conn!(self.pool, conn, {
            diesel::sql_query(
                "UPDATE encoder_assignments SET status = 'pending', encoder_id = NULL, \
                 sent_at = NULL, started_at = NULL, attempt = attempt + 1 WHERE id = ?1",
            )
            .bind::<diesel::sql_types::Text, _>(id)
            .execute(&mut conn)
            .await?;
            Ok(())
        })
    }

    /// Revert to PENDING without consuming an attempt, for capacity
    /// rejections (spec.md §4.4: "capacity-rejection handling without
    /// incrementing attempt").
    pub async fn revert_to_pending_no_attempt(&self, id: &str) -> CoreResult<()> {
        with_conn!(self.pool, conn, {
            diesel::update(encoder_assignments::table.find(id))
                .set((
                    encoder_assignments::status.eq(EncoderAssignmentStatus::Pending.as_str()),
                    encoder_assignments::encoder_id.eq(None::<String>),
                    encoder_assignments::sent_at.eq(None::<String>),
                ))
                .execute(&mut conn)
                .await?;
            Ok(())
        })
    }

    pub async fn mark_failed(&self, id: &str, error: &str) -> CoreResult<()> {
        with_conn!(self.pool, conn, {
            diesel::update(encoder_assignments::table.find(id))
                .set((
                    encoder_assignments::status.eq(EncoderAssignmentStatus::Failed.as_str()),
                    encoder_assignments::error.eq(error),
                    encoder_assignments::completed_at.eq(chrono::Utc::now().to_rfc3339()),
                ))
                .execute(&mut conn)
                .await?;
            Ok(())
        })
    }

    /// Assignments whose `last_progress_at` is older than `older_than` and
    /// that are still ENCODING, for the stall sweeper (spec.md §4.5).
    pub async fn list_stalled(&self, older_than: chrono::DateTime<chrono::Utc>) -> CoreResult<Vec<EncoderAssignment>> {
        with_conn!(self.pool, conn, {
            let records = encoder_assignments::table
                .filter(encoder_assignments::status.eq(EncoderAssignmentStatus::Encoding.as_str()))
                .filter(encoder_assignments::last_progress_at.lt(older_than.to_rfc3339()))
                .load::<EncoderAssignmentRecord>(&mut conn)
                .await?;
            records.into_iter().map(EncoderAssignment::try_from).collect()
        })
    }
}
