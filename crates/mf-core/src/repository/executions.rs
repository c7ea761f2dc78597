use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::pool::{parse_datetime, parse_datetime_opt, DbPool};
use super::records::{PipelineExecutionRecord, StepExecutionRecord};
use crate::error::CoreResult;
use crate::models::{
    ExecutionStatus, PipelineExecution, StepExecutionRow, StepExecutionStatus,
};
use crate::schema::{pipeline_executions, step_executions};
use crate::with_conn;

impl TryFrom<PipelineExecutionRecord> for PipelineExecution {
    type Error = crate::error::CoreError;

    fn try_from(r: PipelineExecutionRecord) -> CoreResult<Self> {
        Ok(PipelineExecution {
            id: r.id,
            request_id: r.request_id,
            template_id: r.template_id,
            status: ExecutionStatus::from_str(&r.status)
                .ok_or_else(|| crate::error::CoreError::Other(anyhow::anyhow!("bad execution status")))?,
            current_step: r.current_step,
            steps: serde_json::from_str(&r.steps)?,
            context: serde_json::from_str(&r.context)?,
            parent_execution_id: r.parent_execution_id,
            episode_id: r.episode_id,
            pause_reason: r.pause_reason,
            started_at: parse_datetime(&r.started_at),
            completed_at: parse_datetime_opt(r.completed_at),
            error: r.error,
        })
    }
}

fn to_record(e: &PipelineExecution) -> CoreResult<PipelineExecutionRecord> {
    Ok(PipelineExecutionRecord {
        id: e.id.clone(),
        request_id: e.request_id.clone(),
        template_id: e.template_id.clone(),
        status: e.status.as_str().to_string(),
        current_step: e.current_step,
        steps: serde_json::to_string(&e.steps)?,
        context: serde_json::to_string(&e.context)?,
        parent_execution_id: e.parent_execution_id.clone(),
        episode_id: e.episode_id.clone(),
        pause_reason: e.pause_reason.clone(),
        started_at: e.started_at.to_rfc3339(),
        completed_at: e.completed_at.map(|t| t.to_rfc3339()),
        error: e.error.clone(),
    })
}

impl TryFrom<StepExecutionRecord> for StepExecutionRow {
    type Error = crate::error::CoreError;

    fn try_from(r: StepExecutionRecord) -> CoreResult<Self> {
        Ok(StepExecutionRow {
            id: r.id,
            execution_id: r.execution_id,
            step_order: r.step_order,
            step_type: r.step_type,
            status: StepExecutionStatus::from_str(&r.status)
                .ok_or_else(|| crate::error::CoreError::Other(anyhow::anyhow!("bad step status")))?,
            started_at: parse_datetime_opt(r.started_at),
            completed_at: parse_datetime_opt(r.completed_at),
            progress: r.progress,
            output: r.output.map(|s| serde_json::from_str(&s)).transpose()?,
            error: r.error,
        })
    }
}

fn step_to_record(s: &StepExecutionRow) -> CoreResult<StepExecutionRecord> {
    Ok(StepExecutionRecord {
        id: s.id.clone(),
        execution_id: s.execution_id.clone(),
        step_order: s.step_order,
        step_type: s.step_type.clone(),
        status: s.status.as_str().to_string(),
        started_at: s.started_at.map(|t| t.to_rfc3339()),
        completed_at: s.completed_at.map(|t| t.to_rfc3339()),
        progress: s.progress,
        output: s.output.as_ref().map(serde_json::to_string).transpose()?,
        error: s.error.clone(),
    })
}

/// Diesel-backed repository for executions and their step rows (spec.md §4.4
/// "Pipeline Engine").
#[derive(Clone)]
pub struct ExecutionRepository {
    pool: DbPool,
}

impl ExecutionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, id: &str) -> CoreResult<Option<PipelineExecution>> {
        with_conn!(self.pool, conn, {
            let record = pipeline_executions::table
                .find(id)
                .first::<PipelineExecutionRecord>(&mut conn)
                .await
                .optional()?;
            record.map(PipelineExecution::try_from).transpose()
        })
    }

    pub async fn list_by_request(&self, request_id: &str) -> CoreResult<Vec<PipelineExecution>> {
        with_conn!(self.pool, conn, {
            let records = pipeline_executions::table
                .filter(pipeline_executions::request_id.eq(request_id))
                .load::<PipelineExecutionRecord>(&mut conn)
                .await?;
            records.into_iter().map(PipelineExecution::try_from).collect()
        })
    }

    pub async fn list_children(&self, parent_execution_id: &str) -> CoreResult<Vec<PipelineExecution>> {
        with_conn!(self.pool, conn, {
            let records = pipeline_executions::table
                .filter(pipeline_executions::parent_execution_id.eq(parent_execution_id))
                .load::<PipelineExecutionRecord>(&mut conn)
                .await?;
            records.into_iter().map(PipelineExecution::try_from).collect()
        })
    }

    pub async fn insert(&self, execution: &PipelineExecution) -> CoreResult<()> {
        let record = to_record(execution)?;
        with_conn!(self.pool, conn, {
            diesel::insert_into(pipeline_executions::table)
                .values(&record)
                .execute(&mut conn)
                .await?;
            Ok(())
        })
    }

    /// Persist the full execution row, including its merged context.
    pub async fn save(&self, execution: &PipelineExecution) -> CoreResult<()> {
        let record = to_record(execution)?;
        with_conn!(self.pool, conn, {
            diesel::update(pipeline_executions::table.find(&execution.id))
                .set((
                    pipeline_executions::status.eq(&record.status),
                    pipeline_executions::current_step.eq(record.current_step),
                    pipeline_executions::context.eq(&record.context),
                    pipeline_executions::pause_reason.eq(&record.pause_reason),
                    pipeline_executions::completed_at.eq(&record.completed_at),
                    pipeline_executions::error.eq(&record.error),
                ))
                .execute(&mut conn)
                .await?;
            Ok(())
        })
    }

    /// Compare-and-set an execution's status, only applying the write if the
    /// current status matches `expected` (spec.md §5 concurrency model).
    pub async fn cas_status(
        &self,
        id: &str,
        expected: ExecutionStatus,
        target: ExecutionStatus,
    ) -> CoreResult<bool> {
        with_conn!(self.pool, conn, {
            let rows = diesel::update(
                pipeline_executions::table
                    .filter(pipeline_executions::id.eq(id))
                    .filter(pipeline_executions::status.eq(expected.as_str())),
            )
            .set(pipeline_executions::status.eq(target.as_str()))
            .execute(&mut conn)
            .await?;
            Ok(rows > 0)
        })
    }

    /// Finds the paused execution whose accumulated context is waiting on
    /// the given ENCODE assignment id, so a dispatcher completion/failure
    /// callback (which only knows the assignment/job id) can resume the
    /// right execution. The context JSON is matched with a `LIKE` filter
    /// before the full row is parsed and the job id re-checked exactly,
    /// since `LIKE` on a serialized JSON blob can only narrow the scan.
    pub async fn find_paused_by_encoding_job_id(&self, job_id: &str) -> CoreResult<Option<PipelineExecution>> {
        let pattern = format!("%\"encoding_job_id\":\"{job_id}\"%");
        with_conn!(self.pool, conn, {
            let records = pipeline_executions::table
                .filter(pipeline_executions::status.eq(ExecutionStatus::Paused.as_str()))
                .filter(pipeline_executions::context.like(&pattern))
                .load::<PipelineExecutionRecord>(&mut conn)
                .await?;
            for record in records {
                let execution = PipelineExecution::try_from(record)?;
                let matches = execution
                    .context
                    .get("encode")
                    .and_then(|e| e.get("encoding_job_id"))
                    .and_then(|v| v.as_str())
                    == Some(job_id);
                if matches {
                    return Ok(Some(execution));
                }
            }
            Ok(None)
        })
    }

    pub async fn insert_step(&self, step: &StepExecutionRow) -> CoreResult<()> {
        let record = step_to_record(step)?;
        with_conn!(self.pool, conn, {
            diesel::insert_into(step_executions::table)
                .values(&record)
                .execute(&mut conn)
                .await?;
            Ok(())
        })
    }

    pub async fn list_steps(&self, execution_id: &str) -> CoreResult<Vec<StepExecutionRow>> {
        with_conn!(self.pool, conn, {
            let records = step_executions::table
                .filter(step_executions::execution_id.eq(execution_id))
                .order(step_executions::step_order.asc())
                .load::<StepExecutionRecord>(&mut conn)
                .await?;
            records.into_iter().map(StepExecutionRow::try_from).collect()
        })
    }

    pub async fn get_step(&self, execution_id: &str, step_order: i32) -> CoreResult<Option<StepExecutionRow>> {
        with_conn!(self.pool, conn, {
            let record = step_executions::table
                .filter(step_executions::execution_id.eq(execution_id))
                .filter(step_executions::step_order.eq(step_order))
                .first::<StepExecutionRecord>(&mut conn)
                .await
                .optional()?;
            record.map(StepExecutionRow::try_from).transpose()
        })
    }

    /// Compare-and-set a step's status, keyed on `(execution_id, step_order)`
    /// rather than the generated row id, matching spec.md §5's "CAS on
    /// (executionId, stepOrder, status=PENDING->RUNNING)" invariant.
    pub async fn cas_step_status(
        &self,
        execution_id: &str,
        step_order: i32,
        expected: StepExecutionStatus,
        target: StepExecutionStatus,
    ) -> CoreResult<bool> {
        let started_at = matches!(target, StepExecutionStatus::Running)
            .then(|| chrono::Utc::now().to_rfc3339());
        with_conn!(self.pool, conn, {
            let rows = diesel::update(
                step_executions::table
                    .filter(step_executions::execution_id.eq(execution_id))
                    .filter(step_executions::step_order.eq(step_order))
                    .filter(step_executions::status.eq(expected.as_str())),
            )
            .set((
                step_executions::status.eq(target.as_str()),
                step_executions::started_at.eq(started_at),
            ))
            .execute(&mut conn)
            .await?;
            Ok(rows > 0)
        })
    }

    /// Persist a handler's in-flight progress report without touching status
    /// (spec.md §4.1: handlers are "wired with a progress callback that
    /// persists to StepExecution.progress").
    pub async fn update_step_progress(
        &self,
        execution_id: &str,
        step_order: i32,
        progress: f32,
    ) -> CoreResult<()> {
        with_conn!(self.pool, conn, {
            diesel::update(
                step_executions::table
                    .filter(step_executions::execution_id.eq(execution_id))
                    .filter(step_executions::step_order.eq(step_order)),
            )
            .set(step_executions::progress.eq(progress))
            .execute(&mut conn)
            .await?;
            Ok(())
        })
    }

    pub async fn complete_step(
        &self,
        execution_id: &str,
        step_order: i32,
        status: StepExecutionStatus,
        output: Option<serde_json::Value>,
        error: Option<String>,
    ) -> CoreResult<()> {
        let output_json = output.as_ref().map(serde_json::to_string).transpose()?;
        with_conn!(self.pool, conn, {
            diesel::update(
                step_executions::table
                    .filter(step_executions::execution_id.eq(execution_id))
                    .filter(step_executions::step_order.eq(step_order)),
            )
            .set((
                step_executions::status.eq(status.as_str()),
                step_executions::completed_at.eq(chrono::Utc::now().to_rfc3339()),
                step_executions::progress.eq(100.0_f32),
                step_executions::output.eq(output_json),
                step_executions::error.eq(error),
            ))
            .execute(&mut conn)
            .await?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::test_pool;

    fn paused_execution(id: &str, job_id: &str) -> PipelineExecution {
        let mut execution = PipelineExecution::new_root(
            id.into(),
            "r1".into(),
            "t1".into(),
            serde_json::json!([]),
            serde_json::json!({"request": {}}),
        );
        execution.status = ExecutionStatus::Paused;
        execution.context = serde_json::json!({
            "request": {},
            "encode": {"encoding_job_id": job_id, "encoded_files": [], "compression_ratio": null},
        });
        execution
    }

    #[tokio::test]
    async fn find_paused_by_encoding_job_id_matches_exact_job() {
        let (pool, _dir) = test_pool().await;
        let repo = ExecutionRepository::new(pool);

        let waiting = paused_execution("e1", "job-1");
        repo.insert(&waiting).await.unwrap();
        let other = paused_execution("e2", "job-2");
        repo.insert(&other).await.unwrap();

        let found = repo.find_paused_by_encoding_job_id("job-1").await.unwrap().unwrap();
        assert_eq!(found.id, "e1");
    }

    #[tokio::test]
    async fn find_paused_by_encoding_job_id_returns_none_when_absent() {
        let (pool, _dir) = test_pool().await;
        let repo = ExecutionRepository::new(pool);
        let waiting = paused_execution("e1", "job-1");
        repo.insert(&waiting).await.unwrap();

        let found = repo.find_paused_by_encoding_job_id("job-missing").await.unwrap();
        assert!(found.is_none());
    }
}
