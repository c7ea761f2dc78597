//! Bridges `mf-dispatcher`'s job-settled notifications back onto the
//! `PipelineExecution` paused waiting on them (spec.md §1: "a push event
//! (from C5) drives the item forward by a state transition"). Grounded
//! on DESIGN.md's `JobSettledHook` seam: the dispatcher has no notion of
//! executions, only `EncoderAssignment` rows, so this composition-root
//! type looks the paused execution up by `encoding_job_id` and resumes
//! it.

use std::sync::Arc;

use async_trait::async_trait;
use mf_core::repository::StateStore;
use mf_dispatcher::scheduler::JobSettledHook;
use mf_engine::Engine;
use tracing::warn;

pub struct EngineResumeHook {
    engine: Arc<Engine>,
    store: Arc<StateStore>,
}

impl EngineResumeHook {
    pub fn new(engine: Arc<Engine>, store: Arc<StateStore>) -> Self {
        Self { engine, store }
    }

    async fn resume_waiter(&self, job_id: &str) {
        match self.store.executions.find_paused_by_encoding_job_id(job_id).await {
            Ok(Some(execution)) => {
                if let Err(err) = self.engine.resume_execution(&execution.id).await {
                    warn!(execution_id = %execution.id, job_id, %err, "failed to resume execution after encode settlement");
                }
            }
            Ok(None) => {
                // Nothing waiting (already resumed by a recovery sweep, or
                // the completion arrived for an execution that was
                // cancelled in the meantime); not an error.
            }
            Err(err) => {
                warn!(job_id, %err, "failed to look up paused execution for settled job");
            }
        }
    }
}

#[async_trait]
impl JobSettledHook for EngineResumeHook {
    async fn on_completed(&self, job_id: &str) {
        self.resume_waiter(job_id).await;
    }

    async fn on_failed(&self, job_id: &str, _error: &str) {
        self.resume_waiter(job_id).await;
    }
}
