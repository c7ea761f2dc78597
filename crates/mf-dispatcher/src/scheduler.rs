//! The dispatcher's scheduling logic (spec.md §4.4, component C5).
//! Transport-agnostic: `ws.rs` turns wire frames into calls on this type.
//! Grounded on `work_queue::runner::PipelineRunner`'s drain-to-exhaustion
//! loop shape, adapted from a chunked batch walk to an event/timer-driven
//! scheduler over a single pending-assignment queue.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use mf_core::models::{EncoderAssignment, EncoderWorker, WorkerCapabilities, WorkerStatus};
use mf_core::repository::StateStore;
use tracing::{info, instrument, warn};

use crate::error::DispatcherResult;
use crate::protocol::{is_capacity_reason, Frame};
use crate::worker::WorkerConnections;

/// Tunable timing knobs (spec.md §4.4 parenthetical defaults).
#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    pub assigned_timeout: Duration,
    pub stall_timeout: Duration,
    pub capacity_block: Duration,
    pub heartbeat_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            assigned_timeout: Duration::from_secs(30),
            stall_timeout: Duration::from_secs(120),
            capacity_block: Duration::from_secs(10),
            heartbeat_timeout: Duration::from_secs(60),
        }
    }
}

/// Notified when a job reaches a terminal outcome, so the composition
/// root can resume the `PipelineExecution` waiting on it (spec.md §1:
/// "a push event ... drives the item forward"). The dispatcher itself has
/// no notion of executions or steps, only encoder assignments.
#[async_trait]
pub trait JobSettledHook: Send + Sync {
    async fn on_completed(&self, job_id: &str);
    async fn on_failed(&self, job_id: &str, error: &str);
}

/// A hook that does nothing, for callers (and tests) that only care
/// about `EncoderAssignment` state and drive resumption themselves.
pub struct NoopHook;

#[async_trait]
impl JobSettledHook for NoopHook {
    async fn on_completed(&self, _job_id: &str) {}
    async fn on_failed(&self, _job_id: &str, _error: &str) {}
}

pub struct Dispatcher {
    store: Arc<StateStore>,
    connections: WorkerConnections,
    config: SchedulerConfig,
    hook: Arc<dyn JobSettledHook>,
}

impl Dispatcher {
    pub fn new(store: Arc<StateStore>, connections: WorkerConnections, config: SchedulerConfig, hook: Arc<dyn JobSettledHook>) -> Self {
        Self { store, connections, config, hook }
    }

    pub fn connections(&self) -> &WorkerConnections {
        &self.connections
    }

    /// HELLO: identify a newly connected encoder, persisting its declared
    /// capacity and capabilities (spec.md §4.4 "Connection lifecycle").
    #[instrument(skip(self, capabilities))]
    pub async fn on_hello(&self, encoder_id: &str, max_concurrent: i32, capabilities: WorkerCapabilities) -> DispatcherResult<()> {
        let worker = match self.store.encoders.get_worker(encoder_id).await? {
            Some(mut existing) => {
                existing.status = WorkerStatus::Idle;
                existing.max_concurrent = max_concurrent;
                existing.capabilities = capabilities;
                existing.last_heartbeat_at = Utc::now();
                existing
            }
            None => EncoderWorker::new(encoder_id.to_string(), max_concurrent, capabilities),
        };
        self.store.encoders.upsert_worker(&worker).await?;
        info!(encoder_id, max_concurrent, "encoder connected");
        Ok(())
    }

    pub async fn on_heartbeat(&self, encoder_id: &str) -> DispatcherResult<()> {
        if let Some(mut worker) = self.store.encoders.get_worker(encoder_id).await? {
            worker.last_heartbeat_at = Utc::now();
            self.store.encoders.upsert_worker(&worker).await?;
        }
        Ok(())
    }

    /// ACCEPT: the worker picked up the OFFER and is now encoding it.
    pub async fn on_accept(&self, job_id: &str) -> DispatcherResult<()> {
        self.store.encoders.mark_started(job_id).await?;
        Ok(())
    }

    /// REJECT{reason}: capacity-flavored reasons return the job to
    /// PENDING without consuming an attempt and cool off the worker;
    /// anything else is treated as a job-specific failure that does
    /// consume an attempt (spec.md §4.4 "Capacity-error handling").
    #[instrument(skip(self))]
    pub async fn on_reject(&self, encoder_id: &str, job_id: &str, reason: &str) -> DispatcherResult<()> {
        if is_capacity_reason(reason) {
            self.store.encoders.revert_to_pending_no_attempt(job_id).await?;
            if let Some(mut worker) = self.store.encoders.get_worker(encoder_id).await? {
                worker.blocked_until = Some(Utc::now() + self.config.capacity_block);
                self.store.encoders.upsert_worker(&worker).await?;
            }
            warn!(encoder_id, job_id, reason, "capacity rejection, blocking worker");
        } else {
            self.revert_or_fail(job_id).await?;
            warn!(encoder_id, job_id, reason, "job rejected");
        }
        self.store.encoders.adjust_worker_load(encoder_id, -1).await?;
        Ok(())
    }

    pub async fn on_progress(&self, job_id: &str, pct: f32) -> DispatcherResult<()> {
        self.store.encoders.update_progress(job_id, pct).await?;
        Ok(())
    }

    /// COMPLETED: persist the output and free the worker's slot.
    #[instrument(skip(self))]
    pub async fn on_completed(
        &self,
        encoder_id: &str,
        job_id: &str,
        output_path: &str,
        size: i64,
        compression_ratio: f32,
        duration_secs: i64,
    ) -> DispatcherResult<()> {
        self.store
            .encoders
            .mark_completed(job_id, output_path, size, compression_ratio, duration_secs)
            .await?;
        self.store.encoders.adjust_worker_load(encoder_id, -1).await?;
        self.hook.on_completed(job_id).await;
        Ok(())
    }

    /// FAILED: the worker itself gave up on the job; this is terminal,
    /// not a transient condition the retry machinery should smooth over.
    #[instrument(skip(self))]
    pub async fn on_failed(&self, encoder_id: &str, job_id: &str, error: &str) -> DispatcherResult<()> {
        self.store.encoders.mark_failed(job_id, error).await?;
        self.store.encoders.adjust_worker_load(encoder_id, -1).await?;
        self.hook.on_failed(job_id, error).await;
        Ok(())
    }

    /// Connection dropped (transport close or missed-heartbeat sweep):
    /// mark the worker OFFLINE and requeue everything it was holding
    /// (spec.md §4.4 "Disconnection").
    #[instrument(skip(self))]
    pub async fn on_disconnect(&self, encoder_id: &str) -> DispatcherResult<()> {
        self.store.encoders.mark_worker_offline(encoder_id).await?;
        self.connections.unregister(encoder_id).await;
        for assignment in self.store.encoders.list_by_encoder(encoder_id).await? {
            if !assignment.status.is_terminal() {
                self.revert_or_fail(&assignment.id).await?;
            }
        }
        Ok(())
    }

    /// Revive a non-terminal assignment by incrementing its attempt
    /// count, or mark it FAILED once `maxAttempts` is exhausted.
    async fn revert_or_fail(&self, job_id: &str) -> DispatcherResult<()> {
        let assignment = self
            .store
            .encoders
            .get_assignment(job_id)
            .await?
            .ok_or_else(|| crate::error::DispatcherError::AssignmentNotFound(job_id.to_string()))?;
        if assignment.attempt + 1 > assignment.max_attempts {
            self.store.encoders.mark_failed(job_id, "exceeded max attempts").await?;
        } else {
            self.store.encoders.revert_to_pending(job_id).await?;
        }
        Ok(())
    }

    /// One scheduling pass (spec.md §4.4 "Scheduling"): pick the
    /// earliest-queued PENDING assignment and the best available worker,
    /// CAS-claim the assignment, and push an OFFER. A no-op if there's no
    /// pending work or no available worker.
    #[instrument(skip(self))]
    pub async fn dispatch_once(&self) -> DispatcherResult<bool> {
        let Some(assignment) = self.store.encoders.next_pending().await? else {
            return Ok(false);
        };
        let Some(worker) = self.pick_worker().await? else {
            return Ok(false);
        };

        if !self.store.encoders.cas_offer(&assignment.id, &worker.id).await? {
            // Another scheduling pass claimed it first.
            return Ok(false);
        }
        self.store.encoders.adjust_worker_load(&worker.id, 1).await?;

        let offered = self
            .connections
            .send(
                &worker.id,
                Frame::Offer {
                    job_id: assignment.id.clone(),
                    input_path: assignment.input_path.clone(),
                    config: serde_json::Value::Null,
                    output_path: assignment.output_path.clone().unwrap_or_default(),
                },
            )
            .await;
        if !offered {
            // The connection vanished between pick and send; undo the claim.
            self.store.encoders.revert_to_pending_no_attempt(&assignment.id).await?;
            self.store.encoders.adjust_worker_load(&worker.id, -1).await?;
            return Ok(false);
        }
        info!(job_id = %assignment.id, encoder_id = %worker.id, "offered job");
        Ok(true)
    }

    /// Run `dispatch_once` until it stops making progress, for a single
    /// "something changed" trigger (new PENDING job, worker freed).
    pub async fn dispatch_until_idle(&self) -> DispatcherResult<usize> {
        let mut count = 0;
        while self.dispatch_once().await? {
            count += 1;
        }
        Ok(count)
    }

    /// The worker with maximal free capacity among online, unblocked
    /// workers, tying by lowest `current_jobs` then lowest id (spec.md
    /// §4.4 "Scheduling").
    async fn pick_worker(&self) -> DispatcherResult<Option<EncoderWorker>> {
        let now = Utc::now();
        let mut candidates: Vec<EncoderWorker> = self
            .store
            .encoders
            .list_workers()
            .await?
            .into_iter()
            .filter(|w| w.is_available(now))
            .collect();
        candidates.sort_by(|a, b| {
            b.free_capacity()
                .cmp(&a.free_capacity())
                .then(a.current_jobs.cmp(&b.current_jobs))
                .then(a.id.cmp(&b.id))
        });
        Ok(candidates.into_iter().next())
    }

    /// Acceptance-window sweep (spec.md §4.4 "Acceptance window"): an
    /// ASSIGNED job that never became ENCODING within `assignedTimeout`
    /// goes back to PENDING and its worker gets a short cool-off.
    #[instrument(skip(self))]
    pub async fn sweep_acceptance_window(&self) -> DispatcherResult<usize> {
        let cutoff = Utc::now() - chrono::Duration::from_std(self.config.assigned_timeout).unwrap_or_default();
        let mut reverted = 0;
        for worker in self.store.encoders.list_workers().await? {
            for assignment in self.store.encoders.list_by_encoder(&worker.id).await? {
                if assignment.status == mf_core::models::EncoderAssignmentStatus::Assigned {
                    if assignment.sent_at.map(|t| t < cutoff).unwrap_or(false) {
                        self.store.encoders.revert_to_pending_no_attempt(&assignment.id).await?;
                        self.store.encoders.adjust_worker_load(&worker.id, -1).await?;
                        let mut w = worker.clone();
                        w.blocked_until = Some(Utc::now() + self.config.capacity_block);
                        self.store.encoders.upsert_worker(&w).await?;
                        reverted += 1;
                        warn!(job_id = %assignment.id, encoder_id = %worker.id, "acceptance window expired");
                    }
                }
            }
        }
        Ok(reverted)
    }

    /// Stall sweep (spec.md §4.4 "Progress & stall"): an ENCODING job
    /// whose last progress report is older than `stallTimeout`.
    #[instrument(skip(self))]
    pub async fn sweep_stalls(&self) -> DispatcherResult<usize> {
        let cutoff = Utc::now() - chrono::Duration::from_std(self.config.stall_timeout).unwrap_or_default();
        let stalled = self.store.encoders.list_stalled(cutoff).await?;
        for assignment in &stalled {
            if let Some(encoder_id) = &assignment.encoder_id {
                self.store.encoders.adjust_worker_load(encoder_id, -1).await?;
            }
            if assignment.progress > 0.0 {
                self.revert_or_fail(&assignment.id).await?;
            } else {
                self.store.encoders.revert_to_pending_no_attempt(&assignment.id).await?;
            }
            warn!(job_id = %assignment.id, progress = assignment.progress, "stall detected");
        }
        Ok(stalled.len())
    }

    /// Heartbeat sweep (spec.md §4.4 "missed heartbeats ... mark the
    /// worker OFFLINE and trigger requeue").
    #[instrument(skip(self))]
    pub async fn sweep_heartbeats(&self) -> DispatcherResult<usize> {
        let cutoff = Utc::now() - chrono::Duration::from_std(self.config.heartbeat_timeout).unwrap_or_default();
        let mut offline = 0;
        for worker in self.store.encoders.list_workers().await? {
            if worker.status != WorkerStatus::Offline && worker.last_heartbeat_at < cutoff {
                self.on_disconnect(&worker.id).await?;
                offline += 1;
            }
        }
        Ok(offline)
    }

    /// Startup recovery (spec.md §4.4 "On startup: all workers become
    /// OFFLINE; all ASSIGNED assignments revert to PENDING").
    #[instrument(skip(self))]
    pub async fn recover_on_startup(&self) -> DispatcherResult<()> {
        for worker in self.store.encoders.list_workers().await? {
            self.store.encoders.mark_worker_offline(&worker.id).await?;
            for assignment in self.store.encoders.list_by_encoder(&worker.id).await? {
                if assignment.status == mf_core::models::EncoderAssignmentStatus::Assigned
                    || assignment.status == mf_core::models::EncoderAssignmentStatus::Encoding
                {
                    self.store.encoders.revert_to_pending_no_attempt(&assignment.id).await?;
                }
            }
        }
        Ok(())
    }

    /// Before inserting a new assignment for `input_path`, reuse an
    /// existing non-terminal one instead (spec.md §4.4 "Deduplication").
    pub async fn find_or_create_assignment(&self, job_id: &str, input_path: &str, max_attempts: i32) -> DispatcherResult<EncoderAssignment> {
        for assignment in self.store.encoders.non_terminal_for_job(job_id).await? {
            if assignment.input_path == input_path {
                return Ok(assignment);
            }
        }
        let assignment = EncoderAssignment::new(job_id.to_string(), job_id.to_string(), input_path.to_string(), max_attempts);
        self.store.encoders.insert_assignment(&assignment).await?;
        Ok(assignment)
    }
}
