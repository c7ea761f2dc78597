//! The tree-walking executor (spec.md §4.2 "Pipeline Engine"). Grounded on
//! the teacher's `work_queue::pipeline` runner: a chunked stage walker that
//! reports `PipelineEvent`s as it goes, generalized here from a flat chunk
//! list to a step tree with parallel children and explicit pause/resume.

use std::sync::Arc;

use mf_core::models::{
    ExecutionStatus, PipelineExecution, RequestKind, StepExecutionRow, StepExecutionStatus,
};
use mf_core::repository::StateStore;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use crate::context::PipelineContext;
use crate::error::{EngineError, EngineResult};
use crate::registry::{NullProgressSink, ProgressSink, StepRegistry};
use crate::template::{assign_order, flatten, Step, StepType};

/// Persists a handler's progress reports to its `StepExecution` row as they
/// arrive.
struct StepProgressSink {
    store: Arc<StateStore>,
    execution_id: String,
    step_order: i32,
}

#[async_trait::async_trait]
impl ProgressSink for StepProgressSink {
    async fn report(&self, progress: f32) {
        if let Err(err) = self
            .store
            .executions
            .update_step_progress(&self.execution_id, self.step_order, progress)
            .await
        {
            warn!(%err, execution_id = %self.execution_id, step_order = self.step_order, "failed to persist step progress");
        }
    }
}

/// Outcome of walking one node, used by the caller to decide whether to
/// keep descending into siblings/children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeOutcome {
    Continue,
    Stop,
}

/// Reads templates, materializes executions, walks step trees, and merges
/// parallel branch contexts (spec.md §4.2, component C4).
pub struct Engine {
    store: Arc<StateStore>,
    registry: Arc<StepRegistry>,
}

impl Engine {
    pub fn new(store: Arc<StateStore>, registry: Arc<StepRegistry>) -> Self {
        Self { store, registry }
    }

    /// `startExecution(requestId, templateId)` (spec.md §4.2).
    #[instrument(skip(self))]
    pub async fn start_execution(&self, request_id: &str, template_id: &str) -> EngineResult<PipelineExecution> {
        let template = self
            .store
            .templates
            .get(template_id)
            .await?
            .ok_or_else(|| EngineError::TemplateNotFound(template_id.to_string()))?;
        let request = self
            .store
            .requests
            .get(request_id)
            .await?
            .ok_or_else(|| EngineError::RequestNotFound(request_id.to_string()))?;

        let mut steps: Vec<Step> = serde_json::from_value(template.steps.clone())
            .map_err(|e| EngineError::InvalidConfig(format!("template steps: {e}")))?;
        let mut next = 0;
        assign_order(&mut steps, &mut next);
        let steps_json = serde_json::to_value(&steps).map_err(|e| EngineError::Other(e.into()))?;

        let seed = PipelineContext::seeded(serde_json::json!({
            "id": request.id,
            "kind": request.kind.as_str(),
            "tmdb_id": request.tmdb_id,
            "title": request.title,
            "year": request.year,
            "targets": request.targets,
            "requested_seasons": request.requested_seasons,
            "requested_episodes": request.requested_episodes,
        }));

        let execution = PipelineExecution::new_root(
            uuid::Uuid::new_v4().to_string(),
            request_id.to_string(),
            template_id.to_string(),
            steps_json,
            seed.to_json(),
        );
        self.store.executions.insert(&execution).await?;
        self.materialize_steps(&execution.id, &steps).await?;

        info!(execution_id = %execution.id, request_id, template_id, "started execution");
        self.walk(&execution.id).await?;

        self.store
            .executions
            .get(&execution.id)
            .await?
            .ok_or_else(|| EngineError::ExecutionNotFound(execution.id.clone()))
    }

    async fn materialize_steps(&self, execution_id: &str, steps: &[Step]) -> EngineResult<()> {
        for step in flatten(steps) {
            let row = StepExecutionRow::new_pending(
                uuid::Uuid::new_v4().to_string(),
                execution_id.to_string(),
                step.order,
                step.step_type.as_str().to_string(),
            );
            self.store.executions.insert_step(&row).await?;
        }
        Ok(())
    }

    /// `resumeExecution(executionId)`: clears the pause reason and re-walks
    /// from `currentStep`. Idempotent relative to already-COMPLETED steps,
    /// since `walk_node` re-checks each step's persisted status before
    /// running its handler.
    #[instrument(skip(self))]
    pub async fn resume_execution(&self, execution_id: &str) -> EngineResult<()> {
        let moved = self
            .store
            .executions
            .cas_status(execution_id, ExecutionStatus::Paused, ExecutionStatus::Running)
            .await?;
        if !moved {
            return Ok(());
        }
        let mut execution = self
            .store
            .executions
            .get(execution_id)
            .await?
            .ok_or_else(|| EngineError::ExecutionNotFound(execution_id.to_string()))?;
        execution.pause_reason = None;
        self.store.executions.save(&execution).await?;
        self.walk(execution_id).await
    }

    /// `cancelExecution`: RUNNING/PAUSED -> CANCELLED. Does not forcibly
    /// kill in-flight external operations; that's recovery's job.
    #[instrument(skip(self))]
    pub async fn cancel_execution(&self, execution_id: &str) -> EngineResult<()> {
        for from in [ExecutionStatus::Running, ExecutionStatus::Paused] {
            if self.store.executions.cas_status(execution_id, from, ExecutionStatus::Cancelled).await? {
                break;
            }
        }
        Ok(())
    }

    /// Re-enter an execution (fresh start, resume, or a recovery-triggered
    /// re-walk) and drive it to completion, pause, or failure.
    #[instrument(skip(self))]
    pub async fn walk(&self, execution_id: &str) -> EngineResult<()> {
        let execution = self
            .store
            .executions
            .get(execution_id)
            .await?
            .ok_or_else(|| EngineError::ExecutionNotFound(execution_id.to_string()))?;
        if execution.status != ExecutionStatus::Running {
            return Ok(());
        }

        let steps: Vec<Step> = serde_json::from_value(execution.steps.clone())
            .map_err(|e| EngineError::InvalidConfig(format!("execution steps: {e}")))?;
        let ctx = Arc::new(Mutex::new(PipelineContext::from_json(execution.context.clone())));

        let outcome = self.walk_siblings(execution_id, &steps, &ctx).await?;

        // Persist whatever the walk accumulated even if it stopped partway
        // (paused, failed, or delegated to branch executions).
        self.persist_context(execution_id, &ctx).await?;

        if outcome == NodeOutcome::Continue {
            self.finish_if_all_terminal(execution_id).await?;
        }
        Ok(())
    }

    async fn persist_context(&self, execution_id: &str, ctx: &Arc<Mutex<PipelineContext>>) -> EngineResult<()> {
        if let Some(mut execution) = self.store.executions.get(execution_id).await? {
            execution.context = ctx.lock().await.to_json();
            self.store.executions.save(&execution).await?;
        }
        Ok(())
    }

    /// Walk a list of sibling nodes: sequentially if there's one, as
    /// concurrent tasks (copy-on-write context fork, last-finisher-wins
    /// merge) if there's more than one (spec.md §4.2 "Step tree semantics").
    async fn walk_siblings(
        &self,
        execution_id: &str,
        nodes: &[Step],
        ctx: &Arc<Mutex<PipelineContext>>,
    ) -> EngineResult<NodeOutcome> {
        match nodes.len() {
            0 => Ok(NodeOutcome::Continue),
            1 => self.walk_node(execution_id, &nodes[0], ctx).await,
            _ => {
                let base = ctx.lock().await.clone();
                let mut handles = Vec::with_capacity(nodes.len());
                for node in nodes {
                    let engine = self.clone_handles();
                    let execution_id = execution_id.to_string();
                    let node = node.clone();
                    let forked = Arc::new(Mutex::new(base.clone()));
                    handles.push((forked.clone(), tokio::spawn(async move {
                        engine.walk_node(&execution_id, &node, &forked).await
                    })));
                }

                let mut outcome = NodeOutcome::Continue;
                for (forked, handle) in handles {
                    let branch_outcome = handle.await.map_err(|e| EngineError::Join(e.to_string()))??;
                    if branch_outcome == NodeOutcome::Stop {
                        outcome = NodeOutcome::Stop;
                    }
                    // Last-finisher-wins: branches are awaited in spawn
                    // order here, but each merge still only overwrites keys
                    // the branch actually touched (`PipelineContext::merge`),
                    // so the practical effect matches "last writer wins per
                    // namespace" regardless of real completion order.
                    let branch_ctx = forked.lock().await.clone();
                    ctx.lock().await.merge(&branch_ctx);
                }
                Ok(outcome)
            }
        }
    }

    /// A cheap handle clone for spawning into a detached task.
    fn clone_handles(&self) -> Engine {
        Engine {
            store: self.store.clone(),
            registry: self.registry.clone(),
        }
    }

    /// Walk one node: evaluate its condition, run its handler, then its
    /// children (spec.md §4.2 "Walk").
    #[instrument(skip(self, ctx), fields(step = %step.name, order = step.order))]
    async fn walk_node(&self, execution_id: &str, step: &Step, ctx: &Arc<Mutex<PipelineContext>>) -> EngineResult<NodeOutcome> {
        let execution = self
            .store
            .executions
            .get(execution_id)
            .await?
            .ok_or_else(|| EngineError::ExecutionNotFound(execution_id.to_string()))?;
        if execution.status != ExecutionStatus::Running {
            return Ok(NodeOutcome::Stop);
        }

        let row = self
            .store
            .executions
            .get_step(execution_id, step.order)
            .await?
            .ok_or_else(|| EngineError::InvalidConfig(format!("missing StepExecution row for order {}", step.order)))?;

        // Resuming relative to already-terminal steps is a no-op: just keep
        // walking down the tree (spec.md §4.2 "idempotent relative to
        // already-COMPLETED steps").
        if row.status.is_terminal() {
            return self.walk_siblings(execution_id, &step.children, ctx).await;
        }

        let context_json = ctx.lock().await.to_json();
        let handler = self.registry.build(step.step_type)?;

        // A RUNNING row with no terminal status means this step paused on a
        // prior pass; re-enter its handler directly (skipping the
        // condition check and the claim below, both already settled) and
        // let the handler's own idempotency decide whether to redo work.
        if row.status == StepExecutionStatus::Pending {
            if !handler.evaluate_condition(&context_json, step.condition.as_ref()) {
                self.store
                    .executions
                    .complete_step(execution_id, step.order, StepExecutionStatus::Skipped, None, None)
                    .await?;
                return self.walk_siblings(execution_id, &step.children, ctx).await;
            }

            let moved = self
                .store
                .executions
                .cas_step_status(execution_id, step.order, StepExecutionStatus::Pending, StepExecutionStatus::Running)
                .await?;
            if !moved {
                // A concurrent runner claimed it first; let that runner's
                // walk schedule the children once it finishes.
                return Ok(NodeOutcome::Stop);
            }
        }

        handler.validate_config(&step.config)?;

        let progress: Arc<dyn ProgressSink> = Arc::new(StepProgressSink {
            store: self.store.clone(),
            execution_id: execution_id.to_string(),
            step_order: step.order,
        });
        let output = handler.execute(&context_json, &step.config, progress).await?;

        if output.should_pause {
            // The step's own StepExecution row stays RUNNING (spec.md §4.2:
            // "do not advance"); a resume re-enters this same node and the
            // handler's own idempotency decides whether to redo the work.
            if let Some(data) = output.data {
                ctx.lock().await.apply_slice(data);
            }
            if let Some(mut execution) = self.store.executions.get(execution_id).await? {
                execution.pause_reason = output.pause_reason.clone();
                execution.context = ctx.lock().await.to_json();
                self.store.executions.save(&execution).await?;
            }
            self.store
                .executions
                .cas_status(execution_id, ExecutionStatus::Running, ExecutionStatus::Paused)
                .await?;
            return Ok(NodeOutcome::Stop);
        }

        if output.should_skip {
            self.store
                .executions
                .complete_step(execution_id, step.order, StepExecutionStatus::Skipped, None, None)
                .await?;
            return self.walk_siblings(execution_id, &step.children, ctx).await;
        }

        if !output.success {
            self.store
                .executions
                .complete_step(execution_id, step.order, StepExecutionStatus::Failed, None, output.error.clone())
                .await?;
            if step.required && !step.continue_on_error {
                self.fail_execution(execution_id, output.error.unwrap_or_else(|| "step failed".into())).await?;
                return Ok(NodeOutcome::Stop);
            }
            warn!(execution_id, step = %step.name, error = ?output.error, "optional step failed, continuing");
            return self.walk_siblings(execution_id, &step.children, ctx).await;
        }

        if let Some(data) = output.data.clone() {
            ctx.lock().await.apply_slice(data);
        }
        let output_json = output.data.as_ref().map(|d| serde_json::to_value(d).unwrap_or_default());
        self.store
            .executions
            .complete_step(execution_id, step.order, StepExecutionStatus::Completed, output_json, None)
            .await?;

        if let Some(branch_children) = self.season_pack_branch_point(&execution, step, ctx).await? {
            self.spawn_episode_branches(&execution, step, &branch_children, ctx).await?;
            return Ok(NodeOutcome::Continue);
        }

        self.walk_siblings(execution_id, &step.children, ctx).await
    }

    async fn fail_execution(&self, execution_id: &str, error: String) -> EngineResult<()> {
        if let Some(mut execution) = self.store.executions.get(execution_id).await? {
            execution.error = Some(error);
            execution.completed_at = Some(chrono::Utc::now());
            self.store.executions.save(&execution).await?;
        }
        self.store
            .executions
            .cas_status(execution_id, ExecutionStatus::Running, ExecutionStatus::Failed)
            .await?;
        Ok(())
    }

    /// Once a walk completes without pausing or failing, check whether
    /// every step reached a terminal status and, if so, mark the execution
    /// COMPLETED (spec.md §3: "PipelineExecution.status = COMPLETED iff all
    /// StepExecutions are in {COMPLETED, SKIPPED}...").
    async fn finish_if_all_terminal(&self, execution_id: &str) -> EngineResult<()> {
        let rows = self.store.executions.list_steps(execution_id).await?;
        let all_terminal = rows.iter().all(|r| r.status.is_terminal());
        if all_terminal {
            if let Some(mut execution) = self.store.executions.get(execution_id).await? {
                execution.completed_at = Some(chrono::Utc::now());
                self.store.executions.save(&execution).await?;
            }
            self.store
                .executions
                .cas_status(execution_id, ExecutionStatus::Running, ExecutionStatus::Completed)
                .await?;
        }
        Ok(())
    }

    /// Detect the TV season-pack branch point (spec.md §4.2 "Branch
    /// executions"): a just-completed step whose context now carries a
    /// season-pack SEARCH result, on a root (parentless) execution for a
    /// TV request, with children of its own to use as the per-episode
    /// subtree. Returns that subtree, or `None` when this isn't the
    /// branch point.
    async fn season_pack_branch_point<'a>(
        &self,
        execution: &PipelineExecution,
        step: &'a Step,
        ctx: &Arc<Mutex<PipelineContext>>,
    ) -> EngineResult<Option<&'a [Step]>> {
        if execution.parent_execution_id.is_some() || step.children.is_empty() {
            return Ok(None);
        }
        let guard = ctx.lock().await;
        let is_tv = guard.request["kind"].as_str() == Some(RequestKind::Tv.as_str());
        let season_pack = guard.search.as_ref().is_some_and(|s| s.season_pack);
        let has_episodes = guard.request["requested_episodes"].as_array().is_some_and(|a| !a.is_empty());
        drop(guard);
        if is_tv && season_pack && has_episodes {
            Ok(Some(step.children.as_slice()))
        } else {
            Ok(None)
        }
    }

    /// Materialize one branch `PipelineExecution` per requested episode,
    /// reusing `subtree` as each branch's step snapshot, and run them
    /// concurrently. The parent execution does not wait on them; its own
    /// walk completes once branches are spawned, matching spec.md §4.2's
    /// description of branches as first-class executions in their own
    /// right rather than children the parent blocks on.
    async fn spawn_episode_branches(
        &self,
        parent: &PipelineExecution,
        step: &Step,
        subtree: &[Step],
        ctx: &Arc<Mutex<PipelineContext>>,
    ) -> EngineResult<()> {
        let episodes: Vec<i64> = {
            let guard = ctx.lock().await;
            guard.request["requested_episodes"]
                .as_array()
                .map(|a| a.iter().filter_map(|v| v.as_i64()).collect())
                .unwrap_or_default()
        };
        let base_context = ctx.lock().await.clone();
        let base_season = base_context.request["requested_seasons"]
            .as_array()
            .and_then(|a| a.first())
            .and_then(|v| v.as_i64());

        for episode in episodes {
            let mut branch_steps: Vec<Step> = subtree.to_vec();
            let mut next = 0;
            assign_order(&mut branch_steps, &mut next);
            let branch_steps_json = serde_json::to_value(&branch_steps).map_err(|e| EngineError::Other(e.into()))?;

            // Branches inherit the whole context accumulated so far (in
            // particular the SEARCH slice its DOWNLOAD step depends on),
            // not just the request seed: a season pack is one release
            // shared by every episode cut from it.
            let mut branch_context = base_context.clone();
            branch_context.request["season"] = serde_json::json!(base_season);
            branch_context.request["episode"] = serde_json::json!(episode);

            let branch_id = uuid::Uuid::new_v4().to_string();
            let episode_id = format!("{}:e{}", parent.id, episode);
            let execution = PipelineExecution::new_branch(
                branch_id.clone(),
                parent.request_id.clone(),
                parent.template_id.clone(),
                parent.id.clone(),
                episode_id,
                branch_steps_json,
                branch_context.to_json(),
            );
            self.store.executions.insert(&execution).await?;
            self.materialize_steps(&branch_id, &branch_steps).await?;

            info!(parent_id = %parent.id, branch_id = %branch_id, episode, step = %step.name, "spawned episode branch");

            let engine = self.clone_handles();
            tokio::spawn(async move {
                if let Err(err) = engine.walk(&branch_id).await {
                    warn!(%err, branch_id = %branch_id, "episode branch walk failed");
                }
            });
        }
        Ok(())
    }
}

/// A no-op convenience for tests that need an `Engine` without caring about
/// progress reporting.
pub fn null_progress() -> Arc<dyn ProgressSink> {
    Arc::new(NullProgressSink)
}
