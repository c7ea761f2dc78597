//! Per-request pipeline execution and per-step execution records.
//!
//! The step tree itself (`Template.steps` / `PipelineExecution.steps`) is
//! kept as an opaque `serde_json::Value` here so `mf-core` has no
//! dependency on `mf-engine`'s strongly-typed `Step` tree; the engine
//! parses/serializes through that boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "paused" => Some(Self::Paused),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Per-request runtime tree instance (spec.md §3 "PipelineExecution").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineExecution {
    pub id: String,
    pub request_id: String,
    pub template_id: String,
    pub status: ExecutionStatus,
    /// Index into DFS pre-order step list of the step currently (or most
    /// recently) being walked.
    pub current_step: i32,
    /// Snapshot of the template's step tree at start time (spec.md §3:
    /// "Templates are immutable at execution time").
    pub steps: serde_json::Value,
    /// Shared JSON accumulator merged by completed steps.
    pub context: serde_json::Value,
    pub parent_execution_id: Option<String>,
    pub episode_id: Option<String>,
    pub pause_reason: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl PipelineExecution {
    pub fn new_root(
        id: String,
        request_id: String,
        template_id: String,
        steps: serde_json::Value,
        context: serde_json::Value,
    ) -> Self {
        Self {
            id,
            request_id,
            template_id,
            status: ExecutionStatus::Running,
            current_step: 0,
            steps,
            context,
            parent_execution_id: None,
            episode_id: None,
            pause_reason: None,
            started_at: Utc::now(),
            completed_at: None,
            error: None,
        }
    }

    pub fn new_branch(
        id: String,
        request_id: String,
        template_id: String,
        parent_execution_id: String,
        episode_id: String,
        steps: serde_json::Value,
        context: serde_json::Value,
    ) -> Self {
        Self {
            id,
            request_id,
            template_id,
            status: ExecutionStatus::Running,
            current_step: 0,
            steps,
            context,
            parent_execution_id: Some(parent_execution_id),
            episode_id: Some(episode_id),
            pause_reason: None,
            started_at: Utc::now(),
            completed_at: None,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepExecutionStatus {
    Pending,
    Running,
    Completed,
    Skipped,
    Failed,
}

impl StepExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "skipped" => Some(Self::Skipped),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Skipped | Self::Failed)
    }
}

/// Per-step record inside an execution (spec.md §3 "StepExecution").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepExecutionRow {
    pub id: String,
    pub execution_id: String,
    pub step_order: i32,
    pub step_type: String,
    pub status: StepExecutionStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub progress: f32,
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl StepExecutionRow {
    pub fn new_pending(id: String, execution_id: String, step_order: i32, step_type: String) -> Self {
        Self {
            id,
            execution_id,
            step_order,
            step_type,
            status: StepExecutionStatus::Pending,
            started_at: None,
            completed_at: None,
            progress: 0.0,
            output: None,
            error: None,
        }
    }
}
