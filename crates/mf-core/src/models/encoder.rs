//! Encoder worker and job assignment tracking (spec.md §4.4).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Idle,
    Encoding,
    Offline,
}

impl WorkerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Encoding => "encoding",
            Self::Offline => "offline",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "idle" => Some(Self::Idle),
            "encoding" => Some(Self::Encoding),
            "offline" => Some(Self::Offline),
            _ => None,
        }
    }
}

/// Declared worker capabilities, e.g. supported codecs/containers, used
/// for capability-matching during scheduling (spec.md §4.4 "capability
/// match").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkerCapabilities {
    pub codecs: Vec<String>,
    pub accessible_paths: Vec<String>,
}

/// A remote encoder worker holding a long-lived connection to the
/// dispatcher (spec.md §3 "EncoderWorker").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderWorker {
    pub id: String,
    pub status: WorkerStatus,
    pub current_jobs: i32,
    pub max_concurrent: i32,
    pub blocked_until: Option<DateTime<Utc>>,
    pub last_heartbeat_at: DateTime<Utc>,
    pub capabilities: WorkerCapabilities,
}

impl EncoderWorker {
    pub fn new(id: String, max_concurrent: i32, capabilities: WorkerCapabilities) -> Self {
        Self {
            id,
            status: WorkerStatus::Idle,
            current_jobs: 0,
            max_concurrent,
            blocked_until: None,
            last_heartbeat_at: Utc::now(),
            capabilities,
        }
    }

    pub fn is_blocked(&self, now: DateTime<Utc>) -> bool {
        self.blocked_until.map(|t| t > now).unwrap_or(false)
    }

    pub fn free_capacity(&self) -> i32 {
        (self.max_concurrent - self.current_jobs).max(0)
    }

    pub fn is_available(&self, now: DateTime<Utc>) -> bool {
        self.status != WorkerStatus::Offline && !self.is_blocked(now) && self.free_capacity() > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncoderAssignmentStatus {
    Pending,
    Assigned,
    Encoding,
    Completed,
    Failed,
}

impl EncoderAssignmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Assigned => "assigned",
            Self::Encoding => "encoding",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "assigned" => Some(Self::Assigned),
            "encoding" => Some(Self::Encoding),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// A job offered to a specific encoder worker (spec.md §3
/// "EncoderAssignment"). At most one non-terminal assignment exists per
/// `job_id` at any instant — enforced by the repository layer, not this
/// struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderAssignment {
    pub id: String,
    pub job_id: String,
    pub encoder_id: Option<String>,
    pub status: EncoderAssignmentStatus,
    pub input_path: String,
    pub output_path: Option<String>,
    pub attempt: i32,
    pub max_attempts: i32,
    pub sent_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub last_progress_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub progress: f32,
    pub output_size: Option<i64>,
    pub compression_ratio: Option<f32>,
    pub encode_duration_secs: Option<i64>,
    pub error: Option<String>,
}

impl EncoderAssignment {
    pub fn new(id: String, job_id: String, input_path: String, max_attempts: i32) -> Self {
        Self {
            id,
            job_id,
            encoder_id: None,
            status: EncoderAssignmentStatus::Pending,
            input_path,
            output_path: None,
            attempt: 1,
            max_attempts,
            sent_at: None,
            started_at: None,
            last_progress_at: None,
            completed_at: None,
            progress: 0.0,
            output_size: None,
            compression_ratio: None,
            encode_duration_secs: None,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_capacity_worker_is_never_available() {
        let worker = EncoderWorker::new("w1".into(), 0, WorkerCapabilities::default());
        assert!(!worker.is_available(Utc::now()));
    }

    #[test]
    fn blocked_worker_is_unavailable_until_block_expires() {
        let mut worker = EncoderWorker::new("w1".into(), 2, WorkerCapabilities::default());
        worker.blocked_until = Some(Utc::now() + chrono::Duration::seconds(10));
        assert!(!worker.is_available(Utc::now()));
        assert!(worker.is_available(Utc::now() + chrono::Duration::seconds(11)));
    }

    #[test]
    fn free_capacity_accounts_for_current_jobs() {
        let mut worker = EncoderWorker::new("w1".into(), 3, WorkerCapabilities::default());
        worker.current_jobs = 2;
        assert_eq!(worker.free_capacity(), 1);
    }
}
