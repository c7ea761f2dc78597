//! External download (torrent/NZB/etc.) tracking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::RequestKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    Queued,
    Downloading,
    Completed,
    Failed,
}

impl DownloadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Downloading => "downloading",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "downloading" => Some(Self::Downloading),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Whether this status is compatible with a ProcessingItem sitting in
    /// DOWNLOADING (spec.md §3 cross-table invariant).
    pub fn is_in_progress_or_completed(&self) -> bool {
        matches!(self, Self::Queued | Self::Downloading | Self::Completed)
    }
}

/// One Download may back many ProcessingItems (spec.md §3: "season pack ->
/// episodes").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Download {
    pub id: String,
    pub request_id: String,
    pub torrent_hash: String,
    pub torrent_name: String,
    pub media_kind: RequestKind,
    pub status: DownloadStatus,
    pub progress: f32,
    pub save_path: String,
    pub content_path: Option<String>,
    pub size: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Download {
    pub fn new(
        id: String,
        request_id: String,
        torrent_hash: String,
        torrent_name: String,
        media_kind: RequestKind,
        save_path: String,
    ) -> Self {
        Self {
            id,
            request_id,
            torrent_hash,
            torrent_name,
            media_kind,
            status: DownloadStatus::Queued,
            progress: 0.0,
            save_path,
            content_path: None,
            size: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }
}
