//! The user-level acquisition order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a request is acquiring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Movie,
    Tv,
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Movie => "movie",
            Self::Tv => "tv",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "movie" => Some(Self::Movie),
            "tv" => Some(Self::Tv),
            _ => None,
        }
    }
}

/// Derived status of a request, computed from the aggregate of its
/// `ProcessingItem`s (spec.md §3: "Request.status is derived ... once
/// ProcessingItems exist").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
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

/// A user's acquisition order (spec.md §3 "Request").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestRow {
    pub id: String,
    pub kind: RequestKind,
    pub tmdb_id: i64,
    pub title: String,
    pub year: Option<i32>,
    pub requested_seasons: Option<Vec<i32>>,
    pub requested_episodes: Option<Vec<i32>>,
    pub targets: Vec<String>,
    pub status: RequestStatus,
    pub progress: f32,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl RequestRow {
    pub fn new(
        id: String,
        kind: RequestKind,
        tmdb_id: i64,
        title: String,
        year: Option<i32>,
        targets: Vec<String>,
    ) -> Self {
        Self {
            id,
            kind,
            tmdb_id,
            title,
            year,
            requested_seasons: None,
            requested_episodes: None,
            targets,
            status: RequestStatus::Pending,
            progress: 0.0,
            error: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }
}

/// Aggregate a request's status/progress from the statuses of its
/// processing items. Implements spec.md §3's "compute from ProcessingItem
/// aggregate" invariant.
pub fn derive_request_status(
    items: &[super::ProcessingItemStatus],
) -> (RequestStatus, f32) {
    use super::ProcessingItemStatus as S;

    if items.is_empty() {
        return (RequestStatus::Pending, 0.0);
    }

    let total = items.len() as f32;
    let terminal_weight: f32 = items
        .iter()
        .map(|s| match s {
            S::Completed | S::Cancelled | S::Failed => 1.0,
            S::Pending => 0.0,
            _ => 0.5,
        })
        .sum();
    let progress = ((terminal_weight / total) * 100.0).min(100.0);

    if items.iter().all(|s| matches!(s, S::Completed)) {
        return (RequestStatus::Completed, 100.0);
    }
    if items.iter().any(|s| matches!(s, S::Cancelled)) && items.iter().all(|s| {
        matches!(s, S::Completed | S::Cancelled)
    }) {
        return (RequestStatus::Cancelled, progress);
    }
    if items.iter().all(|s| matches!(s, S::Failed | S::Completed | S::Cancelled))
        && items.iter().any(|s| matches!(s, S::Failed))
    {
        return (RequestStatus::Failed, progress);
    }
    if items.iter().all(|s| matches!(s, S::Pending)) {
        return (RequestStatus::Pending, 0.0);
    }
    (RequestStatus::InProgress, progress)
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::ProcessingItemStatus as S;

    #[test]
    fn all_completed_is_completed() {
        let (status, progress) = derive_request_status(&[S::Completed, S::Completed]);
        assert_eq!(status, RequestStatus::Completed);
        assert_eq!(progress, 100.0);
    }

    #[test]
    fn mixed_in_flight_is_in_progress() {
        let (status, _) = derive_request_status(&[S::Completed, S::Encoding]);
        assert_eq!(status, RequestStatus::InProgress);
    }

    #[test]
    fn any_failed_with_rest_terminal_is_failed() {
        let (status, _) = derive_request_status(&[S::Completed, S::Failed]);
        assert_eq!(status, RequestStatus::Failed);
    }

    #[test]
    fn empty_is_pending() {
        let (status, progress) = derive_request_status(&[]);
        assert_eq!(status, RequestStatus::Pending);
        assert_eq!(progress, 0.0);
    }
}
