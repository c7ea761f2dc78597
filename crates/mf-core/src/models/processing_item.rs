//! The per-artifact state machine (spec.md §4.3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingItemType {
    Movie,
    Episode,
}

impl ProcessingItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Movie => "movie",
            Self::Episode => "episode",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "movie" => Some(Self::Movie),
            "episode" => Some(Self::Episode),
            _ => None,
        }
    }
}

/// The state machine in spec.md §4.3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingItemStatus {
    Pending,
    Searching,
    Discovered,
    Found,
    Downloading,
    Downloaded,
    Encoding,
    Encoded,
    Delivering,
    Completed,
    Failed,
    Cancelled,
}

impl ProcessingItemStatus {
    pub fn as_str(&self) -> &'static str {
        use ProcessingItemStatus::*;
        match self {
            Pending => "pending",
            Searching => "searching",
            Discovered => "discovered",
            Found => "found",
            Downloading => "downloading",
            Downloaded => "downloaded",
            Encoding => "encoding",
            Encoded => "encoded",
            Delivering => "delivering",
            Completed => "completed",
            Failed => "failed",
            Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        use ProcessingItemStatus::*;
        Some(match s {
            "pending" => Pending,
            "searching" => Searching,
            "discovered" => Discovered,
            "found" => Found,
            "downloading" => Downloading,
            "downloaded" => Downloaded,
            "encoding" => Encoding,
            "encoded" => Encoded,
            "delivering" => Delivering,
            "completed" => Completed,
            "failed" => Failed,
            "cancelled" => Cancelled,
            _ => return None,
        })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// The declared legal transitions from spec.md §4.3's state diagram.
    fn legal_targets(&self) -> &'static [ProcessingItemStatus] {
        use ProcessingItemStatus::*;
        match self {
            Pending => &[Searching, Cancelled],
            Searching => &[Discovered, Found, Failed, Cancelled],
            Discovered => &[Downloading, Cancelled],
            Found => &[Downloading, Failed, Cancelled],
            Downloading => &[Downloaded, Failed, Cancelled],
            Downloaded => &[Encoding, Failed, Cancelled],
            Encoding => &[Encoded, Failed, Cancelled],
            Encoded => &[Delivering, Failed, Cancelled],
            Delivering => &[Completed, Failed, Cancelled],
            Failed => &[Pending],
            Completed => &[],
            Cancelled => &[],
        }
    }

    pub fn can_transition_to(&self, target: ProcessingItemStatus) -> bool {
        self.legal_targets().contains(&target)
    }
}

/// Extra validation payload required to cross certain edges of the state
/// machine (spec.md §4.3: "entering DOWNLOADING requires downloadId ...
/// exiting DOWNLOADED requires sourceFilePath and a file-validation flag").
#[derive(Debug, Default, Clone)]
pub struct TransitionContext<'a> {
    pub download_id: Option<&'a str>,
    pub source_file_path: Option<&'a str>,
    pub file_validated: bool,
    pub encoding_job_id: Option<&'a str>,
}

/// A unit of acquisition work: one movie, or one TV episode (spec.md §3
/// "ProcessingItem").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingItem {
    pub id: String,
    pub request_id: String,
    pub item_type: ProcessingItemType,
    pub tmdb_id: i64,
    pub title: String,
    pub season: Option<i32>,
    pub episode: Option<i32>,
    pub status: ProcessingItemStatus,
    pub progress: f32,
    pub current_step: Option<String>,
    pub step_context: serde_json::Value,
    pub download_id: Option<String>,
    pub encoding_job_id: Option<String>,
    pub source_file_path: Option<String>,
    pub cooldown_ends_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProcessingItem {
    pub fn new_movie(id: String, request_id: String, tmdb_id: i64, title: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            request_id,
            item_type: ProcessingItemType::Movie,
            tmdb_id,
            title,
            season: None,
            episode: None,
            status: ProcessingItemStatus::Pending,
            progress: 0.0,
            current_step: None,
            step_context: serde_json::json!({}),
            download_id: None,
            encoding_job_id: None,
            source_file_path: None,
            cooldown_ends_at: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn new_episode(
        id: String,
        request_id: String,
        tmdb_id: i64,
        title: String,
        season: i32,
        episode: i32,
    ) -> Self {
        let mut item = Self::new_movie(id, request_id, tmdb_id, title);
        item.item_type = ProcessingItemType::Episode;
        item.season = Some(season);
        item.episode = Some(episode);
        item
    }

    /// Validate and apply a status transition in-place. Implements
    /// spec.md §4.3's entry/exit validation: "Invalid transitions are
    /// rejected with a structured error."
    pub fn transition(
        &mut self,
        target: ProcessingItemStatus,
        ctx: TransitionContext<'_>,
    ) -> CoreResult<()> {
        if !self.status.can_transition_to(target) {
            return Err(CoreError::InvalidTransition(format!(
                "{} -> {} is not a legal transition for item {}",
                self.status.as_str(),
                target.as_str(),
                self.id
            )));
        }

        if target == ProcessingItemStatus::Downloading {
            let download_id = ctx.download_id.or(self.download_id.as_deref()).ok_or_else(|| {
                CoreError::InvalidTransition(
                    "entering DOWNLOADING requires a download_id".to_string(),
                )
            })?;
            self.download_id = Some(download_id.to_string());
        }

        if self.status == ProcessingItemStatus::Downloaded
            && target == ProcessingItemStatus::Encoding
        {
            let path = ctx
                .source_file_path
                .or(self.source_file_path.as_deref())
                .ok_or_else(|| {
                    CoreError::InvalidTransition(
                        "exiting DOWNLOADED requires source_file_path".to_string(),
                    )
                })?;
            if !ctx.file_validated {
                return Err(CoreError::InvalidTransition(
                    "exiting DOWNLOADED requires a file-validation flag in step_context"
                        .to_string(),
                ));
            }
            self.source_file_path = Some(path.to_string());
        }

        if target == ProcessingItemStatus::Encoding {
            if let Some(job_id) = ctx.encoding_job_id {
                self.encoding_job_id = Some(job_id.to_string());
            }
        }

        self.status = target;
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_to_searching_is_legal() {
        assert!(ProcessingItemStatus::Pending.can_transition_to(ProcessingItemStatus::Searching));
    }

    #[test]
    fn completed_has_no_outgoing_transitions() {
        assert!(!ProcessingItemStatus::Completed.can_transition_to(ProcessingItemStatus::Pending));
    }

    #[test]
    fn failed_can_retry_to_pending() {
        assert!(ProcessingItemStatus::Failed.can_transition_to(ProcessingItemStatus::Pending));
    }

    #[test]
    fn entering_downloading_requires_download_id() {
        let mut item =
            ProcessingItem::new_movie("i1".into(), "r1".into(), 1, "Arrival".into());
        item.status = ProcessingItemStatus::Found;
        let err = item
            .transition(ProcessingItemStatus::Downloading, TransitionContext::default())
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidTransition(_)));
    }

    #[test]
    fn entering_downloading_with_download_id_succeeds() {
        let mut item =
            ProcessingItem::new_movie("i1".into(), "r1".into(), 1, "Arrival".into());
        item.status = ProcessingItemStatus::Found;
        item.transition(
            ProcessingItemStatus::Downloading,
            TransitionContext {
                download_id: Some("dl1"),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(item.status, ProcessingItemStatus::Downloading);
        assert_eq!(item.download_id.as_deref(), Some("dl1"));
    }

    #[test]
    fn exiting_downloaded_requires_validated_file() {
        let mut item =
            ProcessingItem::new_movie("i1".into(), "r1".into(), 1, "Arrival".into());
        item.status = ProcessingItemStatus::Downloaded;
        let err = item
            .transition(
                ProcessingItemStatus::Encoding,
                TransitionContext {
                    source_file_path: Some("/data/arrival.mkv"),
                    file_validated: false,
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidTransition(_)));

        item.transition(
            ProcessingItemStatus::Encoding,
            TransitionContext {
                source_file_path: Some("/data/arrival.mkv"),
                file_validated: true,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(item.status, ProcessingItemStatus::Encoding);
    }

    #[test]
    fn invalid_transition_is_rejected() {
        let mut item =
            ProcessingItem::new_movie("i1".into(), "r1".into(), 1, "Arrival".into());
        let err = item
            .transition(ProcessingItemStatus::Completed, TransitionContext::default())
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidTransition(_)));
    }
}
