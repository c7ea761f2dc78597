//! The five recovery sweepers (spec.md §4.5, component C6): "the only
//! authority able to shortcut the state machine for crash recovery".
//! Unlike ordinary callers, these functions write `ProcessingItem.status`
//! directly through the repository rather than through
//! `ProcessingItem::transition`, since several of their moves (FOUND ->
//! PENDING, DOWNLOADING -> PENDING) are not legal edges in the declared
//! state machine and only recovery is allowed to take them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use mf_core::models::{DownloadStatus, EncoderAssignmentStatus, ProcessingItem, ProcessingItemStatus};
use mf_core::repository::StateStore;
use mf_engine::ports::DeliveryAdapter;
use tracing::{info, warn};

use crate::error::RecoveryResult;

/// How stale an item must be before a sweep acts on it. Spec.md §4.5
/// states a uniform ">5 minutes" threshold for every sweep; kept as one
/// knob rather than one per sweep since nothing in the spec varies it.
#[derive(Debug, Clone, Copy)]
pub struct RecoveryConfig {
    pub stale_after: Duration,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            stale_after: Duration::from_secs(5 * 60),
        }
    }
}

/// Count of items repaired by one sweep pass, returned so callers (the
/// scheduler, the CLI's `recover run-once`) can log what happened.
pub type SweepReport = usize;

async fn revert_to_pending(store: &StateStore, item: &mut ProcessingItem) -> RecoveryResult<()> {
    item.status = ProcessingItemStatus::Pending;
    item.updated_at = Utc::now();
    store.processing_items.save(item).await?;
    Ok(())
}

/// Items in FOUND for longer than the staleness window without a
/// `downloadId` never got a download started; send them back to PENDING
/// so the normal SEARCH/DOWNLOAD handlers pick them up again.
pub async fn sweep_found_without_download_id(
    store: &StateStore,
    config: &RecoveryConfig,
) -> RecoveryResult<SweepReport> {
    let older_than = Utc::now() - chrono::Duration::from_std(config.stale_after).unwrap_or_default();
    let stale = store
        .processing_items
        .list_stale_by_status(ProcessingItemStatus::Found, older_than)
        .await?;

    let mut repaired = 0;
    for mut item in stale {
        if item.download_id.is_none() {
            revert_to_pending(store, &mut item).await?;
            info!(item_id = %item.id, "recovered FOUND item without a download id");
            repaired += 1;
        }
    }
    Ok(repaired)
}

/// Items sitting in DOWNLOADING at 100% progress for longer than the
/// staleness window have a completed Download the item's own handler
/// never observed (e.g. the process crashed between the download client
/// reporting completion and the engine re-walking). Reverting to PENDING
/// lets the normal path re-discover the completed Download and transition
/// properly rather than the sweep faking a DOWNLOADED transition itself.
pub async fn sweep_completed_downloads_stuck_downloading(
    store: &StateStore,
    config: &RecoveryConfig,
) -> RecoveryResult<SweepReport> {
    let older_than = Utc::now() - chrono::Duration::from_std(config.stale_after).unwrap_or_default();
    let stale = store
        .processing_items
        .list_stale_by_status(ProcessingItemStatus::Downloading, older_than)
        .await?;

    let mut repaired = 0;
    for mut item in stale {
        if item.progress < 100.0 {
            continue;
        }
        let download_completed = match &item.download_id {
            Some(download_id) => store
                .downloads
                .get(download_id)
                .await?
                .map(|d| d.status == DownloadStatus::Completed)
                .unwrap_or(false),
            None => false,
        };
        if download_completed {
            revert_to_pending(store, &mut item).await?;
            info!(item_id = %item.id, "recovered item stuck in DOWNLOADING past a completed download");
            repaired += 1;
        }
    }
    Ok(repaired)
}

/// Within one `(requestId, season)` group, if some episodes already carry
/// a `downloadId` (one season pack backs all of them) and others don't,
/// adopt the shared id onto the unlinked episodes and move them straight
/// to DOWNLOADING — they're backed by the same download, they were just
/// never told.
pub async fn sweep_mixed_season_linkage(store: &StateStore) -> RecoveryResult<SweepReport> {
    let linked = store
        .processing_items
        .list_by_status(ProcessingItemStatus::Downloading)
        .await?;

    let mut download_by_group: HashMap<(String, i32), String> = HashMap::new();
    for item in &linked {
        if let (Some(season), Some(download_id)) = (item.season, item.download_id.clone()) {
            download_by_group
                .entry((item.request_id.clone(), season))
                .or_insert(download_id);
        }
    }

    if download_by_group.is_empty() {
        return Ok(0);
    }

    let unlinkable = [
        ProcessingItemStatus::Pending,
        ProcessingItemStatus::Searching,
        ProcessingItemStatus::Discovered,
        ProcessingItemStatus::Found,
    ];

    let mut repaired = 0;
    for ((request_id, season), download_id) in download_by_group {
        let siblings = store.processing_items.list_by_request(&request_id).await?;
        for mut item in siblings {
            if item.season != Some(season) || item.download_id.is_some() {
                continue;
            }
            if !unlinkable.contains(&item.status) {
                continue;
            }
            item.download_id = Some(download_id.clone());
            item.status = ProcessingItemStatus::Downloading;
            item.updated_at = Utc::now();
            store.processing_items.save(&item).await?;
            info!(item_id = %item.id, download_id = %download_id, "adopted season-pack download onto unlinked episode");
            repaired += 1;
        }
    }
    Ok(repaired)
}

/// Items in ENCODING whose `EncoderAssignment` already reached a terminal
/// state but whose item row never moved: re-inject the encode result and
/// advance ENCODING -> ENCODED. A FAILED assignment is left alone for a
/// manual retry (spec.md §4.5: "FAILED leaves item as-is").
pub async fn sweep_stuck_encoding(store: &StateStore) -> RecoveryResult<SweepReport> {
    let encoding = store
        .processing_items
        .list_by_status(ProcessingItemStatus::Encoding)
        .await?;

    let mut repaired = 0;
    for mut item in encoding {
        let Some(job_id) = item.encoding_job_id.clone() else {
            continue;
        };
        let Some(assignment) = store.encoders.get_assignment(&job_id).await? else {
            continue;
        };
        match assignment.status {
            EncoderAssignmentStatus::Completed => {
                item.status = ProcessingItemStatus::Encoded;
                item.progress = 100.0;
                if let Some(output_path) = assignment.output_path {
                    item.source_file_path = Some(output_path);
                }
                item.updated_at = Utc::now();
                store.processing_items.save(&item).await?;
                info!(item_id = %item.id, job_id, "recovered item stuck in ENCODING past a completed assignment");
                repaired += 1;
            }
            EncoderAssignmentStatus::Failed => {
                warn!(item_id = %item.id, job_id, "encode assignment failed, leaving item for manual retry");
            }
            _ => {}
        }
    }
    Ok(repaired)
}

/// Items in DELIVERING whose delivery target already has the file
/// transition straight to COMPLETED; items that made no progress for
/// longer than the staleness window are given up on and marked FAILED.
pub async fn sweep_stuck_delivery(
    store: &StateStore,
    delivery: &Arc<dyn DeliveryAdapter>,
    config: &RecoveryConfig,
) -> RecoveryResult<SweepReport> {
    let delivering = store
        .processing_items
        .list_by_status(ProcessingItemStatus::Delivering)
        .await?;
    let older_than = Utc::now() - chrono::Duration::from_std(config.stale_after).unwrap_or_default();

    let mut repaired = 0;
    for mut item in delivering {
        let Some(source_path) = item.source_file_path.clone() else {
            continue;
        };
        let Some(request) = store.requests.get(&item.request_id).await? else {
            continue;
        };

        let mut found_everywhere = !request.targets.is_empty();
        for target in &request.targets {
            let exists = delivery.exists(target, &source_path).await?;
            if !exists {
                found_everywhere = false;
                break;
            }
        }

        if found_everywhere {
            item.status = ProcessingItemStatus::Completed;
            item.progress = 100.0;
            item.updated_at = Utc::now();
            store.processing_items.save(&item).await?;
            info!(item_id = %item.id, "recovered item stuck in DELIVERING, file present at every target");
            repaired += 1;
        } else if item.updated_at < older_than {
            item.status = ProcessingItemStatus::Failed;
            item.last_error = Some("delivery stalled and no progress was made".to_string());
            item.updated_at = Utc::now();
            store.processing_items.save(&item).await?;
            warn!(item_id = %item.id, "gave up on a stalled delivery");
            repaired += 1;
        }
    }
    Ok(repaired)
}

/// Bundles a store, the delivery adapter the stuck-delivery sweep needs
/// to probe targets, and the staleness config, so the scheduler can hold
/// one `Arc<RecoveryWorkers>` and register all five sweeps against it.
pub struct RecoveryWorkers {
    store: Arc<StateStore>,
    delivery: Arc<dyn DeliveryAdapter>,
    config: RecoveryConfig,
}

impl RecoveryWorkers {
    pub fn new(store: Arc<StateStore>, delivery: Arc<dyn DeliveryAdapter>, config: RecoveryConfig) -> Self {
        Self { store, delivery, config }
    }

    pub async fn sweep_found_without_download_id(&self) -> RecoveryResult<SweepReport> {
        sweep_found_without_download_id(&self.store, &self.config).await
    }

    pub async fn sweep_completed_downloads_stuck_downloading(&self) -> RecoveryResult<SweepReport> {
        sweep_completed_downloads_stuck_downloading(&self.store, &self.config).await
    }

    pub async fn sweep_mixed_season_linkage(&self) -> RecoveryResult<SweepReport> {
        sweep_mixed_season_linkage(&self.store).await
    }

    pub async fn sweep_stuck_encoding(&self) -> RecoveryResult<SweepReport> {
        sweep_stuck_encoding(&self.store).await
    }

    pub async fn sweep_stuck_delivery(&self) -> RecoveryResult<SweepReport> {
        sweep_stuck_delivery(&self.store, &self.delivery, &self.config).await
    }

    /// Runs every sweep once, in spec order, and returns how many items
    /// each one repaired. Used by `mediaforge recover run-once` and by
    /// the scheduler's individual per-sweep tasks below.
    pub async fn run_all_once(&self) -> RecoveryResult<[SweepReport; 5]> {
        Ok([
            self.sweep_found_without_download_id().await?,
            self.sweep_completed_downloads_stuck_downloading().await?,
            self.sweep_mixed_season_linkage().await?,
            self.sweep_stuck_encoding().await?,
            self.sweep_stuck_delivery().await?,
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mf_core::models::{Download, RequestKind, RequestRow};

    async fn new_store() -> (StateStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let url = db_path.to_str().unwrap().to_string();
        let store = StateStore::connect(&url).await.unwrap();
        (store, dir)
    }

    fn stale_config() -> RecoveryConfig {
        RecoveryConfig {
            stale_after: Duration::from_secs(300),
        }
    }

    #[tokio::test]
    async fn found_without_download_id_reverts_to_pending() {
        let (store, _dir) = new_store().await;
        let mut item = ProcessingItem::new_movie("i1".into(), "r1".into(), 1, "Arrival".into());
        item.status = ProcessingItemStatus::Found;
        item.updated_at = Utc::now() - chrono::Duration::seconds(600);
        store.processing_items.insert(&item).await.unwrap();

        let repaired = sweep_found_without_download_id(&store, &stale_config()).await.unwrap();
        assert_eq!(repaired, 1);
        let reloaded = store.processing_items.get("i1").await.unwrap().unwrap();
        assert_eq!(reloaded.status, ProcessingItemStatus::Pending);
    }

    #[tokio::test]
    async fn found_with_download_id_is_left_alone() {
        let (store, _dir) = new_store().await;
        let mut item = ProcessingItem::new_movie("i1".into(), "r1".into(), 1, "Arrival".into());
        item.status = ProcessingItemStatus::Found;
        item.download_id = Some("d1".into());
        item.updated_at = Utc::now() - chrono::Duration::seconds(600);
        store.processing_items.insert(&item).await.unwrap();

        let repaired = sweep_found_without_download_id(&store, &stale_config()).await.unwrap();
        assert_eq!(repaired, 0);
    }

    #[tokio::test]
    async fn stuck_downloading_at_full_progress_reverts_when_download_completed() {
        let (store, _dir) = new_store().await;
        let download = Download::new(
            "d1".into(),
            "r1".into(),
            "hash1".into(),
            "Arrival.2016".into(),
            RequestKind::Movie,
            "/data".into(),
        );
        let mut download = download;
        download.status = DownloadStatus::Completed;
        store.downloads.insert(&download).await.unwrap();

        let mut item = ProcessingItem::new_movie("i1".into(), "r1".into(), 1, "Arrival".into());
        item.status = ProcessingItemStatus::Downloading;
        item.download_id = Some("d1".into());
        item.progress = 100.0;
        item.updated_at = Utc::now() - chrono::Duration::seconds(600);
        store.processing_items.insert(&item).await.unwrap();

        let repaired = sweep_completed_downloads_stuck_downloading(&store, &stale_config())
            .await
            .unwrap();
        assert_eq!(repaired, 1);
        let reloaded = store.processing_items.get("i1").await.unwrap().unwrap();
        assert_eq!(reloaded.status, ProcessingItemStatus::Pending);
    }

    #[tokio::test]
    async fn mixed_season_linkage_adopts_download_onto_unlinked_episode() {
        let (store, _dir) = new_store().await;
        let mut linked = ProcessingItem::new_episode("e1".into(), "r1".into(), 1, "Show".into(), 1, 1);
        linked.status = ProcessingItemStatus::Downloading;
        linked.download_id = Some("d1".into());
        store.processing_items.insert(&linked).await.unwrap();

        let mut unlinked = ProcessingItem::new_episode("e2".into(), "r1".into(), 1, "Show".into(), 1, 2);
        unlinked.status = ProcessingItemStatus::Found;
        store.processing_items.insert(&unlinked).await.unwrap();

        let repaired = sweep_mixed_season_linkage(&store).await.unwrap();
        assert_eq!(repaired, 1);
        let reloaded = store.processing_items.get("e2").await.unwrap().unwrap();
        assert_eq!(reloaded.status, ProcessingItemStatus::Downloading);
        assert_eq!(reloaded.download_id.as_deref(), Some("d1"));
    }

    #[tokio::test]
    async fn stuck_encoding_advances_on_completed_assignment() {
        use mf_core::models::EncoderAssignment;

        let (store, _dir) = new_store().await;
        let mut assignment = EncoderAssignment::new("a1".into(), "a1".into(), "/data/in.mkv".into(), 3);
        assignment.status = EncoderAssignmentStatus::Completed;
        assignment.output_path = Some("/data/out.mkv".into());
        store.encoders.insert_assignment(&assignment).await.unwrap();

        let mut item = ProcessingItem::new_movie("i1".into(), "r1".into(), 1, "Arrival".into());
        item.status = ProcessingItemStatus::Encoding;
        item.encoding_job_id = Some("a1".into());
        store.processing_items.insert(&item).await.unwrap();

        let repaired = sweep_stuck_encoding(&store).await.unwrap();
        assert_eq!(repaired, 1);
        let reloaded = store.processing_items.get("i1").await.unwrap().unwrap();
        assert_eq!(reloaded.status, ProcessingItemStatus::Encoded);
        assert_eq!(reloaded.source_file_path.as_deref(), Some("/data/out.mkv"));
    }

    #[tokio::test]
    async fn stuck_encoding_leaves_failed_assignment_alone() {
        use mf_core::models::EncoderAssignment;

        let (store, _dir) = new_store().await;
        let mut assignment = EncoderAssignment::new("a1".into(), "a1".into(), "/data/in.mkv".into(), 3);
        assignment.status = EncoderAssignmentStatus::Failed;
        store.encoders.insert_assignment(&assignment).await.unwrap();

        let mut item = ProcessingItem::new_movie("i1".into(), "r1".into(), 1, "Arrival".into());
        item.status = ProcessingItemStatus::Encoding;
        item.encoding_job_id = Some("a1".into());
        store.processing_items.insert(&item).await.unwrap();

        let repaired = sweep_stuck_encoding(&store).await.unwrap();
        assert_eq!(repaired, 0);
        let reloaded = store.processing_items.get("i1").await.unwrap().unwrap();
        assert_eq!(reloaded.status, ProcessingItemStatus::Encoding);
    }

    struct AlwaysExists;
    struct NeverExists;

    #[async_trait::async_trait]
    impl DeliveryAdapter for AlwaysExists {
        async fn deliver(&self, _target: &str, source_path: &str) -> Result<String, mf_engine::ports::AdapterError> {
            Ok(source_path.to_string())
        }
        async fn exists(&self, _target: &str, _expected_path: &str) -> Result<bool, mf_engine::ports::AdapterError> {
            Ok(true)
        }
    }

    #[async_trait::async_trait]
    impl DeliveryAdapter for NeverExists {
        async fn deliver(&self, _target: &str, source_path: &str) -> Result<String, mf_engine::ports::AdapterError> {
            Ok(source_path.to_string())
        }
        async fn exists(&self, _target: &str, _expected_path: &str) -> Result<bool, mf_engine::ports::AdapterError> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn stuck_delivery_completes_when_file_present_at_every_target() {
        let (store, _dir) = new_store().await;
        let mut request = RequestRow::new("r1".into(), RequestKind::Movie, 1, "Arrival".into(), None, vec!["plex".into()]);
        request.targets = vec!["plex".into()];
        store.requests.insert(&request).await.unwrap();

        let mut item = ProcessingItem::new_movie("i1".into(), "r1".into(), 1, "Arrival".into());
        item.status = ProcessingItemStatus::Delivering;
        item.source_file_path = Some("/data/out.mkv".into());
        store.processing_items.insert(&item).await.unwrap();

        let delivery: Arc<dyn DeliveryAdapter> = Arc::new(AlwaysExists);
        let repaired = sweep_stuck_delivery(&store, &delivery, &stale_config()).await.unwrap();
        assert_eq!(repaired, 1);
        let reloaded = store.processing_items.get("i1").await.unwrap().unwrap();
        assert_eq!(reloaded.status, ProcessingItemStatus::Completed);
    }

    #[tokio::test]
    async fn stuck_delivery_fails_when_stalled_without_progress() {
        let (store, _dir) = new_store().await;
        let mut request = RequestRow::new("r1".into(), RequestKind::Movie, 1, "Arrival".into(), None, vec!["plex".into()]);
        request.targets = vec!["plex".into()];
        store.requests.insert(&request).await.unwrap();

        let mut item = ProcessingItem::new_movie("i1".into(), "r1".into(), 1, "Arrival".into());
        item.status = ProcessingItemStatus::Delivering;
        item.source_file_path = Some("/data/out.mkv".into());
        item.updated_at = Utc::now() - chrono::Duration::seconds(600);
        store.processing_items.insert(&item).await.unwrap();

        let delivery: Arc<dyn DeliveryAdapter> = Arc::new(NeverExists);
        let repaired = sweep_stuck_delivery(&store, &delivery, &stale_config()).await.unwrap();
        assert_eq!(repaired, 1);
        let reloaded = store.processing_items.get("i1").await.unwrap().unwrap();
        assert_eq!(reloaded.status, ProcessingItemStatus::Failed);
    }

    #[tokio::test]
    async fn run_all_once_repairs_every_kind_of_stuck_item() {
        let (store, _dir) = new_store().await;
        let mut item = ProcessingItem::new_movie("i1".into(), "r1".into(), 1, "Arrival".into());
        item.status = ProcessingItemStatus::Found;
        item.updated_at = Utc::now() - chrono::Duration::seconds(600);
        store.processing_items.insert(&item).await.unwrap();

        let store = Arc::new(store);
        let delivery: Arc<dyn DeliveryAdapter> = Arc::new(NeverExists);
        let workers = RecoveryWorkers::new(store.clone(), delivery, stale_config());

        let report = workers.run_all_once().await.unwrap();
        assert_eq!(report[0], 1);
        let reloaded = store.processing_items.get("i1").await.unwrap().unwrap();
        assert_eq!(reloaded.status, ProcessingItemStatus::Pending);
    }
}
