//! Bridges `mf-engine`'s execution/context bookkeeping back onto
//! `ProcessingItem` rows. The engine only knows about
//! `PipelineExecution`/`StepExecution`; `ProcessingItem` is the
//! per-episode read model the HTTP API and recovery sweeps operate on
//! (spec.md §3's data-model invariants), so something has to translate
//! one into the other. This module does that translation by re-deriving
//! each item's status from its execution's accumulated context every
//! time it's polled, the same reconciliation idiom `mf-recovery`'s
//! sweeps already use rather than a push-based callback from inside the
//! engine.

use std::sync::Arc;

use mf_core::models::{ExecutionStatus, PipelineExecution, ProcessingItem, ProcessingItemStatus};
use mf_core::repository::StateStore;
use mf_core::CoreResult;
use mf_engine::context::PipelineContext;

fn derive_status(execution: &PipelineExecution, ctx: &PipelineContext) -> ProcessingItemStatus {
    if execution.status == ExecutionStatus::Cancelled {
        return ProcessingItemStatus::Cancelled;
    }
    if execution.status == ExecutionStatus::Failed {
        return ProcessingItemStatus::Failed;
    }
    if ctx.deliver.is_some() {
        return if execution.status == ExecutionStatus::Completed {
            ProcessingItemStatus::Completed
        } else {
            ProcessingItemStatus::Delivering
        };
    }
    if let Some(encode) = &ctx.encode {
        return if encode.encoded_files.is_empty() {
            ProcessingItemStatus::Encoding
        } else {
            ProcessingItemStatus::Encoded
        };
    }
    if let Some(download) = &ctx.download {
        return if download.content_path.is_some() || download.already_present {
            ProcessingItemStatus::Downloaded
        } else {
            ProcessingItemStatus::Downloading
        };
    }
    if ctx.search.is_some() {
        return ProcessingItemStatus::Found;
    }
    ProcessingItemStatus::Searching
}

/// Rough visual progress per status; recovery and handlers set more
/// precise progress (e.g. encode percentage) while a step is in flight,
/// this is only the value the sync applies at a status transition.
fn progress_for(status: ProcessingItemStatus) -> f32 {
    match status {
        ProcessingItemStatus::Pending => 0.0,
        ProcessingItemStatus::Searching => 5.0,
        ProcessingItemStatus::Discovered | ProcessingItemStatus::Found => 20.0,
        ProcessingItemStatus::Downloading => 40.0,
        ProcessingItemStatus::Downloaded => 60.0,
        ProcessingItemStatus::Encoding => 70.0,
        ProcessingItemStatus::Encoded => 85.0,
        ProcessingItemStatus::Delivering => 95.0,
        ProcessingItemStatus::Completed => 100.0,
        ProcessingItemStatus::Failed | ProcessingItemStatus::Cancelled => 0.0,
    }
}

fn apply_context(item: &mut ProcessingItem, status: ProcessingItemStatus, ctx: &PipelineContext) {
    item.status = status;
    item.progress = progress_for(status);
    if let Some(download) = &ctx.download {
        item.download_id = Some(download.download_id.clone());
        if let Some(path) = &download.source_file_path {
            item.source_file_path = Some(path.clone());
        }
    }
    if let Some(encode) = &ctx.encode {
        item.encoding_job_id = encode.encoding_job_id.clone();
        if let Some(first) = encode.encoded_files.first() {
            item.source_file_path = Some(first.clone());
        }
    }
    item.updated_at = chrono::Utc::now();
}

async fn items_for_execution(store: &StateStore, execution: &PipelineExecution, ctx: &PipelineContext) -> CoreResult<Vec<ProcessingItem>> {
    let all = store.processing_items.list_by_request(&execution.request_id).await?;
    if execution.episode_id.is_some() {
        let season = ctx.request.get("season").and_then(|v| v.as_i64()).map(|v| v as i32);
        let episode = ctx.request.get("episode").and_then(|v| v.as_i64()).map(|v| v as i32);
        Ok(all.into_iter().filter(|i| i.season == season && i.episode == episode).collect())
    } else if execution.parent_execution_id.is_none() {
        Ok(all)
    } else {
        Ok(Vec::new())
    }
}

/// Re-derives status for every `ProcessingItem` tied to one execution and
/// persists the ones that changed. Never regresses an item already in a
/// terminal state (COMPLETED/CANCELLED), since a stale re-sync of an
/// older execution snapshot must not undo a later sweep's repair.
pub async fn sync_execution(store: &StateStore, execution: &PipelineExecution) -> CoreResult<()> {
    let ctx = PipelineContext::from_json(execution.context.clone());
    let derived = derive_status(execution, &ctx);

    for mut item in items_for_execution(store, execution, &ctx).await? {
        if matches!(item.status, ProcessingItemStatus::Completed | ProcessingItemStatus::Cancelled) {
            continue;
        }
        if item.status == derived {
            continue;
        }
        apply_context(&mut item, derived, &ctx);
        store.processing_items.save(&item).await?;
    }
    Ok(())
}

/// Syncs every non-terminal execution for one request, used right after
/// a request is submitted and by the periodic sync task.
pub async fn sync_request(store: &Arc<StateStore>, request_id: &str) -> CoreResult<()> {
    for execution in store.executions.list_by_request(request_id).await? {
        sync_execution(store, &execution).await?;
        for child in store.executions.list_children(&execution.id).await? {
            sync_execution(store, &child).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mf_core::models::{ProcessingItem, RequestKind, RequestRow};

    async fn new_store() -> (StateStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let url = db_path.to_str().unwrap().to_string();
        (StateStore::connect(&url).await.unwrap(), dir)
    }

    #[tokio::test]
    async fn movie_execution_advances_matching_item_to_downloading() {
        let (store, _dir) = new_store().await;
        let request = RequestRow::new("r1".into(), RequestKind::Movie, 1, "Arrival".into(), None, vec!["plex".into()]);
        store.requests.insert(&request).await.unwrap();

        let mut item = ProcessingItem::new_movie("i1".into(), "r1".into(), 1, "Arrival".into());
        item.status = ProcessingItemStatus::Found;
        store.processing_items.insert(&item).await.unwrap();

        let mut execution = PipelineExecution::new_root(
            "e1".into(),
            "r1".into(),
            "t1".into(),
            serde_json::json!([]),
            serde_json::json!({"request": {}}),
        );
        execution.context = serde_json::json!({
            "request": {},
            "download": {"download_id": "d1", "content_path": null, "source_file_path": null, "already_present": false},
        });
        store.executions.insert(&execution).await.unwrap();

        sync_execution(&store, &execution).await.unwrap();

        let reloaded = store.processing_items.get("i1").await.unwrap().unwrap();
        assert_eq!(reloaded.status, ProcessingItemStatus::Downloading);
        assert_eq!(reloaded.download_id.as_deref(), Some("d1"));
    }

    #[tokio::test]
    async fn completed_items_are_never_regressed() {
        let (store, _dir) = new_store().await;
        let request = RequestRow::new("r1".into(), RequestKind::Movie, 1, "Arrival".into(), None, vec!["plex".into()]);
        store.requests.insert(&request).await.unwrap();

        let mut item = ProcessingItem::new_movie("i1".into(), "r1".into(), 1, "Arrival".into());
        item.status = ProcessingItemStatus::Completed;
        item.progress = 100.0;
        store.processing_items.insert(&item).await.unwrap();

        let mut execution = PipelineExecution::new_root(
            "e1".into(),
            "r1".into(),
            "t1".into(),
            serde_json::json!([]),
            serde_json::json!({"request": {}}),
        );
        execution.context = serde_json::json!({"request": {}});
        store.executions.insert(&execution).await.unwrap();

        sync_execution(&store, &execution).await.unwrap();

        let reloaded = store.processing_items.get("i1").await.unwrap().unwrap();
        assert_eq!(reloaded.status, ProcessingItemStatus::Completed);
    }
}
