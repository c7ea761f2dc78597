//! S5: a season pack is recognized once at the root (SEARCH), the engine
//! fans out one branch execution per requested episode, and each branch
//! runs its own DOWNLOAD (skipped: the season pack is already on disk) ->
//! ENCODE -> DELIVER subtree to completion.

mod support;

use std::sync::Arc;
use std::time::Duration;

use mf_core::models::{Download, DownloadStatus, ExecutionStatus, StepExecutionStatus};
use mf_engine::handlers::{DeliverHandler, DownloadHandler, EncodeHandler, SearchHandler};
use mf_engine::{Engine, StepHandler, StepRegistry, StepType};

#[tokio::test]
async fn season_pack_fans_out_into_per_episode_branches() {
    let (store, _dir) = support::test_store().await;
    support::insert_tv_request(&store, "req-5", "Some Show", 1, vec![1, 2]).await;

    // SEARCH's own children (DOWNLOAD -> ENCODE -> DELIVER) become each
    // branch's step snapshot once the season-pack branch point fires.
    let steps = serde_json::json!([{
        "type": "SEARCH",
        "name": "search",
        "children": support::linear_steps(&["DOWNLOAD", "ENCODE", "DELIVER"]).as_array().cloned().unwrap(),
    }]);
    support::insert_template(&store, "tmpl-5", steps).await;

    let torrent_hash = "hash-season-pack";

    // The pack is already sitting on disk before the run starts, exactly
    // as a prior out-of-band grab (or a recovery worker) would leave it:
    // DOWNLOAD steps in every branch find it via the shared torrent hash
    // and skip straight to ENCODE without pausing.
    let mut existing = Download::new(
        "dl-season-pack".into(),
        "req-5".into(),
        torrent_hash.into(),
        "Some.Show.S01.COMPLETE".into(),
        mf_core::models::RequestKind::Tv,
        "/data/downloads".into(),
    );
    existing.status = DownloadStatus::Completed;
    existing.content_path = Some("/data/downloads/Some.Show.S01.mkv".into());
    existing.progress = 100.0;
    existing.completed_at = Some(chrono::Utc::now());
    store.downloads.insert(&existing).await.unwrap();

    let indexer = Arc::new(support::FakeIndexer {
        torrent_hash: torrent_hash.into(),
        season_pack: true,
    });
    let download_client = Arc::new(support::FakeDownloadClient::default());
    let delivery = Arc::new(support::FakeDeliveryAlreadyPresent);
    let rate_limiter = support::rate_limiter();

    let mut registry = StepRegistry::new();
    {
        let indexer = indexer.clone();
        let rate_limiter = rate_limiter.clone();
        registry
            .register(
                StepType::Search,
                Arc::new(move || {
                    Box::new(SearchHandler {
                        indexer: indexer.clone(),
                        rate_limiter: rate_limiter.clone(),
                    }) as Box<dyn StepHandler>
                }),
            )
            .unwrap();
    }
    {
        let store = store.clone();
        let download_client = download_client.clone();
        registry
            .register(
                StepType::Download,
                Arc::new(move || {
                    Box::new(DownloadHandler {
                        store: store.clone(),
                        client: download_client.clone(),
                    }) as Box<dyn StepHandler>
                }),
            )
            .unwrap();
    }
    {
        let store = store.clone();
        registry
            .register(StepType::Encode, Arc::new(move || Box::new(EncodeHandler { store: store.clone() }) as Box<dyn StepHandler>))
            .unwrap();
    }
    {
        let delivery = delivery.clone();
        registry
            .register(StepType::Deliver, Arc::new(move || Box::new(DeliverHandler { delivery: delivery.clone() }) as Box<dyn StepHandler>))
            .unwrap();
    }

    let engine = Engine::new(store.clone(), Arc::new(registry));
    let root = engine.start_execution("req-5", "tmpl-5").await.unwrap();
    assert_eq!(root.parent_execution_id, None);

    // The root's own walk returns once it hands off to the branches; give
    // their detached tasks a moment to reach their own ENCODE pause.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let branches = store.executions.list_children(&root.id).await.unwrap();
    assert_eq!(branches.len(), 2, "one branch per requested episode");
    for branch in &branches {
        assert_eq!(branch.status, ExecutionStatus::Paused, "branch {} awaits its encode", branch.id);
        assert!(branch.episode_id.is_some());
        let steps = store.executions.list_steps(&branch.id).await.unwrap();
        let download_step = steps.iter().find(|s| s.step_type == "DOWNLOAD").unwrap();
        assert_eq!(download_step.status, StepExecutionStatus::Completed, "the shared pack is already present");
    }

    // Drive each branch's encode to completion and resume it, as the
    // dispatcher would once a worker finishes the job.
    for branch in &branches {
        let assignment = store.encoders.next_pending().await.unwrap().expect("an encode assignment for this branch");
        store
            .encoders
            .mark_completed(&assignment.id, &format!("{}.encoded", assignment.input_path), 400_000, 0.6, 90)
            .await
            .unwrap();
        engine.resume_execution(&branch.id).await.unwrap();
    }

    for branch in &branches {
        let branch = store.executions.get(&branch.id).await.unwrap().unwrap();
        assert_eq!(branch.status, ExecutionStatus::Completed, "branch {} should complete", branch.id);
        let steps = store.executions.list_steps(&branch.id).await.unwrap();
        assert!(steps.iter().all(|s| s.status.is_terminal()));
    }

    // The underlying Download row is shared: the season pack is fetched
    // exactly once regardless of how many episodes unpack from it.
    let downloads = store.downloads.list_by_status(DownloadStatus::Completed).await.unwrap();
    assert_eq!(downloads.len(), 1);
    assert_eq!(download_client.starts.load(std::sync::atomic::Ordering::SeqCst), 0, "never re-fetches an already-present pack");
}
