//! S1: SEARCH -> DOWNLOAD -> ENCODE -> DELIVER for a movie request, driven
//! through its two external pause points to a COMPLETED execution.

mod support;

use std::sync::Arc;

use mf_core::models::{DownloadStatus, ExecutionStatus, StepExecutionStatus};
use mf_engine::handlers::{DeliverHandler, DownloadHandler, EncodeHandler, SearchHandler};
use mf_engine::{Engine, StepHandler, StepRegistry, StepType};

#[tokio::test]
async fn movie_request_completes_after_two_resumes() {
    let (store, _dir) = support::test_store().await;
    support::insert_movie_request(&store, "req-1", "Arrival").await;
    support::insert_template(&store, "tmpl-1", support::linear_steps(&["SEARCH", "DOWNLOAD", "ENCODE", "DELIVER"])).await;

    let indexer = Arc::new(support::FakeIndexer {
        torrent_hash: "hash-arrival".into(),
        season_pack: false,
    });
    let download_client = Arc::new(support::FakeDownloadClient::default());
    let delivery = Arc::new(support::FakeDelivery::default());
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

    let execution = engine.start_execution("req-1", "tmpl-1").await.unwrap();
    assert_eq!(execution.status, ExecutionStatus::Paused, "should pause awaiting the download");

    let steps = store.executions.list_steps(&execution.id).await.unwrap();
    let search_step = steps.iter().find(|s| s.step_type == "SEARCH").unwrap();
    assert_eq!(search_step.status, StepExecutionStatus::Completed);

    // Drive the Download row to completion out-of-band, as a recovery
    // worker or the download client's own poller would.
    let downloads = store.downloads.list_by_status(DownloadStatus::Queued).await.unwrap();
    assert_eq!(downloads.len(), 1);
    let mut download = downloads.into_iter().next().unwrap();
    download.status = DownloadStatus::Completed;
    download.content_path = Some("/data/downloads/fake.mkv".into());
    download.progress = 100.0;
    download.completed_at = Some(chrono::Utc::now());
    store.downloads.save(&download).await.unwrap();

    engine.resume_execution(&execution.id).await.unwrap();
    let execution = store.executions.get(&execution.id).await.unwrap().unwrap();
    assert_eq!(execution.status, ExecutionStatus::Paused, "should now pause awaiting the encode");

    let assignment = store.encoders.next_pending().await.unwrap().expect("an encode assignment was created");
    store
        .encoders
        .mark_completed(&assignment.id, "/data/downloads/fake.mkv.encoded", 500_000, 0.5, 120)
        .await
        .unwrap();

    engine.resume_execution(&execution.id).await.unwrap();
    let execution = store.executions.get(&execution.id).await.unwrap().unwrap();
    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert_eq!(delivery.delivered.load(std::sync::atomic::Ordering::SeqCst), 1);

    let steps = store.executions.list_steps(&execution.id).await.unwrap();
    assert!(steps.iter().all(|s| s.status == StepExecutionStatus::Completed));
}
