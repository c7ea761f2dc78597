//! S3: a worker rejects an OFFER with a capacity reason. The job returns
//! to PENDING with its attempt count unchanged and `sentAt` cleared; the
//! worker is blocked for a short cool-off.

mod support;

use std::sync::Arc;
use std::time::Duration;

use mf_core::models::{EncoderAssignment, EncoderAssignmentStatus, WorkerCapabilities};
use mf_dispatcher::scheduler::SchedulerConfig;
use mf_dispatcher::{Dispatcher, NoopHook, WorkerConnections};
use tokio::sync::mpsc;

#[tokio::test]
async fn capacity_rejection_blocks_worker_without_consuming_an_attempt() {
    let (store, _dir) = support::test_store().await;
    let connections = WorkerConnections::new();
    let config = SchedulerConfig {
        capacity_block: Duration::from_millis(50),
        ..SchedulerConfig::default()
    };
    let dispatcher = Dispatcher::new(store.clone(), connections.clone(), config, Arc::new(NoopHook));

    dispatcher.on_hello("w1", 1, WorkerCapabilities::default()).await.unwrap();
    let (tx, _rx) = mpsc::unbounded_channel();
    connections.register("w1", tx).await;

    let assignment = EncoderAssignment::new("job-1".into(), "job-1".into(), "/data/downloads/movie.mkv".into(), 3);
    store.encoders.insert_assignment(&assignment).await.unwrap();
    assert!(dispatcher.dispatch_once().await.unwrap());

    let assigned_attempt = store.encoders.get_assignment("job-1").await.unwrap().unwrap().attempt;

    dispatcher.on_reject("w1", "job-1", "encoder at capacity").await.unwrap();

    let job = store.encoders.get_assignment("job-1").await.unwrap().unwrap();
    assert_eq!(job.status, EncoderAssignmentStatus::Pending);
    assert_eq!(job.attempt, assigned_attempt, "a capacity rejection does not consume an attempt");
    assert!(job.sent_at.is_none());

    let worker = store.encoders.get_worker("w1").await.unwrap().unwrap();
    assert!(worker.blocked_until.is_some());
    assert!(!worker.is_available(chrono::Utc::now()));
    assert_eq!(worker.current_jobs, 0);

    tokio::time::sleep(Duration::from_millis(60)).await;
    let worker = store.encoders.get_worker("w1").await.unwrap().unwrap();
    assert!(worker.is_available(chrono::Utc::now()), "cool-off should have expired");
}

#[tokio::test]
async fn non_capacity_rejection_consumes_an_attempt() {
    let (store, _dir) = support::test_store().await;
    let connections = WorkerConnections::new();
    let dispatcher = Dispatcher::new(store.clone(), connections.clone(), SchedulerConfig::default(), Arc::new(NoopHook));

    dispatcher.on_hello("w1", 1, WorkerCapabilities::default()).await.unwrap();
    let (tx, _rx) = mpsc::unbounded_channel();
    connections.register("w1", tx).await;

    let assignment = EncoderAssignment::new("job-2".into(), "job-2".into(), "/data/downloads/movie.mkv".into(), 3);
    store.encoders.insert_assignment(&assignment).await.unwrap();
    assert!(dispatcher.dispatch_once().await.unwrap());

    dispatcher.on_reject("w1", "job-2", "unsupported codec").await.unwrap();

    let job = store.encoders.get_assignment("job-2").await.unwrap().unwrap();
    assert_eq!(job.status, EncoderAssignmentStatus::Pending);
    assert_eq!(job.attempt, 2);
}
