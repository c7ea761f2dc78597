//! S2: a worker disconnects mid-encode; its assignment is revived (PENDING,
//! attempt incremented, worker's load cleared), and a second worker with
//! capacity picks it up on the next scheduling pass.

mod support;

use std::sync::Arc;

use mf_core::models::{EncoderAssignment, EncoderAssignmentStatus, WorkerCapabilities, WorkerStatus};
use mf_dispatcher::scheduler::SchedulerConfig;
use mf_dispatcher::{Dispatcher, Frame, NoopHook, WorkerConnections};
use tokio::sync::mpsc;

#[tokio::test]
async fn disconnect_reverts_job_and_frees_worker_for_reassignment() {
    let (store, _dir) = support::test_store().await;
    let connections = WorkerConnections::new();
    let dispatcher = Dispatcher::new(store.clone(), connections.clone(), SchedulerConfig::default(), Arc::new(NoopHook));

    dispatcher.on_hello("w1", 1, WorkerCapabilities::default()).await.unwrap();
    let (tx1, _rx1) = mpsc::unbounded_channel();
    connections.register("w1", tx1).await;

    let assignment = EncoderAssignment::new("job-1".into(), "job-1".into(), "/data/downloads/show.mkv".into(), 3);
    store.encoders.insert_assignment(&assignment).await.unwrap();

    assert!(dispatcher.dispatch_once().await.unwrap(), "should offer the job to w1");
    dispatcher.on_accept("job-1").await.unwrap();
    dispatcher.on_progress("job-1", 12.0).await.unwrap();

    let before = store.encoders.get_assignment("job-1").await.unwrap().unwrap();
    assert_eq!(before.status, EncoderAssignmentStatus::Encoding);
    assert_eq!(before.attempt, 1);

    // W1 vanishes.
    dispatcher.on_disconnect("w1").await.unwrap();

    let after = store.encoders.get_assignment("job-1").await.unwrap().unwrap();
    assert_eq!(after.status, EncoderAssignmentStatus::Pending);
    assert_eq!(after.attempt, 2);

    let w1 = store.encoders.get_worker("w1").await.unwrap().unwrap();
    assert_eq!(w1.status, WorkerStatus::Offline);
    assert_eq!(w1.current_jobs, 0);

    // W2 connects with capacity and should pick the job up.
    dispatcher.on_hello("w2", 1, WorkerCapabilities::default()).await.unwrap();
    let (tx2, mut rx2) = mpsc::unbounded_channel();
    connections.register("w2", tx2).await;

    assert!(dispatcher.dispatch_once().await.unwrap(), "w2 should be offered the revived job");
    let offered = store.encoders.get_assignment("job-1").await.unwrap().unwrap();
    assert_eq!(offered.status, EncoderAssignmentStatus::Assigned);
    assert_eq!(offered.encoder_id.as_deref(), Some("w2"));
    assert!(matches!(rx2.try_recv().unwrap(), Frame::Offer { job_id, .. } if job_id == "job-1"));
}
