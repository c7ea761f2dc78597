//! In-memory table of live encoder connections, keyed by `encoderId`
//! (spec.md §5 "the encoder dispatcher's worker table is single-writer
//! ... with read snapshots for observers"). Grounded on
//! `InMemoryRateLimitBackend`'s `Arc<RwLock<HashMap<..>>>` shape.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};

use crate::protocol::Frame;

/// A handle the dispatcher uses to push frames to one connected encoder.
pub type FrameSender = mpsc::UnboundedSender<Frame>;

/// Live connection registry. `Clone` is cheap; every clone shares the same
/// underlying table.
#[derive(Clone, Default)]
pub struct WorkerConnections {
    senders: Arc<RwLock<HashMap<String, FrameSender>>>,
}

impl WorkerConnections {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, encoder_id: &str, sender: FrameSender) {
        self.senders.write().await.insert(encoder_id.to_string(), sender);
    }

    pub async fn unregister(&self, encoder_id: &str) {
        self.senders.write().await.remove(encoder_id);
    }

    pub async fn is_connected(&self, encoder_id: &str) -> bool {
        self.senders.read().await.contains_key(encoder_id)
    }

    /// Best-effort push; a dead or disconnected-mid-send encoder is not an
    /// error here, the heartbeat/disconnect sweep will reconcile it.
    pub async fn send(&self, encoder_id: &str, frame: Frame) -> bool {
        let senders = self.senders.read().await;
        match senders.get(encoder_id) {
            Some(tx) => tx.send(frame).is_ok(),
            None => false,
        }
    }

    pub async fn connected_ids(&self) -> Vec<String> {
        self.senders.read().await.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_to_unknown_encoder_reports_failure() {
        let connections = WorkerConnections::new();
        assert!(!connections.send("ghost", Frame::Ping).await);
    }

    #[tokio::test]
    async fn registered_sender_receives_frames() {
        let connections = WorkerConnections::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        connections.register("w1", tx).await;
        assert!(connections.is_connected("w1").await);
        assert!(connections.send("w1", Frame::Ping).await);
        assert!(matches!(rx.recv().await, Some(Frame::Ping)));

        connections.unregister("w1").await;
        assert!(!connections.is_connected("w1").await);
    }
}
