//! Fixtures shared across the engine's scenario tests: fake external
//! adapters and a helper to stand up a migrated, request-seeded store.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use mf_core::models::{RequestKind, RequestRow};
use mf_core::rate_limit::{InMemoryRateLimitBackend, RateLimiter};
use mf_core::repository::{StateStore, Template};
use mf_engine::ports::{
    AdapterError, DeliveryAdapter, DownloadClientAdapter, DownloadStatusInfo, IndexerAdapter,
    NotificationDispatcher, ReleaseCandidate, ReleaseQuery,
};

pub async fn test_store() -> (Arc<StateStore>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("engine-test.db");
    let url = db_path.to_str().unwrap().to_string();
    let store = StateStore::connect(&url).await.unwrap();
    (Arc::new(store), dir)
}

pub fn rate_limiter() -> RateLimiter {
    RateLimiter::new(Arc::new(InMemoryRateLimitBackend::new()))
}

pub async fn insert_movie_request(store: &StateStore, id: &str, title: &str) -> RequestRow {
    let row = RequestRow::new(id.into(), RequestKind::Movie, 1, title.into(), Some(2016), vec!["plex".into()]);
    store.requests.insert(&row).await.unwrap();
    row
}

pub async fn insert_tv_request(store: &StateStore, id: &str, title: &str, season: i32, episodes: Vec<i32>) -> RequestRow {
    let mut row = RequestRow::new(id.into(), RequestKind::Tv, 2, title.into(), Some(2019), vec!["plex".into()]);
    row.requested_seasons = Some(vec![season]);
    row.requested_episodes = Some(episodes);
    store.requests.insert(&row).await.unwrap();
    row
}

pub async fn insert_template(store: &StateStore, id: &str, steps: serde_json::Value) -> Template {
    let now = chrono::Utc::now();
    let template = Template {
        id: id.into(),
        name: id.into(),
        media_kind: "movie".into(),
        steps,
        created_at: now,
        updated_at: now,
    };
    store.templates.insert(&template).await.unwrap();
    template
}

/// A chain of steps, each the sole child of the previous one.
pub fn linear_steps(kinds: &[&str]) -> serde_json::Value {
    fn build(kinds: &[&str]) -> serde_json::Value {
        match kinds.split_first() {
            None => serde_json::json!([]),
            Some((head, rest)) => serde_json::json!([{
                "type": head,
                "name": head.to_lowercase(),
                "children": build(rest).as_array().cloned().unwrap_or_default(),
            }]),
        }
    }
    build(kinds)
}

pub struct FakeIndexer {
    pub torrent_hash: String,
    pub season_pack: bool,
}

#[async_trait]
impl IndexerAdapter for FakeIndexer {
    async fn search(&self, _query: &ReleaseQuery) -> Result<Vec<ReleaseCandidate>, AdapterError> {
        Ok(vec![ReleaseCandidate {
            indexer: "fake-indexer".into(),
            release_name: "Fake.Release.2016".into(),
            torrent_hash: self.torrent_hash.clone(),
            download_uri: self.torrent_hash.clone(),
            season_pack: self.season_pack,
            size: Some(1_000_000),
        }])
    }
}

#[derive(Default)]
pub struct FakeDownloadClient {
    pub starts: AtomicUsize,
}

#[async_trait]
impl DownloadClientAdapter for FakeDownloadClient {
    async fn start(&self, candidate: &ReleaseCandidate, _save_path: &str) -> Result<String, AdapterError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(candidate.torrent_hash.clone())
    }

    async fn status(&self, _torrent_hash: &str) -> Result<DownloadStatusInfo, AdapterError> {
        Ok(DownloadStatusInfo {
            progress: 100.0,
            completed: true,
            content_path: Some("/data/downloads/fake.mkv".into()),
            size: Some(1_000_000),
        })
    }
}

#[derive(Default)]
pub struct FakeDelivery {
    pub delivered: AtomicUsize,
}

#[async_trait]
impl DeliveryAdapter for FakeDelivery {
    async fn deliver(&self, target: &str, source_path: &str) -> Result<String, AdapterError> {
        self.delivered.fetch_add(1, Ordering::SeqCst);
        Ok(format!("{target}{source_path}"))
    }

    async fn exists(&self, _target: &str, _expected_path: &str) -> Result<bool, AdapterError> {
        Ok(false)
    }
}

pub struct FakeDeliveryAlreadyPresent;

#[async_trait]
impl DeliveryAdapter for FakeDeliveryAlreadyPresent {
    async fn deliver(&self, _target: &str, source_path: &str) -> Result<String, AdapterError> {
        Ok(source_path.to_string())
    }

    async fn exists(&self, _target: &str, _expected_path: &str) -> Result<bool, AdapterError> {
        Ok(true)
    }
}

#[derive(Default)]
pub struct FakeNotifier;

#[async_trait]
impl NotificationDispatcher for FakeNotifier {
    async fn notify(&self, _sink: &str, _message: &str) -> Result<(), AdapterError> {
        Ok(())
    }
}

pub struct FailingDelivery;

#[async_trait]
impl DeliveryAdapter for FailingDelivery {
    async fn deliver(&self, _target: &str, _source_path: &str) -> Result<String, AdapterError> {
        Err(AdapterError::ServiceUnavailable("storage offline".into()))
    }

    async fn exists(&self, _target: &str, _expected_path: &str) -> Result<bool, AdapterError> {
        Ok(false)
    }
}
