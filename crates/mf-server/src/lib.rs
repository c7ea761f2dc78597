//! The HTTP/RPC surface and composition root (spec.md §6 "HTTP/RPC
//! surface", §9 "global singletons ... injected into the composition
//! root"). Wires the state store, engine, dispatcher, adapters, and
//! recovery scheduler together behind one [`AppState`] and hands out an
//! `axum::Router`, following `foia-server`'s `AppState`/`create_router`
//! shape.

pub mod api_types;
pub mod dispatcher_tasks;
pub mod handlers;
pub mod hooks;
pub mod routes;
pub mod sync;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use mf_core::config::Settings;
use mf_core::rate_limit::{InMemoryRateLimitBackend, RateLimiter};
use mf_core::repository::StateStore;
use mf_dispatcher::scheduler::{Dispatcher, SchedulerConfig};
use mf_dispatcher::worker::WorkerConnections;
use mf_engine::Engine;
use mf_recovery::{RecoveryConfig, RecoveryWorkers};

use hooks::EngineResumeHook;

/// Shared application state handed to every axum handler (mirrors
/// `foia-server::AppState`, generalized from one document repository
/// trio to the engine/dispatcher/recovery services this domain needs).
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<StateStore>,
    pub engine: Arc<Engine>,
    pub dispatcher: Arc<Dispatcher>,
    pub recovery: Arc<RecoveryWorkers>,
}

/// Everything [`build`] assembled, including the pieces that aren't part
/// of [`AppState`] but still need a handle at the call site (the
/// standalone WebSocket router, since it carries its own `Dispatcher`
/// state type rather than the combined `AppState`).
pub struct Composition {
    pub state: AppState,
    pub settings: Settings,
}

/// Build every collaborator from resolved [`Settings`] and wire them
/// together, the way the teacher's top-level `main.rs` builds its
/// singletons once and injects them into `cli::run`/`server::serve`.
pub async fn build(settings: Settings) -> anyhow::Result<Composition> {
    tokio::fs::create_dir_all(&settings.data_dir).await.ok();

    let store = Arc::new(StateStore::connect(&settings.database_url).await?);

    let rate_limiter = RateLimiter::new(Arc::new(InMemoryRateLimitBackend::new()));

    let indexer = Arc::new(mf_adapters::HttpIndexerAdapter::new(mf_adapters::IndexerConfig {
        name: "default".to_string(),
        search_url: settings
            .indexer_url
            .clone()
            .unwrap_or_else(|| "http://127.0.0.1:9117/api/v2.0/indexers/all/results".to_string()),
        api_key: std::env::var("MEDIAFORGE_INDEXER_API_KEY").ok(),
    })?);

    let download_client = Arc::new(mf_adapters::HttpDownloadClientAdapter::new(mf_adapters::DownloadClientConfig {
        base_url: settings
            .download_client_url
            .clone()
            .unwrap_or_else(|| "http://127.0.0.1:8080".to_string()),
        api_key: std::env::var("MEDIAFORGE_DOWNLOAD_CLIENT_API_KEY").ok(),
    })?);

    let mut roots: HashMap<String, PathBuf> = HashMap::new();
    for (name, path) in &settings.delivery_targets {
        roots.insert(name.clone(), PathBuf::from(path));
    }
    let delivery = Arc::new(mf_adapters::LocalFilesystemDeliveryAdapter::new(mf_adapters::DeliveryTargets::new(roots)));

    let notifier = Arc::new(mf_adapters::WebhookNotificationDispatcher::new()?);

    let registry = Arc::new(mf_engine::default_registry(
        store.clone(),
        indexer,
        download_client,
        delivery.clone(),
        notifier,
        rate_limiter,
    )?);

    let engine = Arc::new(Engine::new(store.clone(), registry));

    let hook = Arc::new(EngineResumeHook::new(engine.clone(), store.clone()));
    let connections = WorkerConnections::new();
    let scheduler_config = SchedulerConfig {
        assigned_timeout: std::time::Duration::from_secs(settings.assigned_timeout_secs),
        stall_timeout: std::time::Duration::from_secs(settings.stall_timeout_secs),
        ..SchedulerConfig::default()
    };
    let dispatcher = Arc::new(Dispatcher::new(store.clone(), connections, scheduler_config, hook));

    let recovery_config = RecoveryConfig::default();
    let recovery = Arc::new(RecoveryWorkers::new(store.clone(), delivery, recovery_config));

    Ok(Composition {
        state: AppState { store, engine, dispatcher, recovery },
        settings,
    })
}

/// Binds and serves a built router, mirroring `foia-server`'s
/// `serve(settings, host, port)`.
pub async fn serve(app: axum::Router, host: &str, port: u16) -> anyhow::Result<()> {
    let addr: std::net::SocketAddr = format!("{host}:{port}").parse()?;
    tracing::info!(%addr, "starting mediaforge-server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tempfile::tempdir;
    use tower::ServiceExt;

    use mf_core::rate_limit::{InMemoryRateLimitBackend, RateLimiter};
    use mf_core::repository::StateStore;
    use mf_dispatcher::scheduler::{Dispatcher, SchedulerConfig};
    use mf_dispatcher::worker::WorkerConnections;
    use mf_engine::Engine;
    use mf_recovery::{RecoveryConfig, RecoveryWorkers};

    use super::hooks::EngineResumeHook;
    use super::routes::create_router;
    use super::AppState;

    /// Builds the same collaborators [`build`] wires together, against a
    /// freshly migrated temp-file SQLite database rather than a resolved
    /// [`Settings`], mirroring `foia-server::server::tests::setup_test_app`.
    async fn setup_test_app() -> (axum::Router, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let store = Arc::new(StateStore::connect(db_path.to_str().unwrap()).await.unwrap());

        let rate_limiter = RateLimiter::new(Arc::new(InMemoryRateLimitBackend::new()));
        let indexer = Arc::new(
            mf_adapters::HttpIndexerAdapter::new(mf_adapters::IndexerConfig {
                name: "test".to_string(),
                search_url: "http://127.0.0.1:1/indexer".to_string(),
                api_key: None,
            })
            .unwrap(),
        );
        let download_client = Arc::new(
            mf_adapters::HttpDownloadClientAdapter::new(mf_adapters::DownloadClientConfig {
                base_url: "http://127.0.0.1:1/download".to_string(),
                api_key: None,
            })
            .unwrap(),
        );
        let delivery = Arc::new(mf_adapters::LocalFilesystemDeliveryAdapter::new(
            mf_adapters::DeliveryTargets::new(HashMap::new()),
        ));
        let notifier = Arc::new(mf_adapters::WebhookNotificationDispatcher::new().unwrap());

        let registry = Arc::new(
            mf_engine::default_registry(store.clone(), indexer, download_client, delivery.clone(), notifier, rate_limiter)
                .unwrap(),
        );
        let engine = Arc::new(Engine::new(store.clone(), registry));
        let hook = Arc::new(EngineResumeHook::new(engine.clone(), store.clone()));
        let dispatcher = Arc::new(Dispatcher::new(store.clone(), WorkerConnections::new(), SchedulerConfig::default(), hook));
        let recovery = Arc::new(RecoveryWorkers::new(store.clone(), delivery, RecoveryConfig::default()));

        let state = AppState { store, engine, dispatcher, recovery };
        let app = create_router(state, "/ws/encoder");
        (app, dir)
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_returns_ok() {
        let (app, _dir) = setup_test_app().await;
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn list_requests_starts_empty() {
        let (app, _dir) = setup_test_app().await;
        let response = app
            .oneshot(Request::builder().uri("/api/requests").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert!(json["success"].as_bool().unwrap());
        assert_eq!(json["data"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn get_request_unknown_id_is_404() {
        let (app, _dir) = setup_test_app().await;
        let response = app
            .oneshot(Request::builder().uri("/api/requests/does-not-exist").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn create_template_then_list_roundtrips() {
        let (app, _dir) = setup_test_app().await;

        let body = serde_json::json!({
            "id": "tmpl-1",
            "name": "Movie pipeline",
            "media_kind": "movie",
            "steps": [{ "type": "NOTIFICATION", "name": "notify-done" }],
        });
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/pipelines")
                    .header("content-type", "application/json")
                    .body(Body::from(serde_json::to_vec(&body).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(Request::builder().uri("/api/pipelines").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        let templates = json["data"].as_array().unwrap();
        assert_eq!(templates.len(), 1);
        assert_eq!(templates[0]["id"], "tmpl-1");
    }

    #[tokio::test]
    async fn create_template_rejects_malformed_step_tree() {
        let (app, _dir) = setup_test_app().await;

        let body = serde_json::json!({
            "id": "tmpl-bad",
            "name": "Broken pipeline",
            "media_kind": "movie",
            "steps": [{ "type": "NOT_A_STEP_TYPE", "name": "oops" }],
        });
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/pipelines")
                    .header("content-type", "application/json")
                    .body(Body::from(serde_json::to_vec(&body).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn list_workers_starts_empty() {
        let (app, _dir) = setup_test_app().await;
        let response = app
            .oneshot(Request::builder().uri("/api/workers").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["data"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn cancel_request_unknown_id_is_404() {
        let (app, _dir) = setup_test_app().await;
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/requests/does-not-exist/cancel")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
