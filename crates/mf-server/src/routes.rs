//! Router assembly (spec.md §6 "HTTP/RPC surface"), grounded on
//! `foia-server::routes::create_router`'s single `Router::new().route(...)`
//! chain plus a permissive CORS layer.

use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::handlers;
use crate::AppState;

/// Build the combined router: the JSON API over [`AppState`], merged
/// with the encoder WebSocket endpoint which carries its own
/// `Arc<mf_dispatcher::scheduler::Dispatcher>` state (mf-dispatcher has
/// no dependency on this crate's `AppState`, so the two routers are
/// built and `.with_state()`-collapsed separately before merging, a
/// standard axum pattern for sub-routers with distinct state types).
pub fn create_router(state: AppState, encoder_ws_path: &str) -> Router {
    let api = Router::new()
        .route("/health", get(handlers::health))
        // requests.list/get/create/cancel/retry
        .route("/api/requests", get(handlers::list_requests).post(handlers::create_request))
        .route("/api/requests/:id", get(handlers::get_request))
        .route("/api/requests/:id/cancel", post(handlers::cancel_request))
        .route("/api/requests/:id/retry", post(handlers::retry_request))
        // pipelines.list/create/update/delete
        .route("/api/pipelines", get(handlers::list_templates).post(handlers::create_template))
        .route(
            "/api/pipelines/:id",
            put(handlers::update_template).delete(handlers::delete_template),
        )
        // executions.list/get/pause/resume/cancel
        .route("/api/executions", get(handlers::list_executions))
        .route("/api/executions/:id", get(handlers::get_execution))
        .route("/api/executions/:id/pause", post(handlers::pause_execution))
        .route("/api/executions/:id/resume", post(handlers::resume_execution))
        .route("/api/executions/:id/cancel", post(handlers::cancel_execution))
        // workers.list/status
        .route("/api/workers", get(handlers::list_workers))
        .route("/api/workers/:id", get(handlers::get_worker))
        .layer(CorsLayer::permissive())
        .with_state(state.clone());

    let ws = Router::new()
        .route(encoder_ws_path, get(mf_dispatcher::ws::upgrade))
        .with_state(state.dispatcher);

    api.merge(ws)
}
