use axum::http::StatusCode;
use axum::response::IntoResponse;

/// Health check endpoint for container orchestration (same contract as
/// `foia-server::handlers::api::health`).
pub async fn health() -> impl IntoResponse {
    StatusCode::OK
}
