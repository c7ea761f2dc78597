//! `workers.list/status` (spec.md §6).

use axum::extract::{Path, State};
use mf_core::models::EncoderWorker;

use crate::api_types::{ApiError, ApiResult};
use crate::AppState;

pub async fn list_workers(State(state): State<AppState>) -> ApiResult<Vec<EncoderWorker>> {
    let workers = state.store.encoders.list_workers().await.map_err(ApiError::from)?;
    Ok(crate::api_types::ApiResponse::ok(workers))
}

pub async fn get_worker(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<EncoderWorker> {
    let worker = state
        .store
        .encoders
        .get_worker(&id)
        .await
        .map_err(ApiError::from)?
        .ok_or_else(|| ApiError::not_found(format!("worker not found: {id}")))?;
    Ok(crate::api_types::ApiResponse::ok(worker))
}
