//! `executions.list/get/pause/resume/cancel` (spec.md §6).

use axum::extract::{Path, Query, State};
use mf_core::models::PipelineExecution;

use crate::api_types::{ApiError, ApiResult, ExecutionListQuery};
use crate::AppState;

pub async fn list_executions(State(state): State<AppState>, Query(query): Query<ExecutionListQuery>) -> ApiResult<Vec<PipelineExecution>> {
    let executions = match query.request_id {
        Some(request_id) => state.store.executions.list_by_request(&request_id).await.map_err(ApiError::from)?,
        None => return Err(ApiError::bad_request("executions.list requires a request_id query parameter")),
    };
    Ok(crate::api_types::ApiResponse::ok(executions))
}

pub async fn get_execution(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<PipelineExecution> {
    let execution = state
        .store
        .executions
        .get(&id)
        .await
        .map_err(ApiError::from)?
        .ok_or_else(|| ApiError::not_found(format!("execution not found: {id}")))?;
    Ok(crate::api_types::ApiResponse::ok(execution))
}

/// `executions.pause`: there's no direct engine entry point for an
/// operator-initiated pause (spec.md §4.2 only names handler-initiated
/// `shouldPause`), so this sets the execution's status with the same
/// compare-and-set the engine itself uses for every other transition.
pub async fn pause_execution(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<PipelineExecution> {
    let moved = state
        .store
        .executions
        .cas_status(&id, mf_core::models::ExecutionStatus::Running, mf_core::models::ExecutionStatus::Paused)
        .await
        .map_err(ApiError::from)?;
    if !moved {
        return Err(ApiError::conflict(format!("execution {id} is not RUNNING")));
    }
    let execution = state.store.executions.get(&id).await.map_err(ApiError::from)?.unwrap();
    Ok(crate::api_types::ApiResponse::ok(execution))
}

pub async fn resume_execution(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<PipelineExecution> {
    state.engine.resume_execution(&id).await.map_err(ApiError::from)?;
    let execution = state
        .store
        .executions
        .get(&id)
        .await
        .map_err(ApiError::from)?
        .ok_or_else(|| ApiError::not_found(format!("execution not found: {id}")))?;
    Ok(crate::api_types::ApiResponse::ok(execution))
}

pub async fn cancel_execution(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<PipelineExecution> {
    state.engine.cancel_execution(&id).await.map_err(ApiError::from)?;
    let execution = state
        .store
        .executions
        .get(&id)
        .await
        .map_err(ApiError::from)?
        .ok_or_else(|| ApiError::not_found(format!("execution not found: {id}")))?;
    Ok(crate::api_types::ApiResponse::ok(execution))
}
