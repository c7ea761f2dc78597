//! `requests.list/get/create/cancel/retry` (spec.md §6 HTTP/RPC surface).

use axum::extract::{Path, Query, State};
use mf_core::models::{ProcessingItem, RequestKind, RequestRow, RequestStatus};

use crate::api_types::{ApiError, ApiResult, ListQuery, SubmitRequestBody};
use crate::AppState;

/// `requests.create`: inserts the `Request` row, materializes its
/// `ProcessingItem`s (spec.md §3 "ProcessingItems created at enqueue"),
/// and starts the root `PipelineExecution`. TV requests are assumed to
/// name a single season (the common "acquire season N" shape); episodes
/// outside that season are rejected rather than silently cross-producted
/// against every requested season.
pub async fn create_request(State(state): State<AppState>, axum::Json(body): axum::Json<SubmitRequestBody>) -> ApiResult<RequestRow> {
    let request_id = uuid::Uuid::new_v4().to_string();
    let mut request = RequestRow::new(
        request_id.clone(),
        body.kind,
        body.tmdb_id as i64,
        body.title.clone(),
        body.year,
        body.targets,
    );
    request.requested_seasons = body.requested_seasons.clone();
    request.requested_episodes = body.requested_episodes.clone();
    state.store.requests.insert(&request).await.map_err(ApiError::from)?;

    match body.kind {
        RequestKind::Movie => {
            let item = ProcessingItem::new_movie(
                uuid::Uuid::new_v4().to_string(),
                request_id.clone(),
                body.tmdb_id as i64,
                body.title.clone(),
            );
            state.store.processing_items.insert(&item).await.map_err(ApiError::from)?;
        }
        RequestKind::Tv => {
            let season = body
                .requested_seasons
                .as_ref()
                .and_then(|seasons| seasons.first().copied())
                .ok_or_else(|| ApiError::bad_request("tv requests require requested_seasons"))?;
            let episodes = body
                .requested_episodes
                .clone()
                .ok_or_else(|| ApiError::bad_request("tv requests require requested_episodes"))?;
            for episode in episodes {
                let item = ProcessingItem::new_episode(
                    uuid::Uuid::new_v4().to_string(),
                    request_id.clone(),
                    body.tmdb_id as i64,
                    body.title.clone(),
                    season,
                    episode,
                );
                state.store.processing_items.insert(&item).await.map_err(ApiError::from)?;
            }
        }
    }

    state
        .engine
        .start_execution(&request_id, &body.template_id)
        .await
        .map_err(ApiError::from)?;
    crate::sync::sync_request(&state.store, &request_id).await.map_err(ApiError::from)?;

    let request = state
        .store
        .requests
        .get(&request_id)
        .await
        .map_err(ApiError::from)?
        .ok_or_else(|| ApiError::internal("request vanished immediately after insert"))?;
    Ok(crate::api_types::ApiResponse::ok(request))
}

pub async fn list_requests(State(state): State<AppState>, Query(query): Query<ListQuery>) -> ApiResult<Vec<RequestRow>> {
    let mut requests = state.store.requests.list().await.map_err(ApiError::from)?;
    if let Some(status) = query.status.as_deref().and_then(RequestStatus::from_str) {
        requests.retain(|r| r.status == status);
    }
    Ok(crate::api_types::ApiResponse::ok(requests))
}

pub async fn get_request(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<RequestRow> {
    let request = state
        .store
        .requests
        .get(&id)
        .await
        .map_err(ApiError::from)?
        .ok_or_else(|| ApiError::not_found(format!("request not found: {id}")))?;
    Ok(crate::api_types::ApiResponse::ok(request))
}

/// `requests.cancel`: cancels every non-terminal execution tied to the
/// request (root and branches), then re-derives the request's status
/// from its items.
pub async fn cancel_request(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<RequestRow> {
    state
        .store
        .requests
        .get(&id)
        .await
        .map_err(ApiError::from)?
        .ok_or_else(|| ApiError::not_found(format!("request not found: {id}")))?;

    for execution in state.store.executions.list_by_request(&id).await.map_err(ApiError::from)? {
        state.engine.cancel_execution(&execution.id).await.map_err(ApiError::from)?;
        for child in state.store.executions.list_children(&execution.id).await.map_err(ApiError::from)? {
            state.engine.cancel_execution(&child.id).await.map_err(ApiError::from)?;
        }
    }

    for mut item in state.store.processing_items.list_by_request(&id).await.map_err(ApiError::from)? {
        if !matches!(item.status, mf_core::models::ProcessingItemStatus::Completed) {
            item.status = mf_core::models::ProcessingItemStatus::Cancelled;
            item.updated_at = chrono::Utc::now();
            state.store.processing_items.save(&item).await.map_err(ApiError::from)?;
        }
    }

    refresh_derived_status(&state, &id).await?;
    let request = state.store.requests.get(&id).await.map_err(ApiError::from)?.unwrap();
    Ok(crate::api_types::ApiResponse::ok(request))
}

/// `requests.retry`: resets every FAILED item back to PENDING (spec.md
/// §4.3 "FAILED -> PENDING (manual retry)") and resumes the executions
/// that were waiting on them where possible.
pub async fn retry_request(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<RequestRow> {
    state
        .store
        .requests
        .get(&id)
        .await
        .map_err(ApiError::from)?
        .ok_or_else(|| ApiError::not_found(format!("request not found: {id}")))?;

    for mut item in state.store.processing_items.list_by_request(&id).await.map_err(ApiError::from)? {
        if item.status == mf_core::models::ProcessingItemStatus::Failed {
            item.status = mf_core::models::ProcessingItemStatus::Pending;
            item.last_error = None;
            item.updated_at = chrono::Utc::now();
            state.store.processing_items.save(&item).await.map_err(ApiError::from)?;
        }
    }

    for execution in state.store.executions.list_by_request(&id).await.map_err(ApiError::from)? {
        if execution.status == mf_core::models::ExecutionStatus::Failed {
            state.engine.walk(&execution.id).await.map_err(ApiError::from)?;
        }
    }

    refresh_derived_status(&state, &id).await?;
    let request = state.store.requests.get(&id).await.map_err(ApiError::from)?.unwrap();
    Ok(crate::api_types::ApiResponse::ok(request))
}

async fn refresh_derived_status(state: &AppState, request_id: &str) -> Result<(), ApiError> {
    let items = state.store.processing_items.list_by_request(request_id).await.map_err(ApiError::from)?;
    let statuses: Vec<_> = items.iter().map(|i| i.status).collect();
    let (status, progress) = mf_core::models::derive_request_status(&statuses);
    state.store.requests.update_derived_status(request_id, status, progress).await.map_err(ApiError::from)?;
    Ok(())
}
