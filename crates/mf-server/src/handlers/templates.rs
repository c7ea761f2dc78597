//! `pipelines.list/create/update/delete` (spec.md §6). Named "templates"
//! internally to match `mf_core::repository::Template`; the HTTP surface
//! contract still uses the spec's `pipelines.*` verbs.

use axum::extract::{Path, State};
use mf_core::repository::Template;

use crate::api_types::{ApiError, ApiResult, CreateTemplateBody};
use crate::AppState;

pub async fn list_templates(State(state): State<AppState>) -> ApiResult<Vec<Template>> {
    let templates = state.store.templates.list().await.map_err(ApiError::from)?;
    Ok(crate::api_types::ApiResponse::ok(templates))
}

pub async fn create_template(State(state): State<AppState>, axum::Json(body): axum::Json<CreateTemplateBody>) -> ApiResult<Template> {
    validate_step_tree(&body.steps)?;
    let now = chrono::Utc::now();
    let template = Template {
        id: body.id,
        name: body.name,
        media_kind: body.media_kind.as_str().to_string(),
        steps: body.steps,
        created_at: now,
        updated_at: now,
    };
    state.store.templates.insert(&template).await.map_err(ApiError::from)?;
    Ok(crate::api_types::ApiResponse::ok(template))
}

/// Templates are immutable once an execution snapshots them (spec.md §3),
/// so this only ever affects `start_execution` calls made after it runs.
pub async fn update_template(
    State(state): State<AppState>,
    Path(id): Path<String>,
    axum::Json(body): axum::Json<CreateTemplateBody>,
) -> ApiResult<Template> {
    validate_step_tree(&body.steps)?;
    let existing = state
        .store
        .templates
        .get(&id)
        .await
        .map_err(ApiError::from)?
        .ok_or_else(|| ApiError::not_found(format!("template not found: {id}")))?;
    let template = Template {
        id,
        name: body.name,
        media_kind: body.media_kind.as_str().to_string(),
        steps: body.steps,
        created_at: existing.created_at,
        updated_at: chrono::Utc::now(),
    };
    state.store.templates.upsert(&template).await.map_err(ApiError::from)?;
    Ok(crate::api_types::ApiResponse::ok(template))
}

pub async fn delete_template(State(state): State<AppState>, Path(id): Path<String>) -> Result<axum::http::StatusCode, ApiError> {
    let deleted = state.store.templates.delete(&id).await.map_err(ApiError::from)?;
    if deleted {
        Ok(axum::http::StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found(format!("template not found: {id}")))
    }
}

fn validate_step_tree(steps: &serde_json::Value) -> Result<(), ApiError> {
    serde_json::from_value::<Vec<mf_engine::Step>>(steps.clone())
        .map(|_| ())
        .map_err(|e| ApiError::bad_request(format!("invalid step tree: {e}")))
}
