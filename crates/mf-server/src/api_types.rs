//! The JSON envelope every handler in [`crate::handlers`] wraps its
//! response in, plus the small request bodies the HTTP surface accepts.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self { success: true, data: Some(data), error: None }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let status = if self.success { StatusCode::OK } else { StatusCode::INTERNAL_SERVER_ERROR };
        (status, Json(self)).into_response()
    }
}

/// An error envelope carrying an explicit status code, for handlers that
/// need something other than 200/500 (404 for an unknown id, 409 for a
/// rejected state transition).
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self { status: StatusCode::NOT_FOUND, message: message.into() }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self { status: StatusCode::CONFLICT, message: message.into() }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self { status: StatusCode::BAD_REQUEST, message: message.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self { status: StatusCode::INTERNAL_SERVER_ERROR, message: message.into() }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body: ApiResponse<()> = ApiResponse { success: false, data: None, error: Some(self.message) };
        (self.status, Json(body)).into_response()
    }
}

impl From<mf_core::CoreError> for ApiError {
    fn from(err: mf_core::CoreError) -> Self {
        match err {
            mf_core::CoreError::NotFound(msg) => ApiError::not_found(msg),
            mf_core::CoreError::InvalidTransition(msg) => ApiError::conflict(msg),
            other => ApiError::internal(other.to_string()),
        }
    }
}

impl From<mf_engine::EngineError> for ApiError {
    fn from(err: mf_engine::EngineError) -> Self {
        match err {
            mf_engine::EngineError::ExecutionNotFound(id) => ApiError::not_found(format!("execution not found: {id}")),
            mf_engine::EngineError::TemplateNotFound(id) => ApiError::not_found(format!("template not found: {id}")),
            mf_engine::EngineError::RequestNotFound(id) => ApiError::not_found(format!("request not found: {id}")),
            other => ApiError::internal(other.to_string()),
        }
    }
}

impl From<mf_dispatcher::DispatcherError> for ApiError {
    fn from(err: mf_dispatcher::DispatcherError) -> Self {
        match err {
            mf_dispatcher::DispatcherError::UnknownEncoder(id) => ApiError::not_found(format!("unknown encoder: {id}")),
            mf_dispatcher::DispatcherError::AssignmentNotFound(id) => ApiError::not_found(format!("assignment not found: {id}")),
            other => ApiError::internal(other.to_string()),
        }
    }
}

pub type ApiResult<T> = Result<ApiResponse<T>, ApiError>;

#[derive(Debug, Deserialize)]
pub struct SubmitRequestBody {
    pub kind: mf_core::models::RequestKind,
    pub tmdb_id: i32,
    pub title: String,
    pub year: Option<i32>,
    #[serde(default)]
    pub requested_seasons: Option<Vec<i32>>,
    #[serde(default)]
    pub requested_episodes: Option<Vec<i32>>,
    pub targets: Vec<String>,
    pub template_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateTemplateBody {
    pub id: String,
    pub name: String,
    pub media_kind: mf_core::models::RequestKind,
    pub steps: serde_json::Value,
}

#[derive(Debug, Deserialize, Default)]
pub struct ListQuery {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ExecutionListQuery {
    pub request_id: Option<String>,
}
