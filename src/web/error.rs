use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::ingest::IngestError;
use crate::query::QueryError;
use crate::session::SessionError;

/// Error response with a `{"success": false, "error": ...}` body.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!("{}", self.message);
        } else {
            tracing::debug!("Request rejected ({}): {}", self.status, self.message);
        }
        (self.status, Json(json!({"success": false, "error": self.message}))).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::new(rejection.status(), rejection.body_text())
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NotFound(_) => ApiError::not_found("Session not found"),
            SessionError::Ingest(IngestError::Io(e)) => ApiError::internal(format!("Failed to store upload: {e}")),
            SessionError::Ingest(e) => ApiError::bad_request(e.to_string()),
            SessionError::Io(e) => ApiError::internal(format!("Failed to store upload: {e}")),
            SessionError::Task(e) => ApiError::internal(e),
        }
    }
}

impl From<QueryError> for ApiError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::Session(e) => e.into(),
            QueryError::Validation(_) | QueryError::Execution(_) => ApiError::bad_request(err.to_string()),
            QueryError::Schema(_) | QueryError::Task(_) => ApiError::internal(err.to_string()),
        }
    }
}
