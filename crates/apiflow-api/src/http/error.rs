//! Application error type mapping to HTTP status codes and envelope format.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use apiflow_core::flow::FlowError;
use apiflow_core::overlay::OverlayError;
use apiflow_core::request::friendly_message;
use apiflow_core::service::ServiceError;
use apiflow_core::snapshot::SnapshotError;
use apiflow_types::error::{CodedError, RepositoryError};

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    Repository(RepositoryError),
    Service(ServiceError),
    Overlay(OverlayError),
    Snapshot(SnapshotError),
    /// A classified request failure (cURL export, request assembly).
    Request(CodedError),
    Unauthorized(String),
    NotFound(String),
    Validation(String),
    Internal(String),
}

impl From<RepositoryError> for AppError {
    fn from(e: RepositoryError) -> Self {
        AppError::Repository(e)
    }
}

impl From<ServiceError> for AppError {
    fn from(e: ServiceError) -> Self {
        AppError::Service(e)
    }
}

impl From<OverlayError> for AppError {
    fn from(e: OverlayError) -> Self {
        AppError::Overlay(e)
    }
}

impl From<SnapshotError> for AppError {
    fn from(e: SnapshotError) -> Self {
        AppError::Snapshot(e)
    }
}

impl From<CodedError> for AppError {
    fn from(e: CodedError) -> Self {
        AppError::Request(e)
    }
}

fn repository_status(e: &RepositoryError) -> (StatusCode, &'static str, String) {
    match e {
        RepositoryError::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND", "Entity not found".to_string()),
        RepositoryError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
        RepositoryError::Invalid(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
        e => {
            tracing::error!(error = %e, "storage failure");
            (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", e.to_string())
        }
    }
}

impl AppError {
    /// Status, machine code and message for the envelope.
    pub fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::Repository(e) => repository_status(e),
            AppError::Service(ServiceError::NotFound(what)) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND", format!("{what} not found"))
            }
            AppError::Service(ServiceError::PermissionDenied) => {
                (StatusCode::FORBIDDEN, "PERMISSION_DENIED", "Permission denied".to_string())
            }
            AppError::Service(ServiceError::Invalid(msg)) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }
            AppError::Service(ServiceError::Conflict(msg)) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
            AppError::Service(ServiceError::Flow(FlowError::Repository(e))) => repository_status(e),
            AppError::Service(ServiceError::Flow(e)) => {
                (StatusCode::BAD_REQUEST, "INVALID_FLOW", e.to_string())
            }
            AppError::Service(ServiceError::Repository(e)) => repository_status(e),
            AppError::Overlay(e @ (OverlayError::ItemNotFound(_) | OverlayError::TargetNotFound(_))) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND", e.to_string())
            }
            AppError::Overlay(OverlayError::Repository(e)) => repository_status(e),
            AppError::Overlay(OverlayError::Rank(e)) => {
                tracing::error!(error = %e, "overlay rank failure");
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", e.to_string())
            }
            AppError::Overlay(e) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", e.to_string()),
            AppError::Snapshot(SnapshotError::Repository(e)) => repository_status(e),
            AppError::Snapshot(e @ (SnapshotError::WorkspaceExists(_) | SnapshotError::IdExists(_))) => {
                (StatusCode::CONFLICT, "CONFLICT", e.to_string())
            }
            AppError::Snapshot(e) => (StatusCode::BAD_REQUEST, "INVALID_SNAPSHOT", e.to_string()),
            AppError::Request(e) => (StatusCode::BAD_REQUEST, "REQUEST_ERROR", friendly_message(e)),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone()),
            AppError::NotFound(what) => (StatusCode::NOT_FOUND, "NOT_FOUND", format!("{what} not found")),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg.clone()),
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (_, code, message) = self.parts();
        write!(f, "{code}: {message}")
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        let mut error = json!({
            "code": code,
            "message": message,
        });
        if let AppError::Request(coded) = &self {
            error["details"] = json!({ "error_code": coded.code, "retryable": coded.retryable });
        }

        let body = json!({
            "data": null,
            "meta": {
                "request_id": uuid::Uuid::now_v7().to_string(),
                "timestamp": chrono::Utc::now().to_rfc3339(),
                "response_time_ms": 0
            },
            "errors": [error]
        });

        (
            status,
            [(axum::http::header::CONTENT_TYPE, "application/json")],
            body.to_string(),
        )
            .into_response()
    }
}
