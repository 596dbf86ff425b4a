// SPDX-License-Identifier: MIT

//! Application error types with consistent API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("User {user} already has routine \"{routine}\" assigned")]
    DuplicateAssignment { user: String, routine: String },

    #[error("Clone of routine {routine_id} failed after {batches_committed} committed batch(es): {source_error}")]
    PartialCommit {
        routine_id: String,
        batches_committed: usize,
        source_error: String,
    },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::DuplicateAssignment { .. } => (
                StatusCode::CONFLICT,
                "duplicate_assignment",
                Some(self.to_string()),
            ),
            AppError::PartialCommit { routine_id, .. } => {
                // The parent routine stays marked cloneStatus=pending so the
                // reconciliation pass can roll it back.
                tracing::error!(routine_id = %routine_id, error = %self, "Partial clone commit");
                (StatusCode::INTERNAL_SERVER_ERROR, "partial_commit", None)
            }
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
