//! Error handling module
//!
//! Two layers of errors live here:
//! - `ScanError`: the scan engine taxonomy (scope patterns, shapes, connectors,
//!   baselines, lifecycle, persistence)
//! - `AppError`: the HTTP boundary type that every handler returns

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;
use uuid::Uuid;

use crate::pipeline::types::{ScanPhase, ScanStatus};

/// Errors raised by the scan engine.
///
/// Pattern, baseline and source errors are raised before a scan run exists.
/// Everything else is caught at the orchestrator boundary and recorded on a
/// failed `ScanRecord` instead of being returned.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Invalid scope pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Unsupported shape: {0}")]
    UnsupportedShape(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Baseline {baseline_id} does not belong to source {source_id}")]
    InvalidBaseline { baseline_id: Uuid, source_id: Uuid },

    #[error("Source {0} is not registered")]
    UnknownSource(Uuid),

    #[error("Scan {0} is not in flight")]
    ScanNotFound(Uuid),

    #[error("Scan {scan_id} can no longer be cancelled (phase: {phase})")]
    NotCancellable { scan_id: Uuid, phase: ScanPhase },

    #[error("scan cancelled")]
    Cancelled,

    #[error("Illegal scan transition: {from} -> {to}")]
    IllegalTransition { from: ScanStatus, to: ScanStatus },

    #[error("Scan store error: {0}")]
    Store(String),
}

impl From<tokio_postgres::Error> for ScanError {
    fn from(err: tokio_postgres::Error) -> Self {
        ScanError::Store(err.to_string())
    }
}

impl From<deadpool_postgres::PoolError> for ScanError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        ScanError::Store(err.to_string())
    }
}

impl From<serde_json::Error> for ScanError {
    fn from(err: serde_json::Error) -> Self {
        ScanError::Store(format!("Corrupt stored scan payload: {}", err))
    }
}

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Scan error: {0}")]
    Scan(#[from] ScanError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ScanError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ScanError::InvalidPattern { .. } => (StatusCode::BAD_REQUEST, "INVALID_PATTERN"),
            ScanError::InvalidBaseline { .. } => (StatusCode::BAD_REQUEST, "INVALID_BASELINE"),
            ScanError::UnknownSource(_) => (StatusCode::NOT_FOUND, "UNKNOWN_SOURCE"),
            ScanError::ScanNotFound(_) => (StatusCode::NOT_FOUND, "SCAN_NOT_FOUND"),
            ScanError::UnsupportedShape(_) => (StatusCode::UNPROCESSABLE_ENTITY, "UNSUPPORTED_SHAPE"),
            ScanError::Connection(_) => (StatusCode::BAD_GATEWAY, "CONNECTION_ERROR"),
            ScanError::NotCancellable { .. }
            | ScanError::Cancelled
            | ScanError::IllegalTransition { .. } => (StatusCode::CONFLICT, "SCAN_STATE_CONFLICT"),
            ScanError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, message, details) = match &self {
            AppError::Scan(e) => {
                let (status, code) = e.status_and_code();
                if status.is_server_error() {
                    error!("Scan error: {:?}", e);
                    (status, code, "A scan store error occurred".to_string(), Some(e.to_string()))
                } else {
                    (status, code, e.to_string(), None)
                }
            }
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                msg.clone(),
                None,
            ),
            AppError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                msg.clone(),
                None,
            ),
            AppError::Internal(msg) => {
                error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                    Some(msg.clone()),
                )
            }
        };

        let body = Json(ErrorResponse {
            success: false,
            message,
            error: details,
            code: Some(error_code.to_string()),
        });

        (status, body).into_response()
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, AppError>;

/// Helper function to create a validation error
pub fn validation_error(msg: impl Into<String>) -> AppError {
    AppError::Validation(msg.into())
}

/// Helper function to create a not found error
pub fn not_found_error(msg: impl Into<String>) -> AppError {
    AppError::NotFound(msg.into())
}
