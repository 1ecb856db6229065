//! Error types for the offline shell
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::lifecycle::LifecycleState;

// == Shell Error Enum ==
/// Unified error type for the offline shell.
#[derive(Error, Debug)]
pub enum ShellError {
    /// The network fetch rejected (offline, DNS failure, timeout)
    #[error("Network error: {0}")]
    Network(String),

    /// A precache asset could not be fetched, so the install attempt was aborted
    #[error("Install failed for {path}: {reason}")]
    InstallFailed { path: String, reason: String },

    /// A cache write would exceed the storage quota
    #[error("Storage quota exceeded: {0}")]
    QuotaExceeded(String),

    /// A write targeted a cache store that does not exist (or was purged)
    #[error("Cache store not found: {0}")]
    StoreNotFound(String),

    /// Reading or writing the persisted cache failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// A lifecycle transition was requested from the wrong state
    #[error("Invalid lifecycle state: expected {expected}, got {actual}")]
    InvalidState {
        expected: &'static str,
        actual: LifecycleState,
    },

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

// == IntoResponse Implementation ==
impl IntoResponse for ShellError {
    fn into_response(self) -> Response {
        let status = match &self {
            ShellError::Network(_) => StatusCode::BAD_GATEWAY,
            ShellError::InstallFailed { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ShellError::QuotaExceeded(_) => StatusCode::INSUFFICIENT_STORAGE,
            ShellError::StoreNotFound(_) => StatusCode::NOT_FOUND,
            ShellError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ShellError::InvalidState { .. } => StatusCode::CONFLICT,
            ShellError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ShellError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the offline shell.
pub type Result<T> = std::result::Result<T, ShellError>;
