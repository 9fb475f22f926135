//! Unified server error type.
//!
//! Every handler returns `Result<T, ServerError>`, which implements
//! [`axum::response::IntoResponse`] so errors are automatically converted
//! to a JSON-body HTTP response with an appropriate status code.
//!
//! Internal errors are logged with full detail but only a generic message is
//! returned to the caller so that file paths or other implementation details
//! never leak to clients.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use patrol_core::worker::WorkerError;
use patrol_core::{DeviceError, LaunchError, LedgerError, SessionError, WhitelistError};
use patrol_export::ExportError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// All errors that can occur in the patrol-server request lifecycle.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The caller sent an invalid or malformed request.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The caller referenced a resource that does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The request races an operation that is already in flight
    /// (a running patrol task, an export job).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The patrol worker process cannot be reached.
    #[error("worker unavailable: {0}")]
    WorkerUnavailable(String),

    /// An unclassified internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, client_message) = match &self {
            // Client-facing errors: expose the message directly.
            ServerError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
            ServerError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
            ServerError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
            ServerError::WorkerUnavailable(m) => (StatusCode::BAD_GATEWAY, m.clone()),

            // Internal errors: log the full detail, return a generic message.
            ServerError::Internal(m) => {
                error!(message = %m, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_owned(),
                )
            }
        };
        (status, Json(json!({ "error": client_message }))).into_response()
    }
}

impl From<WorkerError> for ServerError {
    fn from(err: WorkerError) -> Self {
        match err {
            WorkerError::Unavailable { .. } => ServerError::WorkerUnavailable(err.to_string()),
            WorkerError::TaskNotFound { .. } => ServerError::NotFound(err.to_string()),
            WorkerError::TaskAlreadyRunning => ServerError::Conflict(err.to_string()),
            WorkerError::Rejected { .. } => ServerError::BadRequest(err.to_string()),
            WorkerError::Protocol { .. } => ServerError::WorkerUnavailable(err.to_string()),
        }
    }
}

impl From<SessionError> for ServerError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Launch(launch) => launch.into(),
            SessionError::TaskAlreadyRunning { .. } => ServerError::Conflict(err.to_string()),
            SessionError::TaskNotFound { .. } => ServerError::NotFound(err.to_string()),
            SessionError::AlreadyTerminal { .. } => ServerError::BadRequest(err.to_string()),
            SessionError::Worker(worker) => worker.into(),
        }
    }
}

impl From<LaunchError> for ServerError {
    fn from(err: LaunchError) -> Self {
        ServerError::BadRequest(err.to_string())
    }
}

impl From<WhitelistError> for ServerError {
    fn from(err: WhitelistError) -> Self {
        match err {
            WhitelistError::EntryNotFound { .. } => ServerError::NotFound(err.to_string()),
            WhitelistError::ShopIndexOutOfRange { .. } => ServerError::BadRequest(err.to_string()),
            WhitelistError::Persist(_) => ServerError::Internal(err.to_string()),
        }
    }
}

impl From<DeviceError> for ServerError {
    fn from(err: DeviceError) -> Self {
        ServerError::NotFound(err.to_string())
    }
}

impl From<LedgerError> for ServerError {
    fn from(err: LedgerError) -> Self {
        ServerError::Internal(err.to_string())
    }
}

impl From<ExportError> for ServerError {
    fn from(err: ExportError) -> Self {
        match err {
            ExportError::Busy => ServerError::Conflict(err.to_string()),
            other => ServerError::Internal(other.to_string()),
        }
    }
}

impl From<anyhow::Error> for ServerError {
    fn from(e: anyhow::Error) -> Self {
        // Log the full error chain before discarding it so diagnostic detail
        // is preserved in the server logs.
        error!(error = ?e, "converting anyhow error to ServerError::Internal");
        ServerError::Internal(e.to_string())
    }
}
