use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// Requested status change violates the forward chain. Non-retryable;
    /// the order is left unchanged.
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    /// Ledger operation named a driver the order is not assigned to.
    #[error("order not assigned to driver: {0}")]
    NotAssignedToDriver(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    /// Precondition already consumed by a concurrent caller (duplicate
    /// assign, busy driver).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Transient write-path failure. Safe for the caller to retry.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Payment bookkeeping could not be written. The delivered status is
    /// already committed and is never rolled back for this.
    #[error("reconciliation failed: {0}")]
    ReconciliationFailed(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::InvalidTransition(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.clone()),
            AppError::NotAssignedToDriver(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::StorageUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            AppError::ReconciliationFailed(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}
