//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use dispatch::DispatchError;
use domain::DomainError;
use store::StoreError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// The request clashes with current state.
    Conflict(String),
    /// Domain logic error.
    Domain(DomainError),
    /// Outbox administration error.
    Dispatch(DispatchError),
    /// Internal server error.
    Internal(String),
}

const INTERNAL_MESSAGE: &str = "Internal server error";

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Domain(err) => domain_error_to_response(err),
            ApiError::Dispatch(err) => dispatch_error_to_response(err),
            ApiError::Internal(msg) => internal(msg),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

/// Internal details go to the log only.
fn internal(detail: String) -> (StatusCode, String) {
    tracing::error!(error = %detail, "internal server error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        INTERNAL_MESSAGE.to_string(),
    )
}

fn domain_error_to_response(err: DomainError) -> (StatusCode, String) {
    match &err {
        DomainError::Validation(_) => (StatusCode::BAD_REQUEST, err.to_string()),
        DomainError::NotFound { .. } => (StatusCode::NOT_FOUND, err.to_string()),
        DomainError::Conflict(_) => (StatusCode::CONFLICT, err.to_string()),
        DomainError::Store(_) | DomainError::Serialization(_) => internal(err.to_string()),
    }
}

fn dispatch_error_to_response(err: DispatchError) -> (StatusCode, String) {
    match &err {
        DispatchError::Store(StoreError::OutboxEntryNotFound(_)) => {
            (StatusCode::NOT_FOUND, err.to_string())
        }
        DispatchError::Store(_) => internal(err.to_string()),
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Domain(err)
    }
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        ApiError::Dispatch(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Internal(err.to_string())
    }
}
