//! Dispatch error types.

use std::time::Duration;

use thiserror::Error;

/// Errors raised by the dispatcher itself.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// An error occurred in the store.
    #[error("Store error: {0}")]
    Store(#[from] store::StoreError),
}

/// Result type for dispatcher operations.
pub type Result<T> = std::result::Result<T, DispatchError>;

/// Errors returned by event handlers. Recorded on the outbox entry, never
/// propagated to callers.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The payload lacks a field the handler needs.
    #[error("Malformed payload: {0}")]
    Payload(String),

    #[error("Cache error: {0}")]
    Cache(#[from] cache::CacheError),

    #[error("Handler timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Failed(String),
}
