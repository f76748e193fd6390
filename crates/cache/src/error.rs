//! Cache error types.

use thiserror::Error;

/// Errors that can occur during cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    /// A cached value could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The eviction pattern is empty or otherwise unusable.
    #[error("Invalid key pattern: '{0}'")]
    InvalidPattern(String),

    /// The cache backend could not be reached.
    #[error("Cache unavailable: {0}")]
    Unavailable(String),
}

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
