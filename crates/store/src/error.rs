use thiserror::Error;

use crate::{AggregateId, EntryId, Version};

/// Errors that can occur when interacting with the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The row version moved between load and commit.
    #[error(
        "Concurrency conflict for aggregate {aggregate_id}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        aggregate_id: AggregateId,
        expected: Version,
        actual: Version,
    },

    /// A unique key is already owned by another aggregate.
    #[error("Unique key {scope}={value} is already taken")]
    UniqueViolation { scope: String, value: String },

    /// The change set is malformed (duplicate writes, version gaps).
    #[error("Invalid change set: {0}")]
    InvalidChangeSet(String),

    /// No outbox entry exists with this id.
    #[error("Outbox entry not found: {0}")]
    OutboxEntryNotFound(EntryId),

    /// A stored value could not be decoded.
    #[error("Corrupt row: {0}")]
    CorruptRow(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Returns true for errors that mean "someone else won the race".
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StoreError::ConcurrencyConflict { .. } | StoreError::UniqueViolation { .. }
        )
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
