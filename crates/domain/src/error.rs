//! Domain error types.

use common::AggregateId;
use store::{StoreError, Version};
use thiserror::Error;

use crate::category::CATEGORY_SLUG_SCOPE;

/// Errors that can occur during domain operations.
///
/// Every aggregate error converts into one of these, so callers (the HTTP
/// layer in particular) only need to know this taxonomy.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Malformed input: empty name, bad slug format, invalid amount.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The operation clashes with current state or with a concurrent writer.
    #[error("Conflict: {0}")]
    Conflict(ConflictKind),

    /// An error occurred in the store.
    #[error("Store error: {0}")]
    Store(StoreError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// The specific reason behind a [`DomainError::Conflict`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConflictKind {
    /// The new parent is the category itself or one of its descendants.
    #[error("category {category_id} cannot be placed under {parent_id}: circular reference")]
    CircularReference {
        category_id: AggregateId,
        parent_id: AggregateId,
    },

    /// Stored parent links already form a cycle, or exceed the depth cap.
    #[error("hierarchy above category {category_id} is corrupt")]
    CorruptHierarchy { category_id: AggregateId },

    /// Another category already uses this slug.
    #[error("slug '{slug}' is already taken")]
    SlugTaken { slug: String },

    /// The row version moved between load and commit.
    #[error("aggregate {aggregate_id} was modified concurrently (expected version {expected}, found {actual})")]
    Concurrency {
        aggregate_id: AggregateId,
        expected: Version,
        actual: Version,
    },

    /// A unique value outside the category slug scope is already owned.
    #[error("{scope} '{value}' is already taken")]
    DuplicateKey { scope: String, value: String },

    /// The aggregate's state does not allow the requested transition.
    #[error("{entity}: {message}")]
    InvalidState {
        entity: &'static str,
        message: String,
    },
}

impl DomainError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        DomainError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn invalid_state(entity: &'static str, message: impl Into<String>) -> Self {
        DomainError::Conflict(ConflictKind::InvalidState {
            entity,
            message: message.into(),
        })
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, DomainError::Validation(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DomainError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, DomainError::Conflict(_))
    }

    /// Returns the conflict reason, if this is a conflict.
    pub fn conflict_kind(&self) -> Option<&ConflictKind> {
        match self {
            DomainError::Conflict(kind) => Some(kind),
            _ => None,
        }
    }
}

impl From<StoreError> for DomainError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::ConcurrencyConflict {
                aggregate_id,
                expected,
                actual,
            } => DomainError::Conflict(ConflictKind::Concurrency {
                aggregate_id,
                expected,
                actual,
            }),
            StoreError::UniqueViolation { scope, value } if scope == CATEGORY_SLUG_SCOPE => {
                DomainError::Conflict(ConflictKind::SlugTaken { slug: value })
            }
            StoreError::UniqueViolation { scope, value } => {
                DomainError::Conflict(ConflictKind::DuplicateKey { scope, value })
            }
            other => DomainError::Store(other),
        }
    }
}
