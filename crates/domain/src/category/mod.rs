//! Category aggregate, hierarchy rules and services.

mod aggregate;
mod commands;
mod events;
pub mod hierarchy;
mod reconcile;
mod repository;
mod service;

pub use aggregate::{Category, validate_slug};
pub use commands::*;
pub use events::{
    CategoryCreatedData, CategoryDetailsUpdatedData, CategoryEvent, CategoryMovedData,
    CategoryPathChangedData, CategoryRenamedData, CategorySlugChangedData,
    CategoryStatusChangedData,
};
pub use hierarchy::{MAX_HIERARCHY_DEPTH, Placement};
pub use reconcile::{HierarchyReconciler, ReconcileReport};
pub use repository::{CategoryReader, StoreCategoryReader};
pub use service::CategoryService;

use common::AggregateId;
use thiserror::Error;

use crate::error::{ConflictKind, DomainError};

/// Unique-key scope holding category slugs.
pub const CATEGORY_SLUG_SCOPE: &str = "category.slug";

/// Errors raised by the category aggregate itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CategoryError {
    #[error("Category name must not be empty")]
    EmptyName,

    #[error("Category slug must not be empty")]
    EmptySlug,

    #[error("Invalid slug '{0}': only lowercase letters, digits and '-' are allowed")]
    InvalidSlug(String),

    #[error("Category already created")]
    AlreadyCreated,

    #[error("Category not created")]
    NotCreated,

    #[error("Category {category_id} cannot be placed under {parent_id}: circular reference")]
    CircularReference {
        category_id: AggregateId,
        parent_id: AggregateId,
    },
}

impl From<CategoryError> for DomainError {
    fn from(e: CategoryError) -> Self {
        match e {
            CategoryError::EmptyName | CategoryError::EmptySlug | CategoryError::InvalidSlug(_) => {
                DomainError::Validation(e.to_string())
            }
            CategoryError::CircularReference {
                category_id,
                parent_id,
            } => DomainError::Conflict(ConflictKind::CircularReference {
                category_id,
                parent_id,
            }),
            CategoryError::AlreadyCreated | CategoryError::NotCreated => {
                DomainError::invalid_state("Category", e.to_string())
            }
        }
    }
}
