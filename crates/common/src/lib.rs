//! Shared types used across the catalog backend crates.

pub mod types;
pub mod version;

pub use types::{AggregateId, ProductId, UserId, VariantId};
pub use version::Version;
