//! Cache port for the catalog read side.
//!
//! - [`Cache`] is the async key/value port used by readers and by the
//!   invalidation handlers
//! - [`InMemoryCache`] is a TTL-bounded implementation for single-node use
//! - [`keys`] defines the key layout shared by writers and evictors

pub mod cache;
pub mod error;
pub mod keys;
pub mod memory;
mod pattern;

pub use cache::{Cache, CacheExt};
pub use error::{CacheError, Result};
pub use memory::InMemoryCache;
pub use pattern::KeyPattern;
