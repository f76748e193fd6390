//! Outbox dispatch for the catalog backend.
//!
//! This crate delivers the events that the domain layer commits to the
//! transactional outbox:
//! - [`EventHandler`] trait for side effects keyed by event type
//! - [`OutboxDispatcher`] claims pending entries, runs their handlers and
//!   records success, retry or parking
//! - [`rules`] is the static event type to cache target table
//! - [`CacheInvalidationHandler`] evicts the cache entries a rule names

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod invalidation;
pub mod rules;

pub use config::DispatcherConfig;
pub use dispatcher::{BatchReport, OutboxDispatcher};
pub use error::{DispatchError, HandlerError, Result};
pub use handler::EventHandler;
pub use invalidation::{CacheInvalidationHandler, invalidation_handlers};
pub use rules::{Eviction, Rule, Target};
