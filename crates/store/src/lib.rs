//! Persistence boundary for the catalog backend.
//!
//! Aggregates are stored as versioned JSON records. A [`ChangeSet`] groups the
//! record writes, unique-key claims and outbox entries of one unit of work and
//! is committed atomically by a [`Store`] implementation.

pub mod error;
pub mod memory;
pub mod outbox;
pub mod postgres;
pub mod query;
pub mod record;
pub mod store;

pub use common::{AggregateId, Version};
pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use outbox::{EntryId, OutboxEntry, OutboxEntryBuilder, OutboxStats, OutboxStatus};
pub use postgres::PostgresStore;
pub use query::RecordQuery;
pub use record::AggregateRecord;
pub use store::{
    AggregateWrite, ChangeSet, RecordStream, Store, StoreExt, UniqueKey, VersionCheck,
};
