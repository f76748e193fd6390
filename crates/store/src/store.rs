use std::collections::HashSet;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_core::Stream;

use crate::{
    AggregateId, AggregateRecord, EntryId, OutboxEntry, OutboxStats, OutboxStatus, RecordQuery,
    Result, StoreError, Version,
};

/// A record write guarded by the version it was loaded at.
#[derive(Debug, Clone)]
pub struct AggregateWrite {
    /// The new record; its version must be `expected_version.next()`.
    pub record: AggregateRecord,

    /// The version the writer loaded. `Version::initial()` means "must not exist".
    pub expected_version: Version,
}

/// A value that at most one aggregate may own within a scope (e.g. a category slug).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UniqueKey {
    pub scope: String,
    pub value: String,
    pub owner: AggregateId,
}

impl UniqueKey {
    pub fn new(scope: impl Into<String>, value: impl Into<String>, owner: AggregateId) -> Self {
        Self {
            scope: scope.into(),
            value: value.into(),
            owner,
        }
    }
}

/// A record the change set depends on without rewriting its state.
///
/// The commit fails with `ConcurrencyConflict` unless the record is still at
/// `expected_version`. With `bump`, the record's version also advances, so a
/// writer that loaded it earlier fails its own check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionCheck {
    pub aggregate_id: AggregateId,
    pub expected_version: Version,
    pub bump: bool,
}

impl VersionCheck {
    pub fn unchanged(aggregate_id: AggregateId, expected_version: Version) -> Self {
        Self {
            aggregate_id,
            expected_version,
            bump: false,
        }
    }

    pub fn bumped(aggregate_id: AggregateId, expected_version: Version) -> Self {
        Self {
            aggregate_id,
            expected_version,
            bump: true,
        }
    }
}

/// Everything one unit of work wants to persist.
///
/// Committed all-or-nothing: if any version check or key claim fails, nothing
/// in the set is written.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub writes: Vec<AggregateWrite>,
    /// Records read to build the writes; none of them may have moved.
    pub checks: Vec<VersionCheck>,
    /// Keys released before claims are processed (owned keys only).
    pub released_keys: Vec<UniqueKey>,
    pub claimed_keys: Vec<UniqueKey>,
    /// Outbox entries in emission order.
    pub outbox: Vec<OutboxEntry>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
            && self.checks.is_empty()
            && self.released_keys.is_empty()
            && self.claimed_keys.is_empty()
            && self.outbox.is_empty()
    }

    /// Checks the set is internally consistent before it reaches a backend.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::with_capacity(self.writes.len());
        for write in &self.writes {
            if !seen.insert(write.record.aggregate_id) {
                return Err(StoreError::InvalidChangeSet(format!(
                    "aggregate {} written twice",
                    write.record.aggregate_id
                )));
            }
            if write.record.version != write.expected_version.next() {
                return Err(StoreError::InvalidChangeSet(format!(
                    "aggregate {} must be written at version {}, got {}",
                    write.record.aggregate_id,
                    write.expected_version.next(),
                    write.record.version
                )));
            }
        }

        for check in &self.checks {
            if !seen.insert(check.aggregate_id) {
                return Err(StoreError::InvalidChangeSet(format!(
                    "aggregate {} both checked and written, or checked twice",
                    check.aggregate_id
                )));
            }
        }

        let mut claimed = HashSet::with_capacity(self.claimed_keys.len());
        for key in &self.claimed_keys {
            if !claimed.insert((key.scope.as_str(), key.value.as_str())) {
                return Err(StoreError::InvalidChangeSet(format!(
                    "unique key {}={} claimed twice",
                    key.scope, key.value
                )));
            }
        }

        Ok(())
    }
}

/// A stream of records.
pub type RecordStream = Pin<Box<dyn Stream<Item = Result<AggregateRecord>> + Send>>;

/// Core trait for store implementations.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Store: Send + Sync {
    /// Atomically applies a change set.
    ///
    /// Fails with `ConcurrencyConflict` if any written or checked record's
    /// stored version differs from its `expected_version`, and with `UniqueViolation` if a claimed key
    /// belongs to another aggregate. Outbox entries receive their sequence here.
    async fn commit(&self, changes: ChangeSet) -> Result<()>;

    /// Loads the current record of an aggregate.
    async fn load(&self, aggregate_id: AggregateId) -> Result<Option<AggregateRecord>>;

    /// Loads records matching a query.
    async fn query(&self, query: RecordQuery) -> Result<Vec<AggregateRecord>>;

    /// Streams every record of one aggregate type.
    async fn stream_records(&self, aggregate_type: &str) -> Result<RecordStream>;

    /// Returns the owner of a unique key, if claimed.
    async fn unique_key_owner(&self, scope: &str, value: &str) -> Result<Option<AggregateId>>;

    /// Claims up to `limit` deliverable entries in sequence order, hiding them
    /// from other claimers for `visibility_timeout`.
    async fn claim_pending(
        &self,
        limit: usize,
        visibility_timeout: Duration,
    ) -> Result<Vec<OutboxEntry>>;

    /// Marks an entry delivered.
    async fn mark_dispatched(&self, id: EntryId) -> Result<()>;

    /// Records a failed attempt. The entry becomes claimable again at
    /// `retry_at`, or `Failed` once `max_attempts` is reached. Returns the new status.
    async fn record_failure(
        &self,
        id: EntryId,
        error: &str,
        retry_at: DateTime<Utc>,
        max_attempts: u32,
    ) -> Result<OutboxStatus>;

    /// Drops the claim on an entry without counting an attempt.
    async fn release(&self, id: EntryId) -> Result<()>;

    /// Loads one outbox entry.
    async fn outbox_entry(&self, id: EntryId) -> Result<Option<OutboxEntry>>;

    /// Lists entries parked as failed, oldest first.
    async fn failed_entries(&self, limit: usize) -> Result<Vec<OutboxEntry>>;

    /// Moves a failed entry back to pending with a fresh attempt budget.
    ///
    /// Returns false if the entry exists but is not failed.
    async fn retry_failed(&self, id: EntryId) -> Result<bool>;

    /// Counts entries per status.
    async fn outbox_stats(&self) -> Result<OutboxStats>;
}

#[async_trait]
impl<T: Store + ?Sized> Store for Arc<T> {
    async fn commit(&self, changes: ChangeSet) -> Result<()> {
        (**self).commit(changes).await
    }

    async fn load(&self, aggregate_id: AggregateId) -> Result<Option<AggregateRecord>> {
        (**self).load(aggregate_id).await
    }

    async fn query(&self, query: RecordQuery) -> Result<Vec<AggregateRecord>> {
        (**self).query(query).await
    }

    async fn stream_records(&self, aggregate_type: &str) -> Result<RecordStream> {
        (**self).stream_records(aggregate_type).await
    }

    async fn unique_key_owner(&self, scope: &str, value: &str) -> Result<Option<AggregateId>> {
        (**self).unique_key_owner(scope, value).await
    }

    async fn claim_pending(
        &self,
        limit: usize,
        visibility_timeout: Duration,
    ) -> Result<Vec<OutboxEntry>> {
        (**self).claim_pending(limit, visibility_timeout).await
    }

    async fn mark_dispatched(&self, id: EntryId) -> Result<()> {
        (**self).mark_dispatched(id).await
    }

    async fn record_failure(
        &self,
        id: EntryId,
        error: &str,
        retry_at: DateTime<Utc>,
        max_attempts: u32,
    ) -> Result<OutboxStatus> {
        (**self)
            .record_failure(id, error, retry_at, max_attempts)
            .await
    }

    async fn release(&self, id: EntryId) -> Result<()> {
        (**self).release(id).await
    }

    async fn outbox_entry(&self, id: EntryId) -> Result<Option<OutboxEntry>> {
        (**self).outbox_entry(id).await
    }

    async fn failed_entries(&self, limit: usize) -> Result<Vec<OutboxEntry>> {
        (**self).failed_entries(limit).await
    }

    async fn retry_failed(&self, id: EntryId) -> Result<bool> {
        (**self).retry_failed(id).await
    }

    async fn outbox_stats(&self) -> Result<OutboxStats> {
        (**self).outbox_stats().await
    }
}

/// Convenience methods for stores.
#[async_trait]
pub trait StoreExt: Store {
    /// Loads every record of one aggregate type.
    async fn load_all(&self, aggregate_type: &str) -> Result<Vec<AggregateRecord>> {
        self.query(RecordQuery::for_type(aggregate_type)).await
    }

    /// Returns the stored version of an aggregate, if it exists.
    async fn version_of(&self, aggregate_id: AggregateId) -> Result<Option<Version>> {
        Ok(self.load(aggregate_id).await?.map(|r| r.version))
    }

    /// Commits a single record write with its outbox entries.
    async fn commit_write(&self, write: AggregateWrite, outbox: Vec<OutboxEntry>) -> Result<()> {
        self.commit(ChangeSet {
            writes: vec![write],
            outbox,
            ..Default::default()
        })
        .await
    }
}

impl<T: Store + ?Sized> StoreExt for T {}
