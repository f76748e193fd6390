use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::{
    AggregateId, AggregateRecord, ChangeSet, EntryId, OutboxEntry, OutboxStats, OutboxStatus,
    RecordQuery, Result, StoreError, Version,
    store::{RecordStream, Store},
};

#[derive(Debug, Default)]
struct Inner {
    records: HashMap<AggregateId, AggregateRecord>,
    unique_keys: HashMap<(String, String), AggregateId>,
    outbox: Vec<OutboxEntry>,
    next_sequence: i64,
}

/// In-memory store for tests and local runs.
///
/// One lock guards records, keys and outbox, which is what makes `commit`
/// atomic here.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of stored records.
    pub async fn record_count(&self) -> usize {
        self.inner.read().await.records.len()
    }

    /// Returns a copy of every outbox entry in sequence order.
    pub async fn outbox_entries(&self) -> Vec<OutboxEntry> {
        self.inner.read().await.outbox.clone()
    }

    /// Clears all records, keys and entries.
    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        *inner = Inner::default();
    }

    fn entry_mut(inner: &mut Inner, id: EntryId) -> Result<&mut OutboxEntry> {
        inner
            .outbox
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(StoreError::OutboxEntryNotFound(id))
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn commit(&self, changes: ChangeSet) -> Result<()> {
        changes.validate()?;

        let mut inner = self.inner.write().await;

        // Check everything before touching anything.
        let expectations = changes
            .writes
            .iter()
            .map(|w| (w.record.aggregate_id, w.expected_version))
            .chain(
                changes
                    .checks
                    .iter()
                    .map(|c| (c.aggregate_id, c.expected_version)),
            );
        for (aggregate_id, expected) in expectations {
            let actual = inner
                .records
                .get(&aggregate_id)
                .map(|r| r.version)
                .unwrap_or(Version::initial());
            if actual != expected {
                return Err(StoreError::ConcurrencyConflict {
                    aggregate_id,
                    expected,
                    actual,
                });
            }
        }

        for key in &changes.claimed_keys {
            let map_key = (key.scope.clone(), key.value.clone());
            if let Some(owner) = inner.unique_keys.get(&map_key)
                && *owner != key.owner
                && !changes.released_keys.iter().any(|r| {
                    r.scope == key.scope && r.value == key.value && r.owner == *owner
                })
            {
                return Err(StoreError::UniqueViolation {
                    scope: key.scope.clone(),
                    value: key.value.clone(),
                });
            }
        }

        for write in changes.writes {
            inner
                .records
                .insert(write.record.aggregate_id, write.record);
        }

        for check in changes.checks.iter().filter(|c| c.bump) {
            if let Some(record) = inner.records.get_mut(&check.aggregate_id) {
                record.version = record.version.next();
            }
        }

        for key in changes.released_keys {
            let map_key = (key.scope, key.value);
            if inner.unique_keys.get(&map_key) == Some(&key.owner) {
                inner.unique_keys.remove(&map_key);
            }
        }

        for key in changes.claimed_keys {
            inner.unique_keys.insert((key.scope, key.value), key.owner);
        }

        for mut entry in changes.outbox {
            inner.next_sequence += 1;
            entry.sequence = inner.next_sequence;
            inner.outbox.push(entry);
        }

        Ok(())
    }

    async fn load(&self, aggregate_id: AggregateId) -> Result<Option<AggregateRecord>> {
        Ok(self.inner.read().await.records.get(&aggregate_id).cloned())
    }

    async fn query(&self, query: RecordQuery) -> Result<Vec<AggregateRecord>> {
        let inner = self.inner.read().await;
        let matched: Vec<_> = inner
            .records
            .values()
            .filter(|r| query.matches(r))
            .cloned()
            .collect();
        Ok(query.arrange(matched))
    }

    async fn stream_records(&self, aggregate_type: &str) -> Result<RecordStream> {
        use futures_util::stream;

        let records = self
            .query(RecordQuery::for_type(aggregate_type))
            .await?;
        Ok(Box::pin(stream::iter(records.into_iter().map(Ok))))
    }

    async fn unique_key_owner(&self, scope: &str, value: &str) -> Result<Option<AggregateId>> {
        let inner = self.inner.read().await;
        Ok(inner
            .unique_keys
            .get(&(scope.to_string(), value.to_string()))
            .copied())
    }

    async fn claim_pending(
        &self,
        limit: usize,
        visibility_timeout: Duration,
    ) -> Result<Vec<OutboxEntry>> {
        let now = Utc::now();
        let locked_until = now
            + chrono::Duration::from_std(visibility_timeout)
                .unwrap_or_else(|_| chrono::Duration::seconds(30));

        let mut inner = self.inner.write().await;
        // Vec is kept in sequence order by commit.
        let claimed = inner
            .outbox
            .iter_mut()
            .filter(|e| e.is_claimable(now))
            .take(limit)
            .map(|e| {
                e.locked_until = Some(locked_until);
                e.clone()
            })
            .collect();
        Ok(claimed)
    }

    async fn mark_dispatched(&self, id: EntryId) -> Result<()> {
        let mut inner = self.inner.write().await;
        let entry = Self::entry_mut(&mut inner, id)?;
        entry.status = OutboxStatus::Dispatched;
        entry.dispatched_at = Some(Utc::now());
        entry.locked_until = None;
        Ok(())
    }

    async fn record_failure(
        &self,
        id: EntryId,
        error: &str,
        retry_at: DateTime<Utc>,
        max_attempts: u32,
    ) -> Result<OutboxStatus> {
        let mut inner = self.inner.write().await;
        let entry = Self::entry_mut(&mut inner, id)?;
        entry.attempts += 1;
        entry.last_error = Some(error.to_string());
        entry.locked_until = None;
        if entry.attempts >= max_attempts {
            entry.status = OutboxStatus::Failed;
        } else {
            entry.available_at = retry_at;
        }
        Ok(entry.status)
    }

    async fn release(&self, id: EntryId) -> Result<()> {
        let mut inner = self.inner.write().await;
        Self::entry_mut(&mut inner, id)?.locked_until = None;
        Ok(())
    }

    async fn outbox_entry(&self, id: EntryId) -> Result<Option<OutboxEntry>> {
        let inner = self.inner.read().await;
        Ok(inner.outbox.iter().find(|e| e.id == id).cloned())
    }

    async fn failed_entries(&self, limit: usize) -> Result<Vec<OutboxEntry>> {
        let inner = self.inner.read().await;
        Ok(inner
            .outbox
            .iter()
            .filter(|e| e.status == OutboxStatus::Failed)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn retry_failed(&self, id: EntryId) -> Result<bool> {
        let mut inner = self.inner.write().await;
        let entry = Self::entry_mut(&mut inner, id)?;
        if entry.status != OutboxStatus::Failed {
            return Ok(false);
        }
        entry.status = OutboxStatus::Pending;
        entry.attempts = 0;
        entry.available_at = Utc::now();
        entry.locked_until = None;
        Ok(true)
    }

    async fn outbox_stats(&self) -> Result<OutboxStats> {
        let inner = self.inner.read().await;
        let mut stats = OutboxStats::default();
        for entry in &inner.outbox {
            match entry.status {
                OutboxStatus::Pending => stats.pending += 1,
                OutboxStatus::Dispatched => stats.dispatched += 1,
                OutboxStatus::Failed => stats.failed += 1,
            }
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AggregateWrite, StoreExt, UniqueKey, VersionCheck};

    fn write(id: AggregateId, expected: Version, state: serde_json::Value) -> AggregateWrite {
        AggregateWrite {
            record: AggregateRecord::new(id, "Category", expected.next(), state),
            expected_version: expected,
        }
    }

    fn entry(aggregate_id: AggregateId, event_type: &str) -> OutboxEntry {
        OutboxEntry::builder()
            .aggregate_id(aggregate_id)
            .aggregate_type("Category")
            .event_type(event_type)
            .payload_raw(serde_json::json!({"test": true}))
            .build()
    }

    #[tokio::test]
    async fn commit_writes_record_and_outbox_together() {
        let store = InMemoryStore::new();
        let id = AggregateId::new();

        store
            .commit(ChangeSet {
                writes: vec![write(id, Version::initial(), serde_json::json!({"slug": "a"}))],
                outbox: vec![entry(id, "CategoryCreated"), entry(id, "CategoryActivated")],
                ..Default::default()
            })
            .await
            .unwrap();

        let record = store.load(id).await.unwrap().unwrap();
        assert_eq!(record.version, Version::first());

        let entries = store.outbox_entries().await;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].sequence, 1);
        assert_eq!(entries[1].sequence, 2);
        assert_eq!(entries[0].event_type, "CategoryCreated");
    }

    #[tokio::test]
    async fn stale_version_rejects_whole_change_set() {
        let store = InMemoryStore::new();
        let first = AggregateId::new();
        let second = AggregateId::new();

        store
            .commit_write(write(first, Version::initial(), serde_json::json!({})), vec![])
            .await
            .unwrap();

        // `second` is fine but `first` is stale, so neither lands.
        let result = store
            .commit(ChangeSet {
                writes: vec![
                    write(second, Version::initial(), serde_json::json!({})),
                    write(first, Version::initial(), serde_json::json!({})),
                ],
                outbox: vec![entry(second, "CategoryCreated")],
                ..Default::default()
            })
            .await;

        assert!(matches!(
            result,
            Err(StoreError::ConcurrencyConflict { .. })
        ));
        assert!(store.load(second).await.unwrap().is_none());
        assert!(store.outbox_entries().await.is_empty());
    }

    #[tokio::test]
    async fn moved_check_rejects_the_whole_set() {
        let store = InMemoryStore::new();
        let parent = AggregateId::new();
        let child = AggregateId::new();
        store
            .commit_write(write(parent, Version::initial(), serde_json::json!({})), vec![])
            .await
            .unwrap();
        store
            .commit_write(
                write(parent, Version::first(), serde_json::json!({"moved": true})),
                vec![],
            )
            .await
            .unwrap();

        let result = store
            .commit(ChangeSet {
                writes: vec![write(child, Version::initial(), serde_json::json!({}))],
                checks: vec![VersionCheck::unchanged(parent, Version::first())],
                ..Default::default()
            })
            .await;

        assert!(matches!(
            result,
            Err(StoreError::ConcurrencyConflict { aggregate_id, .. }) if aggregate_id == parent
        ));
        assert!(store.load(child).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn bumped_check_advances_version_and_keeps_state() {
        let store = InMemoryStore::new();
        let parent = AggregateId::new();
        store
            .commit_write(
                write(parent, Version::initial(), serde_json::json!({"slug": "p"})),
                vec![],
            )
            .await
            .unwrap();

        store
            .commit(ChangeSet {
                checks: vec![VersionCheck::bumped(parent, Version::first())],
                ..Default::default()
            })
            .await
            .unwrap();

        let record = store.load(parent).await.unwrap().unwrap();
        assert_eq!(record.version, Version::new(2));
        assert_eq!(record.state, serde_json::json!({"slug": "p"}));

        // A writer that loaded version 1 now loses.
        let stale = store
            .commit_write(write(parent, Version::first(), serde_json::json!({})), vec![])
            .await;
        assert!(matches!(stale, Err(StoreError::ConcurrencyConflict { .. })));
    }

    #[tokio::test]
    async fn unique_key_claims_and_releases() {
        let store = InMemoryStore::new();
        let owner = AggregateId::new();
        let rival = AggregateId::new();

        store
            .commit(ChangeSet {
                claimed_keys: vec![UniqueKey::new("category.slug", "phones", owner)],
                ..Default::default()
            })
            .await
            .unwrap();

        let result = store
            .commit(ChangeSet {
                claimed_keys: vec![UniqueKey::new("category.slug", "phones", rival)],
                ..Default::default()
            })
            .await;
        assert!(matches!(result, Err(StoreError::UniqueViolation { .. })));

        // Re-claim by the owner is a no-op.
        store
            .commit(ChangeSet {
                claimed_keys: vec![UniqueKey::new("category.slug", "phones", owner)],
                ..Default::default()
            })
            .await
            .unwrap();

        store
            .commit(ChangeSet {
                released_keys: vec![UniqueKey::new("category.slug", "phones", owner)],
                claimed_keys: vec![UniqueKey::new("category.slug", "mobiles", owner)],
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(
            store.unique_key_owner("category.slug", "phones").await.unwrap(),
            None
        );
        assert_eq!(
            store
                .unique_key_owner("category.slug", "mobiles")
                .await
                .unwrap(),
            Some(owner)
        );
    }

    #[tokio::test]
    async fn claimed_entries_are_hidden_until_released() {
        let store = InMemoryStore::new();
        let id = AggregateId::new();
        store
            .commit(ChangeSet {
                outbox: vec![entry(id, "A"), entry(id, "B"), entry(id, "C")],
                ..Default::default()
            })
            .await
            .unwrap();

        let first = store
            .claim_pending(2, Duration::from_secs(30))
            .await
            .unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].event_type, "A");

        let second = store
            .claim_pending(10, Duration::from_secs(30))
            .await
            .unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].event_type, "C");

        store.release(first[0].id).await.unwrap();
        let third = store
            .claim_pending(10, Duration::from_secs(30))
            .await
            .unwrap();
        assert_eq!(third.len(), 1);
        assert_eq!(third[0].id, first[0].id);
    }

    #[tokio::test]
    async fn failures_back_off_then_park() {
        let store = InMemoryStore::new();
        let id = AggregateId::new();
        let e = entry(id, "CategoryMoved");
        let entry_id = e.id;
        store
            .commit(ChangeSet {
                outbox: vec![e],
                ..Default::default()
            })
            .await
            .unwrap();

        let later = Utc::now() + chrono::Duration::hours(1);
        let status = store
            .record_failure(entry_id, "cache down", later, 2)
            .await
            .unwrap();
        assert_eq!(status, OutboxStatus::Pending);
        assert!(
            store
                .claim_pending(10, Duration::from_secs(30))
                .await
                .unwrap()
                .is_empty()
        );

        let status = store
            .record_failure(entry_id, "cache still down", Utc::now(), 2)
            .await
            .unwrap();
        assert_eq!(status, OutboxStatus::Failed);

        let failed = store.failed_entries(10).await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].attempts, 2);
        assert_eq!(failed[0].last_error.as_deref(), Some("cache still down"));

        assert!(store.retry_failed(entry_id).await.unwrap());
        assert!(!store.retry_failed(entry_id).await.unwrap());
        let stats = store.outbox_stats().await.unwrap();
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.failed, 0);
    }

    #[tokio::test]
    async fn mark_dispatched_unknown_entry() {
        let store = InMemoryStore::new();
        let result = store.mark_dispatched(EntryId::new()).await;
        assert!(matches!(result, Err(StoreError::OutboxEntryNotFound(_))));
    }

    #[tokio::test]
    async fn query_and_stream_by_type() {
        use futures_util::StreamExt;

        let store = InMemoryStore::new();
        for slug in ["b", "a"] {
            store
                .commit_write(
                    write(
                        AggregateId::new(),
                        Version::initial(),
                        serde_json::json!({"slug": slug}),
                    ),
                    vec![],
                )
                .await
                .unwrap();
        }

        let sorted = store
            .query(RecordQuery::for_type("Category").order_by("slug"))
            .await
            .unwrap();
        assert_eq!(sorted[0].field("slug"), &serde_json::json!("a"));

        let streamed: Vec<_> = store.stream_records("Category").await.unwrap().collect().await;
        assert_eq!(streamed.len(), 2);
        assert!(store.load_all("Cart").await.unwrap().is_empty());
    }
}
