//! Unit of work: everything one command wants to persist, committed at once.

use common::AggregateId;
use store::{
    AggregateRecord, AggregateWrite, ChangeSet, OutboxEntry, Store, UniqueKey, Version,
    VersionCheck,
};

use crate::aggregate::{Aggregate, DomainEvent};
use crate::error::DomainError;

/// Collects aggregate writes, their events and unique-key changes, and
/// commits them atomically with [`save_changes`](UnitOfWork::save_changes).
///
/// Dropping a unit of work without saving discards everything staged, so a
/// cancelled request never persists half a change.
pub struct UnitOfWork<'a, S: Store + ?Sized> {
    store: &'a S,
    changes: ChangeSet,
    correlation_id: Option<String>,
}

impl<'a, S: Store + ?Sized> UnitOfWork<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            changes: ChangeSet::new(),
            correlation_id: None,
        }
    }

    /// Tags every outbox entry staged from now on with a correlation id.
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Applies `events` to `aggregate` and stages the resulting state plus one
    /// outbox entry per event, in order.
    ///
    /// The aggregate's version is advanced to the version it will have once
    /// committed. Staging the same aggregate again replaces its pending write
    /// and keeps the originally loaded version as the concurrency check.
    /// Staging with no events is a no-op.
    pub fn stage<A: Aggregate>(
        &mut self,
        aggregate: &mut A,
        events: Vec<A::Event>,
    ) -> Result<(), DomainError> {
        if events.is_empty() {
            return Ok(());
        }

        let payloads = events
            .iter()
            .map(|event| serde_json::to_value(event).map(|payload| (event.event_type(), payload)))
            .collect::<Result<Vec<_>, _>>()?;

        aggregate.apply_events(events);
        let aggregate_id = aggregate.id().ok_or_else(|| {
            DomainError::Validation(format!(
                "{} has no id after applying its events",
                A::aggregate_type()
            ))
        })?;

        let expected_version = self
            .pending_expected_version(aggregate_id)
            .unwrap_or_else(|| aggregate.version());
        let version = expected_version.next();
        aggregate.set_version(version);

        let record =
            AggregateRecord::from_state(aggregate_id, A::aggregate_type(), version, &*aggregate)?;
        self.changes
            .writes
            .retain(|write| write.record.aggregate_id != aggregate_id);
        self.changes
            .checks
            .retain(|check| check.aggregate_id != aggregate_id);
        self.changes.writes.push(AggregateWrite {
            record,
            expected_version,
        });

        for (event_type, payload) in payloads {
            let mut builder = OutboxEntry::builder()
                .aggregate_id(aggregate_id)
                .aggregate_type(A::aggregate_type())
                .event_type(event_type)
                .payload_raw(payload)
                .metadata("aggregate_version", serde_json::json!(version.as_i64()));
            if let Some(ref correlation_id) = self.correlation_id {
                builder = builder.metadata("correlation_id", serde_json::json!(correlation_id));
            }
            let entry = builder.try_build().ok_or_else(|| {
                DomainError::Validation(format!("incomplete outbox entry for {event_type}"))
            })?;
            self.changes.outbox.push(entry);
        }

        Ok(())
    }

    /// Makes the commit depend on `aggregate` still being at the version it
    /// was loaded at, without rewriting it.
    pub fn depend_on<A: Aggregate>(&mut self, aggregate: &A) {
        self.push_check(aggregate, false);
    }

    /// Like [`depend_on`](Self::depend_on), but also advances the stored
    /// version, so anyone who loaded the aggregate before this commit conflicts.
    pub fn touch<A: Aggregate>(&mut self, aggregate: &A) {
        self.push_check(aggregate, true);
    }

    /// Claims a unique value for `owner` as part of this commit.
    pub fn claim_key(&mut self, scope: &str, value: &str, owner: AggregateId) {
        self.changes
            .claimed_keys
            .push(UniqueKey::new(scope, value, owner));
    }

    /// Releases a unique value `owner` holds, as part of this commit.
    pub fn release_key(&mut self, scope: &str, value: &str, owner: AggregateId) {
        self.changes
            .released_keys
            .push(UniqueKey::new(scope, value, owner));
    }

    /// Number of events staged so far.
    pub fn staged_events(&self) -> usize {
        self.changes.outbox.len()
    }

    /// Number of aggregates staged so far.
    pub fn staged_aggregates(&self) -> usize {
        self.changes.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Commits every staged change in one atomic store call.
    ///
    /// Returns the number of events written to the outbox. A version or
    /// unique-key clash rejects the whole set with a conflict.
    pub async fn save_changes(self) -> Result<usize, DomainError> {
        if self.changes.is_empty() {
            return Ok(0);
        }
        let events = self.changes.outbox.len();
        self.store.commit(self.changes).await?;
        tracing::debug!(events, "unit of work committed");
        Ok(events)
    }

    fn push_check<A: Aggregate>(&mut self, aggregate: &A, bump: bool) {
        let Some(aggregate_id) = aggregate.id() else {
            return;
        };
        if self.pending_expected_version(aggregate_id).is_some() {
            return;
        }
        match self
            .changes
            .checks
            .iter_mut()
            .find(|check| check.aggregate_id == aggregate_id)
        {
            Some(check) => check.bump |= bump,
            None => self.changes.checks.push(VersionCheck {
                aggregate_id,
                expected_version: aggregate.version(),
                bump,
            }),
        }
    }

    fn pending_expected_version(&self, aggregate_id: AggregateId) -> Option<Version> {
        self.changes
            .writes
            .iter()
            .find(|write| write.record.aggregate_id == aggregate_id)
            .map(|write| write.expected_version)
    }
}
