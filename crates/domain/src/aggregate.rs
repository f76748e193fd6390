//! Core aggregate and domain event traits.

use common::AggregateId;
use serde::{Serialize, de::DeserializeOwned};
use store::{AggregateRecord, Version};

/// Trait for domain events.
///
/// Domain events represent facts that have happened in the domain.
/// They are immutable and should be named in past tense.
pub trait DomainEvent: Serialize + DeserializeOwned + Send + Sync + Clone {
    /// Returns the event type name.
    ///
    /// Outbox handlers are routed on this value.
    fn event_type(&self) -> &'static str;
}

/// Trait for state-stored aggregates.
///
/// Command methods take `&self`, validate the aggregate's invariants and
/// return the events the command raises. The caller applies those events,
/// which is the only way the state changes, then stages the aggregate in a
/// [`UnitOfWork`](crate::UnitOfWork) so the new state and the events are
/// committed together.
pub trait Aggregate: Default + Serialize + DeserializeOwned + Send + Sync + Sized {
    /// The type of events this aggregate produces and consumes.
    type Event: DomainEvent;

    /// The type of errors this aggregate can produce.
    type Error: std::error::Error + Send + Sync;

    /// Returns the aggregate type name stored alongside the record.
    fn aggregate_type() -> &'static str;

    /// Returns the aggregate's unique identifier.
    ///
    /// Returns None for a new, uninitialized aggregate.
    fn id(&self) -> Option<AggregateId>;

    /// Returns the row version the aggregate was loaded at.
    fn version(&self) -> Version;

    /// Sets the row version.
    fn set_version(&mut self, version: Version);

    /// Applies an event to the aggregate, updating its state.
    ///
    /// Must be deterministic and must not fail: events are facts.
    fn apply(&mut self, event: Self::Event);

    /// Applies multiple events in sequence.
    fn apply_events(&mut self, events: impl IntoIterator<Item = Self::Event>) {
        for event in events {
            self.apply(event);
        }
    }

    /// Rebuilds an aggregate from its stored record.
    fn from_record(record: AggregateRecord) -> Result<Self, serde_json::Error> {
        let version = record.version;
        let mut aggregate: Self = record.into_state()?;
        aggregate.set_version(version);
        Ok(aggregate)
    }
}
