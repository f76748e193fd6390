use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AggregateId;

/// Unique identifier for an outbox entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(Uuid);

impl EntryId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Delivery status of an outbox entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutboxStatus {
    /// Waiting to be delivered (or waiting for a retry).
    #[default]
    Pending,

    /// Every handler ran successfully.
    Dispatched,

    /// Retries exhausted; parked for operator inspection.
    Failed,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Pending => "pending",
            OutboxStatus::Dispatched => "dispatched",
            OutboxStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(OutboxStatus::Pending),
            "dispatched" => Some(OutboxStatus::Dispatched),
            "failed" => Some(OutboxStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One domain event waiting for (or done with) delivery to its handlers.
///
/// Entries are written in the same commit as the aggregate change that raised
/// the event, so an event can never be lost between the write and dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxEntry {
    pub id: EntryId,

    /// Store-assigned insertion order. Zero until committed.
    pub sequence: i64,

    /// The aggregate that raised the event.
    pub aggregate_id: AggregateId,

    /// The type of aggregate (e.g., "Category").
    pub aggregate_type: String,

    /// The type of the event (e.g., "CategoryMoved"). Handlers route on it.
    pub event_type: String,

    /// The event payload as JSON.
    pub payload: serde_json::Value,

    /// Additional metadata (correlation ids and the like).
    pub metadata: HashMap<String, serde_json::Value>,

    pub status: OutboxStatus,

    /// Number of failed delivery attempts so far.
    pub attempts: u32,

    /// Error from the most recent failed attempt.
    pub last_error: Option<String>,

    /// The entry is not claimable before this instant (retry backoff).
    pub available_at: DateTime<Utc>,

    /// Visibility timeout of the current claim, if any.
    pub locked_until: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,

    pub dispatched_at: Option<DateTime<Utc>>,
}

impl OutboxEntry {
    pub fn builder() -> OutboxEntryBuilder {
        OutboxEntryBuilder::default()
    }

    /// True if a dispatcher may claim this entry at `now`.
    pub fn is_claimable(&self, now: DateTime<Utc>) -> bool {
        self.status == OutboxStatus::Pending
            && self.available_at <= now
            && self.locked_until.is_none_or(|until| until <= now)
    }
}

/// Builder for outbox entries.
#[derive(Debug, Default)]
pub struct OutboxEntryBuilder {
    id: Option<EntryId>,
    aggregate_id: Option<AggregateId>,
    aggregate_type: Option<String>,
    event_type: Option<String>,
    payload: Option<serde_json::Value>,
    metadata: HashMap<String, serde_json::Value>,
    created_at: Option<DateTime<Utc>>,
}

impl OutboxEntryBuilder {
    /// Sets the entry ID. If not set, a new ID will be generated.
    pub fn id(mut self, id: EntryId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn aggregate_id(mut self, id: AggregateId) -> Self {
        self.aggregate_id = Some(id);
        self
    }

    pub fn aggregate_type(mut self, aggregate_type: impl Into<String>) -> Self {
        self.aggregate_type = Some(aggregate_type.into());
        self
    }

    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    /// Sets the payload from a serializable value.
    pub fn payload<T: Serialize>(mut self, payload: &T) -> Result<Self, serde_json::Error> {
        self.payload = Some(serde_json::to_value(payload)?);
        Ok(self)
    }

    /// Sets the payload from a raw JSON value.
    pub fn payload_raw(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Builds a pending entry, returning None if a required field is missing.
    pub fn try_build(self) -> Option<OutboxEntry> {
        let created_at = self.created_at.unwrap_or_else(Utc::now);
        Some(OutboxEntry {
            id: self.id.unwrap_or_default(),
            sequence: 0,
            aggregate_id: self.aggregate_id?,
            aggregate_type: self.aggregate_type?,
            event_type: self.event_type?,
            payload: self.payload?,
            metadata: self.metadata,
            status: OutboxStatus::Pending,
            attempts: 0,
            last_error: None,
            available_at: created_at,
            locked_until: None,
            created_at,
            dispatched_at: None,
        })
    }

    /// Builds a pending entry.
    ///
    /// # Panics
    ///
    /// Panics if aggregate_id, aggregate_type, event_type or payload is missing.
    pub fn build(self) -> OutboxEntry {
        self.try_build()
            .expect("aggregate_id, aggregate_type, event_type and payload are required")
    }
}

/// Entry counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutboxStats {
    pub pending: u64,
    pub dispatched: u64,
    pub failed: u64,
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn entry() -> OutboxEntry {
        OutboxEntry::builder()
            .aggregate_id(AggregateId::new())
            .aggregate_type("Category")
            .event_type("CategoryCreated")
            .payload_raw(serde_json::json!({"slug": "electronics"}))
            .metadata("correlation_id", serde_json::json!("abc"))
            .build()
    }

    #[test]
    fn builder_produces_pending_entry() {
        let entry = entry();
        assert_eq!(entry.status, OutboxStatus::Pending);
        assert_eq!(entry.attempts, 0);
        assert_eq!(entry.sequence, 0);
        assert_eq!(entry.available_at, entry.created_at);
        assert_eq!(
            entry.metadata.get("correlation_id"),
            Some(&serde_json::json!("abc"))
        );
    }

    #[test]
    fn try_build_without_event_type_is_none() {
        let built = OutboxEntry::builder()
            .aggregate_id(AggregateId::new())
            .aggregate_type("Category")
            .payload_raw(serde_json::json!({}))
            .try_build();
        assert!(built.is_none());
    }

    #[test]
    fn claimability_respects_lock_and_backoff() {
        let now = Utc::now();
        let mut entry = entry();
        assert!(entry.is_claimable(now));

        entry.locked_until = Some(now + Duration::seconds(30));
        assert!(!entry.is_claimable(now));
        assert!(entry.is_claimable(now + Duration::seconds(31)));

        entry.locked_until = None;
        entry.available_at = now + Duration::seconds(5);
        assert!(!entry.is_claimable(now));

        entry.available_at = now;
        entry.status = OutboxStatus::Failed;
        assert!(!entry.is_claimable(now));
    }

    #[test]
    fn status_text_round_trip() {
        for status in [
            OutboxStatus::Pending,
            OutboxStatus::Dispatched,
            OutboxStatus::Failed,
        ] {
            assert_eq!(OutboxStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(OutboxStatus::parse("lost"), None);
    }
}
