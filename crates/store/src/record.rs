use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AggregateId, Version};

/// The persisted state of one aggregate at a specific row version.
///
/// Aggregates are stored whole, as a JSON document. The version is bumped on
/// every commit and checked on the next one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateRecord {
    /// The aggregate this record belongs to.
    pub aggregate_id: AggregateId,

    /// The type of aggregate (e.g., "Category", "Cart").
    pub aggregate_type: String,

    /// The row version after the commit that wrote this record.
    pub version: Version,

    /// When the record was last written.
    pub updated_at: DateTime<Utc>,

    /// The serialized aggregate state.
    pub state: serde_json::Value,
}

impl AggregateRecord {
    /// Creates a record from raw JSON state.
    pub fn new(
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        version: Version,
        state: serde_json::Value,
    ) -> Self {
        Self {
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            version,
            updated_at: Utc::now(),
            state,
        }
    }

    /// Creates a record from a serializable state.
    pub fn from_state<T: Serialize>(
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        version: Version,
        state: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(
            aggregate_id,
            aggregate_type,
            version,
            serde_json::to_value(state)?,
        ))
    }

    /// Deserializes the record state into a concrete type.
    pub fn into_state<T: for<'de> Deserialize<'de>>(self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.state)
    }

    /// Reads a top-level field of the state, treating a missing field as null.
    pub fn field(&self, name: &str) -> &serde_json::Value {
        self.state.get(name).unwrap_or(&serde_json::Value::Null)
    }
}
