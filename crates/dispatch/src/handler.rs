//! Event handler trait.

use async_trait::async_trait;
use store::OutboxEntry;

use crate::error::HandlerError;

/// A side effect run for outbox entries of the event types it is registered
/// for.
///
/// Delivery is at-least-once: a handler may see the same entry again after a
/// crash or a failure of another handler, so it must be idempotent.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Returns the name of this handler, used in logs and metrics.
    fn name(&self) -> &'static str;

    /// Handles one entry. An error schedules a retry of the whole entry.
    async fn handle(&self, entry: &OutboxEntry) -> Result<(), HandlerError>;
}
