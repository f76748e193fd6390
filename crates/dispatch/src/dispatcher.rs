//! Outbox dispatcher: delivers committed events to their handlers.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use store::{EntryId, OutboxEntry, OutboxStatus, Store};
use tokio::sync::watch;

use crate::Result;
use crate::config::DispatcherConfig;
use crate::error::HandlerError;
use crate::handler::EventHandler;

/// Outcome counts of one [`OutboxDispatcher::dispatch_batch`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    /// Entries claimed from the store.
    pub claimed: usize,

    /// Entries whose handlers all succeeded (or that had none).
    pub dispatched: usize,

    /// Entries that failed and were scheduled for another attempt.
    pub retried: usize,

    /// Entries that failed for the last time and are now parked.
    pub parked: usize,

    /// Entries handed back unprocessed because an earlier entry of the same
    /// aggregate failed in this batch.
    pub released: usize,
}

/// Polls the outbox and runs the registered handlers for each entry.
///
/// Delivery is at-least-once: an entry is marked dispatched only after every
/// handler for its event type succeeded, so a crash in between means the
/// handlers run again once the claim's visibility timeout lapses.
pub struct OutboxDispatcher<S: Store> {
    store: S,
    handlers: HashMap<String, Vec<Arc<dyn EventHandler>>>,
    config: DispatcherConfig,
}

impl<S: Store> OutboxDispatcher<S> {
    pub fn new(store: S, config: DispatcherConfig) -> Self {
        Self {
            store,
            handlers: HashMap::new(),
            config,
        }
    }

    /// Registers a handler for one event type.
    pub fn register(&mut self, event_type: impl Into<String>, handler: Arc<dyn EventHandler>) {
        self.handlers
            .entry(event_type.into())
            .or_default()
            .push(handler);
    }

    pub fn register_all(
        &mut self,
        handlers: impl IntoIterator<Item = (&'static str, Arc<dyn EventHandler>)>,
    ) {
        for (event_type, handler) in handlers {
            self.register(event_type, handler);
        }
    }

    /// Returns the number of registered handlers across all event types.
    pub fn handler_count(&self) -> usize {
        self.handlers.values().map(Vec::len).sum()
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Claims one batch of pending entries and delivers them in sequence
    /// order.
    #[tracing::instrument(skip(self))]
    pub async fn dispatch_batch(&self) -> Result<BatchReport> {
        let started = Instant::now();
        let entries = self
            .store
            .claim_pending(self.config.batch_size, self.config.visibility_timeout)
            .await?;

        let mut report = BatchReport {
            claimed: entries.len(),
            ..Default::default()
        };
        let mut blocked = HashSet::new();

        for entry in entries {
            if blocked.contains(&entry.aggregate_id) {
                self.store.release(entry.id).await?;
                report.released += 1;
                continue;
            }

            match self.deliver(&entry).await {
                Ok(()) => {
                    self.store.mark_dispatched(entry.id).await?;
                    metrics::counter!("outbox_entries_dispatched_total").increment(1);
                    report.dispatched += 1;
                }
                Err(e) => {
                    blocked.insert(entry.aggregate_id);
                    match self.record_failure(&entry, &e).await? {
                        OutboxStatus::Failed => report.parked += 1,
                        _ => report.retried += 1,
                    }
                }
            }
        }

        if report.claimed > 0 {
            metrics::histogram!("outbox_dispatch_batch_duration_seconds")
                .record(started.elapsed().as_secs_f64());
            tracing::debug!(
                claimed = report.claimed,
                dispatched = report.dispatched,
                retried = report.retried,
                parked = report.parked,
                released = report.released,
                "outbox batch processed"
            );
        }

        Ok(report)
    }

    /// Runs every handler for the entry's event type, each bounded by the
    /// handler timeout. Stops at the first failure.
    async fn deliver(&self, entry: &OutboxEntry) -> std::result::Result<(), HandlerError> {
        let Some(handlers) = self.handlers.get(&entry.event_type) else {
            tracing::trace!(event_type = %entry.event_type, "no handlers registered");
            return Ok(());
        };

        for handler in handlers {
            let outcome = tokio::time::timeout(self.config.handler_timeout, handler.handle(entry))
                .await
                .unwrap_or(Err(HandlerError::Timeout(self.config.handler_timeout)));

            if let Err(e) = outcome {
                metrics::counter!("outbox_handler_errors_total", "handler" => handler.name())
                    .increment(1);
                tracing::warn!(
                    handler = handler.name(),
                    entry_id = %entry.id,
                    event_type = %entry.event_type,
                    error = %e,
                    "outbox handler failed"
                );
                return Err(e);
            }
        }

        Ok(())
    }

    async fn record_failure(&self, entry: &OutboxEntry, error: &HandlerError) -> Result<OutboxStatus> {
        let attempts = entry.attempts.saturating_add(1);
        let backoff = chrono::Duration::from_std(self.config.backoff(attempts))
            .unwrap_or_else(|_| chrono::Duration::seconds(60));
        let status = self
            .store
            .record_failure(
                entry.id,
                &error.to_string(),
                Utc::now() + backoff,
                self.config.max_attempts,
            )
            .await?;

        if status == OutboxStatus::Failed {
            metrics::counter!("outbox_entries_failed_total", "outcome" => "parked").increment(1);
            tracing::error!(
                entry_id = %entry.id,
                aggregate_id = %entry.aggregate_id,
                event_type = %entry.event_type,
                attempts,
                "outbox entry parked after exhausting retries"
            );
        } else {
            metrics::counter!("outbox_entries_failed_total", "outcome" => "retry").increment(1);
        }
        Ok(status)
    }

    /// Dispatches batches until `shutdown` flips to true.
    ///
    /// A full batch is followed immediately by the next one; otherwise the
    /// loop sleeps for the poll interval. Store errors are logged and the
    /// loop carries on.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            handlers = self.handler_count(),
            batch_size = self.config.batch_size,
            "outbox dispatcher started"
        );

        while !*shutdown.borrow() {
            let drained = match self.dispatch_batch().await {
                Ok(report) => report.claimed < self.config.batch_size,
                Err(e) => {
                    tracing::error!(error = %e, "outbox batch failed");
                    true
                }
            };

            if drained {
                tokio::select! {
                    _ = tokio::time::sleep(self.config.poll_interval) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        }

        tracing::info!("outbox dispatcher stopped");
    }

    /// Entries parked as failed, oldest first.
    pub async fn failed_entries(&self, limit: usize) -> Result<Vec<OutboxEntry>> {
        Ok(self.store.failed_entries(limit).await?)
    }

    /// Puts a parked entry back in the queue with a fresh attempt budget.
    /// Returns false if the entry is not failed.
    #[tracing::instrument(skip(self))]
    pub async fn retry_failed(&self, id: EntryId) -> Result<bool> {
        let requeued = self.store.retry_failed(id).await?;
        if requeued {
            tracing::info!(entry_id = %id, "failed outbox entry requeued");
        }
        Ok(requeued)
    }
}
