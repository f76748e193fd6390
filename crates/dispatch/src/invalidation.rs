//! Cache invalidation handlers.

use std::sync::Arc;

use async_trait::async_trait;
use cache::Cache;
use store::OutboxEntry;

use crate::error::HandlerError;
use crate::handler::EventHandler;
use crate::rules::{self, Eviction, Target};

/// Evicts the cache entries that one event type makes stale.
///
/// Cache failures and malformed payloads are logged and swallowed, so the
/// entry is always marked dispatched.
pub struct CacheInvalidationHandler {
    event_type: &'static str,
    targets: &'static [Target],
    cache: Arc<dyn Cache>,
}

impl CacheInvalidationHandler {
    pub fn new(event_type: &'static str, targets: &'static [Target], cache: Arc<dyn Cache>) -> Self {
        Self {
            event_type,
            targets,
            cache,
        }
    }

    pub fn event_type(&self) -> &'static str {
        self.event_type
    }

    async fn evict(&self, eviction: &Eviction) -> Result<usize, HandlerError> {
        let removed = match eviction {
            Eviction::Key(key) => usize::from(self.cache.remove(key).await?),
            Eviction::Pattern(pattern) => self.cache.remove_by_pattern(pattern).await?,
        };
        Ok(removed)
    }
}

/// One handler per rule in [`rules::RULES`], paired with its event type.
pub fn invalidation_handlers(
    cache: Arc<dyn Cache>,
) -> Vec<(&'static str, Arc<dyn EventHandler>)> {
    rules::RULES
        .iter()
        .map(|rule| {
            let handler: Arc<dyn EventHandler> = Arc::new(CacheInvalidationHandler::new(
                rule.event_type,
                rule.targets,
                Arc::clone(&cache),
            ));
            (rule.event_type, handler)
        })
        .collect()
}

#[async_trait]
impl EventHandler for CacheInvalidationHandler {
    fn name(&self) -> &'static str {
        "cache_invalidation"
    }

    #[tracing::instrument(skip(self, entry), fields(event_type = self.event_type, entry_id = %entry.id))]
    async fn handle(&self, entry: &OutboxEntry) -> Result<(), HandlerError> {
        let Some(data) = entry.payload.get("data") else {
            tracing::warn!("outbox payload has no data object, skipping invalidation");
            return Ok(());
        };

        for target in self.targets {
            let eviction = match target.resolve(data) {
                Ok(Some(eviction)) => eviction,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(?target, error = %e, "cannot derive cache key");
                    continue;
                }
            };

            match self.evict(&eviction).await {
                Ok(removed) => {
                    metrics::counter!("cache_invalidations_total", "outcome" => "ok").increment(1);
                    tracing::debug!(?eviction, removed, "cache evicted");
                }
                Err(e) => {
                    metrics::counter!("cache_invalidations_total", "outcome" => "error")
                        .increment(1);
                    tracing::warn!(?eviction, error = %e, "cache eviction failed");
                }
            }
        }

        Ok(())
    }
}
