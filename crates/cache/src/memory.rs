//! In-memory cache with per-entry expiry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::cache::Cache;
use crate::error::Result;
use crate::pattern::KeyPattern;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| now < at)
    }
}

/// Cache backed by a shared map.
///
/// Expired entries read as misses and are dropped on the next write or
/// eviction pass. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCache {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
    default_ttl: Option<Duration>,
}

impl InMemoryCache {
    /// Creates a cache whose entries never expire unless a TTL is given.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a cache applying `ttl` to entries stored without one.
    pub fn with_default_ttl(ttl: Duration) -> Self {
        Self {
            default_ttl: Some(ttl),
            ..Self::default()
        }
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|e| e.is_live(now))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drops expired entries. Returns how many were dropped.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| e.is_live(now));
        before - entries.len()
    }
}

#[async_trait]
impl Cache for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = Instant::now();
        Ok(self
            .entries
            .read()
            .await
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<()> {
        let now = Instant::now();
        let expires_at = ttl.or(self.default_ttl).map(|ttl| now + ttl);
        let mut entries = self.entries.write().await;
        entries.retain(|_, e| e.is_live(now));
        entries.insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        let now = Instant::now();
        Ok(self
            .entries
            .write()
            .await
            .remove(key)
            .is_some_and(|e| e.is_live(now)))
    }

    async fn remove_by_pattern(&self, pattern: &str) -> Result<usize> {
        let pattern = KeyPattern::parse(pattern)?;
        let now = Instant::now();
        let mut entries = self.entries.write().await;

        let mut removed = 0;
        entries.retain(|key, entry| {
            if !entry.is_live(now) {
                return false;
            }
            if pattern.matches(key) {
                removed += 1;
                return false;
            }
            true
        });

        tracing::trace!(removed, "cache entries evicted by pattern");
        Ok(removed)
    }
}
