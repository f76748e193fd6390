//! The cache port.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::Result;

/// Async key/value cache holding serialized values.
///
/// Both removal operations are idempotent: evicting a key that is not present
/// succeeds and reports nothing removed.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Stores a value. `ttl` of None uses the cache's default expiry.
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<()>;

    /// Removes one key. Returns whether it was present.
    async fn remove(&self, key: &str) -> Result<bool>;

    /// Removes every key matching a glob pattern (`*` matches any run of
    /// characters). Returns the number of keys removed.
    async fn remove_by_pattern(&self, pattern: &str) -> Result<usize>;
}

#[async_trait]
impl<T: Cache + ?Sized> Cache for Arc<T> {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<()> {
        (**self).set(key, value, ttl).await
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        (**self).remove(key).await
    }

    async fn remove_by_pattern(&self, pattern: &str) -> Result<usize> {
        (**self).remove_by_pattern(pattern).await
    }
}

/// Typed helpers on top of [`Cache`].
#[async_trait]
pub trait CacheExt: Cache {
    /// Reads and decodes a JSON value.
    async fn get_json<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn set_json<T: Serialize + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.set(key, raw, ttl).await
    }
}

impl<C: Cache + ?Sized> CacheExt for C {}
