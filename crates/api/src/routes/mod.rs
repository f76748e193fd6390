//! Route handlers, one module per resource.

pub mod carts;
pub mod categories;
pub mod health;
pub mod metrics;
pub mod outbox;

use std::future::Future;

use cache::CacheExt;
use common::AggregateId;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::AppState;
use crate::error::ApiError;

pub(crate) fn parse_aggregate_id(raw: &str) -> Result<AggregateId, ApiError> {
    AggregateId::parse(raw).map_err(|e| ApiError::BadRequest(format!("Invalid id '{raw}': {e}")))
}

/// Serves `key` from the cache, or loads it and populates the cache with the
/// configured TTL. Cache failures degrade to a plain load.
pub(crate) async fn read_through<T, F, Fut>(
    state: &AppState,
    key: &str,
    load: F,
) -> Result<Option<T>, ApiError>
where
    T: Serialize + DeserializeOwned + Send + Sync,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Option<T>, ApiError>>,
{
    match state.cache.get_json::<T>(key).await {
        Ok(Some(hit)) => {
            ::metrics::counter!("cache_reads_total", "outcome" => "hit").increment(1);
            return Ok(Some(hit));
        }
        Ok(None) => {
            ::metrics::counter!("cache_reads_total", "outcome" => "miss").increment(1);
        }
        Err(e) => {
            ::metrics::counter!("cache_reads_total", "outcome" => "error").increment(1);
            tracing::warn!(key, error = %e, "cache read failed, loading from store");
        }
    }

    let value = load().await?;
    if let Some(value) = &value
        && let Err(e) = state.cache.set_json(key, value, Some(state.cache_ttl)).await
    {
        tracing::warn!(key, error = %e, "cache write failed");
    }
    Ok(value)
}
