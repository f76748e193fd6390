//! Outbox administration: inspect and requeue parked entries.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::{Deserialize, Serialize};
use store::{EntryId, OutboxEntry};

use crate::AppState;
use crate::error::ApiError;

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 500;

#[derive(Deserialize)]
pub struct FailedQuery {
    pub limit: Option<usize>,
}

#[derive(Serialize)]
pub struct RetryResponse {
    pub entry_id: EntryId,
    pub requeued: bool,
}

/// GET /outbox/failed?limit=: entries that exhausted their attempts.
#[tracing::instrument(skip(state, query))]
pub async fn failed(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FailedQuery>,
) -> Result<Json<Vec<OutboxEntry>>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let entries = state.dispatcher.failed_entries(limit).await?;
    Ok(Json(entries))
}

/// POST /outbox/{id}/retry: requeue a failed entry with a fresh attempt budget.
#[tracing::instrument(skip(state))]
pub async fn retry(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<RetryResponse>, ApiError> {
    let entry_id = uuid::Uuid::parse_str(&id)
        .map(EntryId::from_uuid)
        .map_err(|e| ApiError::BadRequest(format!("Invalid entry id '{id}': {e}")))?;

    if !state.dispatcher.retry_failed(entry_id).await? {
        return Err(ApiError::Conflict(format!(
            "Outbox entry {entry_id} is not in the failed state"
        )));
    }

    Ok(Json(RetryResponse {
        entry_id,
        requeued: true,
    }))
}
