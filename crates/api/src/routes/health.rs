//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Serialize;
use store::{OutboxStats, Store};

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// Absent when the store could not be reached.
    pub outbox: Option<OutboxStats>,
}

/// GET /health: reports store reachability and outbox backlog.
pub async fn check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    match state.store.outbox_stats().await {
        Ok(stats) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok",
                outbox: Some(stats),
            }),
        ),
        Err(e) => {
            tracing::error!(error = %e, "health check could not reach the store");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "unavailable",
                    outbox: None,
                }),
            )
        }
    }
}
