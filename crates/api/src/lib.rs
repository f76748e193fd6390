//! HTTP API server for the catalog backend.
//!
//! Provides REST endpoints for the category hierarchy, carts and outbox
//! administration, with structured logging (tracing) and Prometheus metrics.
//! The outbox dispatcher shares the application state and runs as a
//! background task next to the server.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::{get, post, put};
use cache::Cache;
use dispatch::{OutboxDispatcher, invalidation_handlers};
use domain::{CartService, CategoryService, HierarchyReconciler};
use metrics_exporter_prometheus::PrometheusHandle;
use store::Store;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;

/// Store handle shared by every service: PostgreSQL or in-memory.
pub type SharedStore = Arc<dyn Store>;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub store: SharedStore,
    pub categories: CategoryService<SharedStore>,
    pub carts: CartService<SharedStore>,
    pub reconciler: HierarchyReconciler<SharedStore>,
    pub dispatcher: Arc<OutboxDispatcher<SharedStore>>,
    pub cache: Arc<dyn Cache>,
    /// TTL of read-through cache entries.
    pub cache_ttl: Duration,
}

impl AppState {
    /// Wires the services and a dispatcher with the cache invalidation
    /// handlers registered.
    pub fn new(store: SharedStore, cache: Arc<dyn Cache>, config: &Config) -> Self {
        let mut dispatcher = OutboxDispatcher::new(store.clone(), config.dispatcher.clone());
        dispatcher.register_all(invalidation_handlers(cache.clone()));

        Self {
            categories: CategoryService::new(store.clone()),
            carts: CartService::new(store.clone()),
            reconciler: HierarchyReconciler::new(store.clone()),
            dispatcher: Arc::new(dispatcher),
            store,
            cache,
            cache_ttl: config.cache_ttl,
        }
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route(
            "/categories",
            post(routes::categories::create).get(routes::categories::list),
        )
        .route(
            "/categories/reconcile",
            post(routes::categories::reconcile),
        )
        .route(
            "/categories/{id}",
            get(routes::categories::get).put(routes::categories::update),
        )
        .route(
            "/categories/{id}/parent",
            put(routes::categories::change_parent),
        )
        .route(
            "/categories/by-slug/{slug}",
            get(routes::categories::get_by_slug),
        )
        .route("/categories/{id}/slug", put(routes::categories::change_slug))
        .route(
            "/categories/{id}/status",
            put(routes::categories::change_status),
        )
        .route("/carts", post(routes::carts::create))
        .route("/carts/{id}", get(routes::carts::get))
        .route("/carts/{id}/items", post(routes::carts::add_item))
        .route("/users/{user_id}/carts", get(routes::carts::for_user))
        .route("/outbox/failed", get(routes::outbox::failed))
        .route("/outbox/{id}/retry", post(routes::outbox::retry))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
