//! API server entry point.

use std::sync::Arc;
use std::time::Duration;

use api::config::{Config, LogFormat};
use api::{AppState, SharedStore};
use cache::InMemoryCache;
use store::{InMemoryStore, PostgresStore};
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const CACHE_PURGE_INTERVAL: Duration = Duration::from_secs(60);

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn open_store(config: &Config) -> SharedStore {
    match &config.database_url {
        Some(url) => {
            let store = PostgresStore::connect(url)
                .await
                .expect("failed to connect to PostgreSQL");
            store
                .run_migrations()
                .await
                .expect("failed to run migrations");
            tracing::info!("using PostgreSQL store");
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store");
            Arc::new(InMemoryStore::new())
        }
    }
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // 1. Initialize tracing
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Store, cache and application state
    let store = open_store(&config).await;
    let cache = InMemoryCache::with_default_ttl(config.cache_ttl);
    let state = Arc::new(AppState::new(store, Arc::new(cache.clone()), &config));

    // 4. Background tasks: outbox dispatcher and cache expiry
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let dispatcher = state.dispatcher.clone();
    let dispatcher_task = tokio::spawn(async move { dispatcher.run(shutdown_rx).await });

    let mut purge_shutdown = shutdown_tx.subscribe();
    let purge_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(CACHE_PURGE_INTERVAL);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let purged = cache.purge_expired().await;
                    if purged > 0 {
                        tracing::debug!(purged, "expired cache entries purged");
                    }
                }
                _ = purge_shutdown.changed() => break,
            }
        }
    });

    // 5. Build the application
    let app = api::create_app(state, metrics_handle);

    // 6. Start server
    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    // 7. Stop background tasks; claimed but unfinished entries are picked up
    //    again after their visibility timeout.
    let _ = shutdown_tx.send(true);
    if let Err(e) = dispatcher_task.await {
        tracing::error!(error = %e, "outbox dispatcher task failed");
    }
    let _ = purge_task.await;

    tracing::info!("server shut down gracefully");
}
