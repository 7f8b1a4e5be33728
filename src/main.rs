//! Adaptive Limiter server
//!
//! 1. Load and validate configuration from the environment
//! 2. Initialize tracing
//! 3. Connect the counting store (Redis, or in-memory when unset or unreachable)
//! 4. Start the alert worker
//! 5. Serve the admin API and a rate limited health check

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{middleware, routing::get, Router};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use adaptive_limiter::adapters::alerts::{
    spawn_alert_worker, ChannelAlertPublisher, TracingAlertSink, DEFAULT_ALERT_QUEUE,
};
use adaptive_limiter::adapters::clock::SystemClock;
use adaptive_limiter::adapters::counting_store::{InMemoryCountingStore, RedisCountingStore};
use adaptive_limiter::adapters::http::{
    admin_router, rate_limit_middleware, AdminAppState, RateLimitState,
};
use adaptive_limiter::application::RateLimitEngine;
use adaptive_limiter::config::{AppConfig, RedisConfig};
use adaptive_limiter::domain::rate_limit::presets;
use adaptive_limiter::ports::CountingStore;

const ALERT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    config.validate()?;

    init_tracing(&config);

    let store = counting_store(&config.redis).await;

    let (publisher, alerts_rx) = ChannelAlertPublisher::channel(DEFAULT_ALERT_QUEUE);
    let alert_worker = spawn_alert_worker(alerts_rx, Arc::new(TracingAlertSink));

    let engine = Arc::new(
        RateLimitEngine::builder(store, Arc::new(SystemClock), config.limiter.clone())
            .alerts(Arc::new(publisher))
            .build(),
    );

    let health = Router::new()
        .route("/health", get(|| async { "ok" }))
        .layer(middleware::from_fn_with_state(
            RateLimitState::new(engine.clone(), presets::status_polling()),
            rate_limit_middleware,
        ));

    let app = Router::new()
        .merge(health)
        .nest("/admin/rate-limits", admin_router(AdminAppState { engine }))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()));

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, environment = ?config.server.environment, "Adaptive limiter listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    // Worker exits once the last publisher clone is dropped
    match tokio::time::timeout(ALERT_DRAIN_TIMEOUT, alert_worker).await {
        Ok(Err(e)) => tracing::warn!(error = %e, "Alert worker ended abnormally"),
        Err(_) => tracing::warn!("Alert worker did not drain before shutdown"),
        Ok(Ok(())) => {}
    }

    tracing::info!("Adaptive limiter stopped");
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level));

    if config.is_production() {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn counting_store(config: &RedisConfig) -> Arc<dyn CountingStore> {
    if !config.is_configured() {
        tracing::warn!("No Redis URL configured, using in-memory counting store");
        return Arc::new(InMemoryCountingStore::with_system_clock());
    }

    match RedisCountingStore::connect(config).await {
        Ok(store) => {
            tracing::info!("Using Redis counting store");
            Arc::new(store)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Redis unavailable, falling back to in-memory counting store");
            Arc::new(InMemoryCountingStore::with_system_clock())
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
