// ============================================================================
// portfolio-api
// ============================================================================
//
// Backend for a personal portfolio site:
// - Blog posts, projects and the about profile (public reads, scoped writes)
// - Contact form and newsletter subscriptions
// - Appointment slots, availability and booking
//
// Everything persists in MySQL behind a circuit breaker and a retrying
// query executor; `/api/*` is rate limited per client IP.
//
// ============================================================================

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod auth;
pub mod availability;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod metrics;
pub mod pagination;
pub mod rate_limit;
pub mod routes;
pub mod utils;

use config::{Config, LogFormat};
use context::AppContext;
use db::DatabaseManager;

pub use routes::create_router;

/// Install the global tracing subscriber (text or JSON lines).
pub fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_new(&config.rust_log)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    match config.logging.format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(false))
            .init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Connect, migrate, serve until Ctrl-C / SIGTERM, then shut down cleanly.
pub async fn run(config: Config) -> Result<()> {
    let config = Arc::new(config);

    info!("=== Portfolio API Starting ===");
    info!("Bind address: {}", config.bind_address);

    info!("Connecting to database...");
    let db = Arc::new(
        DatabaseManager::connect(config.db.clone(), config.circuit_breaker.clone())
            .await
            .context("Failed to connect to database")?,
    );
    info!("Connected to database");

    info!("Applying database migrations...");
    db.migrate().await?;

    let app_context = Arc::new(AppContext::new(Arc::clone(&db), Arc::clone(&config)));

    let health_monitor = db.spawn_health_monitor();
    let cleanup_task = app_context.rate_limiter.spawn_cleanup_task();

    let app = create_router(Arc::clone(&app_context));

    let addr: SocketAddr = config
        .bind_address
        .parse()
        .context("Failed to parse bind address")?;
    let listener = TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;
    info!("Portfolio API listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    info!("Shutting down background tasks...");
    health_monitor.abort();
    cleanup_task.abort();
    db.close().await;
    info!("Shutdown complete");

    Ok(())
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
