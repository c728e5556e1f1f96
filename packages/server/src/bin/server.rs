//! Agent Chat Server
//!
//! Serves the chat API over HTTP with the demo conversation engine and an
//! in-memory session store.

use agent_core::kernel::ServerDeps;
use agent_core::server::{build_app, AxumAppState};
use agent_core::Config;
use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "info,agent_core=debug,session_lane=debug,tower_http=info".into()
            }),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_line_number(true),
        )
        .init();

    tracing::info!("Starting Agent Chat Server");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!(
        max_hold_secs = config.max_hold.map(|d| d.as_secs()),
        keep_alive_secs = config.keep_alive.as_secs(),
        origins = config.allowed_origins.len(),
        "Configuration loaded"
    );

    let addr = config.bind_addr();
    let shutdown = CancellationToken::new();
    let deps = ServerDeps::demo(&config);
    let app = build_app(AxumAppState::new(config, deps, shutdown.clone()));

    tracing::info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
        .context("Server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Resolves on Ctrl-C, after cancelling every in-flight session so open
/// streams end and the server can drain.
async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, cancelling in-flight sessions");
    shutdown.cancel();
}
