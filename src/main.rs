//! webhook-relay server entry point.
//!
//! Starts the Axum HTTP server and the client-pool sweepers, and drains
//! both on Ctrl-C.

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use webhook_relay::api;
use webhook_relay::app_state::AppState;
use webhook_relay::config::{LogFormat, RelayConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config =
        RelayConfig::from_env().map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }

    tracing::info!(addr = %config.listen_addr, "starting webhook-relay");
    let listen_addr = config.listen_addr;

    let state = AppState::from_config(config)
        .await
        .context("failed to initialize channel store")?;

    let sweeper_cancel = CancellationToken::new();
    let sweepers = state.spawn_sweepers(&sweeper_cancel);
    let shutdown = state.shutdown.clone();

    let app = api::build_app(state);

    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind {listen_addr}"))?;
    tracing::info!(addr = %listen_addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
            }
            tracing::info!("shutdown requested");
            shutdown.cancel();
        })
        .await?;

    // Drain pooled writers so buffered telemetry is flushed.
    sweeper_cancel.cancel();
    for sweeper in sweepers {
        if let Err(e) = sweeper.await {
            tracing::warn!(error = %e, "pool sweeper failed");
        }
    }
    tracing::info!("webhook-relay stopped");

    Ok(())
}
