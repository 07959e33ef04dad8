//! # linkup-server
//!
//! HTTP host for LinkUp Bluetooth presence tracking.
//!
//! This binary provides:
//! - A presence tracker fed by the local Bluetooth host
//! - REST and server-sent event access to its state
//! - OpenAPI documentation via Swagger UI
//! - Structured logging to file and stdout
//!
//! ## Running
//!
//! ```bash
//! # Development
//! cargo run --package linkup-server
//!
//! # Without a radio
//! cargo run --package linkup-server --no-default-features --features mock-bluetooth
//!
//! # Custom configuration file
//! LINKUP_CONFIG=./linkup.toml ./linkup-server
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use linkup_core::{AdapterControl, EventSource, LinkupConfig, PresenceTracker, TrackerConfig};
use linkup_server::api;
use linkup_server::logging;
use linkup_server::state::{AppState, SharedState};
use tokio::net::TcpListener;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::var_os("LINKUP_CONFIG").map(PathBuf::from);
    let config = LinkupConfig::load(config_path.as_deref())
        .context("Failed to load configuration")?;

    logging::init(&config.logging)?;
    info!(version = env!("CARGO_PKG_VERSION"), "Starting linkup-server");

    let (source, control) = host_backend(&config.tracker);
    let tracker = PresenceTracker::builder(source, control)
        .with_config(&config.tracker)
        .build();
    if config.tracker.autostart {
        tracker.start();
    }

    let listener = TcpListener::bind((config.server.host.as_str(), config.server.port))
        .await
        .with_context(|| {
            format!(
                "Failed to bind {}:{}",
                config.server.host, config.server.port
            )
        })?;
    info!("Listening on {}", listener.local_addr()?);

    let state = AppState::new(config, tracker.clone()).shared();
    let app = api::create_app(state.clone());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await?;

    tracker.stop();
    info!("linkup-server stopped");

    Ok(())
}

#[cfg(feature = "bluetooth")]
fn host_backend(config: &TrackerConfig) -> (Arc<dyn EventSource>, Arc<dyn AdapterControl>) {
    use linkup_core::{BluezAdapterControl, BluezEventSource};

    info!(adapter = ?config.adapter, "Using BlueZ host");
    (
        Arc::new(BluezEventSource::new(config.adapter.clone())),
        Arc::new(BluezAdapterControl::new(config.adapter.clone())),
    )
}

#[cfg(not(feature = "bluetooth"))]
fn host_backend(_config: &TrackerConfig) -> (Arc<dyn EventSource>, Arc<dyn AdapterControl>) {
    use linkup_core::{MockAdapterControl, MockEventSource};

    warn!("Built without Bluetooth support, using an in-memory host");
    (
        Arc::new(MockEventSource::new()),
        Arc::new(MockAdapterControl::accepting()),
    )
}

/// Resolves on Ctrl-C and tells open event streams to finish.
async fn shutdown_signal(state: SharedState) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "Failed to listen for Ctrl-C, shutting down");
    }
    info!("Shutdown requested");
    state.begin_shutdown();
}
