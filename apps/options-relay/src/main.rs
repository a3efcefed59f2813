//! Options Relay Binary
//!
//! Connects to the ingestion sink and forwards simulated option market ticks
//! until interrupted.
//!
//! # Environment Variables
//!
//! - `RELAY_SINK_URL`: Sink WebSocket URL (default: ws://localhost:8080/ingest)
//! - `ORCH_WS_SINK`: Legacy name for `RELAY_SINK_URL`
//! - `RELAY_RECONNECT_DELAY_MS`: Delay before reconnecting (default: 5000)
//! - `RELAY_CONNECT_TIMEOUT_MS`: Connection attempt timeout (default: 10000)
//! - `RELAY_PRIMARY_CADENCE_MS`: Zeta tick cadence (default: 5000)
//! - `RELAY_SECONDARY_CADENCE_MS`: PsyOptions tick cadence (default: 7000)
//! - `RUST_LOG`: Log filter (default: `options_relay=info`)

use options_relay::{RelayClient, RelayConfig, RelayStatus};
use tokio::signal;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

const STATUS_CHANNEL_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Already installed is fine.
    let _ = rustls::crypto::ring::default_provider().install_default();

    load_dotenv();
    init_tracing();

    let config = RelayConfig::from_env();
    tracing::info!(
        sink = %config.sink_url,
        reconnect_delay_ms = config.reconnect.delay.as_millis(),
        primary_cadence_ms = config.primary_cadence.as_millis(),
        secondary_cadence_ms = config.secondary_cadence.as_millis(),
        "Configuration loaded"
    );

    let (status_tx, mut status_rx) = mpsc::channel(STATUS_CHANNEL_CAPACITY);
    let client = RelayClient::new(config, status_tx);

    let status_task = tokio::spawn(async move {
        while let Some(status) = status_rx.recv().await {
            match status {
                RelayStatus::Control(message) => {
                    tracing::info!(message_type = %message.message_type, "Control message");
                }
                RelayStatus::Dropped { source, count } => {
                    tracing::debug!(source, count, "Ticks dropped");
                }
                other => tracing::debug!(status = ?other, "Relay status"),
            }
        }
    });

    client.start();

    await_shutdown().await;

    client.stop().await;
    drop(client);
    let _ = status_task.await;

    tracing::info!("Options relay stopped");
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("options_relay=info,tungstenite=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for SIGTERM or SIGINT.
async fn await_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        () = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
