//! Chain Stream Binary
//!
//! Subscribes to a list of instruments, logs every snapshot it receives and
//! serves health and metrics until interrupted.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin chain-stream
//! ```
//!
//! # Environment Variables
//!
//! - `CHAIN_STREAM_PUSH_BASE`: Push tier base URL (default: ws://127.0.0.1:8080)
//! - `CHAIN_STREAM_POLL_BASE`: Poll tier base URL (default: <http://127.0.0.1:8080>)
//! - `CHAIN_STREAM_POLL_INTERVAL_MS`: Poll interval (default: 3000)
//! - `CHAIN_STREAM_SYNTHETIC_INTERVAL_MS`: Synthetic interval (default: 1500)
//! - `CHAIN_STREAM_REQUEST_TIMEOUT_MS`: Poll request timeout (default: 2500)
//! - `CHAIN_STREAM_CONNECT_TIMEOUT_MS`: Push handshake timeout (default: 5000)
//! - `CHAIN_STREAM_HEALTH_PORT`: Health check HTTP port, 0 disables (default: 8083)
//! - `CHAIN_STREAM_INSTRUMENTS`: Comma separated instruments (default: BTC)
//! - `OTEL_ENABLED`: Export spans over OTLP (default: false)
//! - `RUST_LOG`: Log filter (default: chain_stream=info)

use std::sync::Arc;
use std::time::Duration;

use chain_stream::infrastructure::health::{HealthServer, HealthServerState};
use chain_stream::infrastructure::telemetry;
use chain_stream::{FeedController, ServiceConfig, Snapshot, init_metrics};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Grace period for background tasks after shutdown is requested.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(250);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Already installed is fine.
    let _ = rustls::crypto::ring::default_provider().install_default();

    load_dotenv();

    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting chain stream");

    if let Err(e) = init_metrics() {
        tracing::warn!(error = %e, "Metrics recorder unavailable");
    }

    let config = ServiceConfig::from_env();
    log_config(&config);

    let shutdown_token = CancellationToken::new();
    let controller = FeedController::new(&config.feed)?;

    let handles: Vec<_> = config
        .instruments
        .iter()
        .map(|instrument| controller.subscribe(instrument.clone(), log_snapshot))
        .collect();

    if config.server.health_port == 0 {
        tracing::info!("Health server disabled");
    } else {
        let health_state = Arc::new(HealthServerState::new(
            env!("CARGO_PKG_VERSION").to_string(),
            controller.clone(),
        ));
        let health_server = HealthServer::new(
            config.server.health_port,
            health_state,
            shutdown_token.clone(),
        );

        tokio::spawn(async move {
            if let Err(e) = health_server.run().await {
                tracing::error!(error = %e, "Health server error");
            }
        });
    }

    tracing::info!(subscriptions = handles.len(), "Chain stream ready");

    await_shutdown(shutdown_token).await;

    controller.unsubscribe_all();
    tokio::time::sleep(SHUTDOWN_GRACE).await;

    tracing::info!("Chain stream stopped");
    Ok(())
}

fn log_snapshot(snapshot: Snapshot) {
    let atm = snapshot.rows.get(snapshot.len() / 2);
    tracing::info!(
        instrument = %snapshot.instrument_key,
        expiry = %snapshot.expiry_label,
        rows = snapshot.len(),
        live = snapshot.is_live,
        mid_strike = atm.map(|r| r.strike),
        mid_call_iv = atm.map(|r| r.call_iv),
        "Snapshot"
    );
}

/// Log the parsed configuration.
fn log_config(config: &ServiceConfig) {
    tracing::info!(
        push_base = %config.feed.push_base,
        poll_base = %config.feed.poll_base,
        poll_interval_ms = config.feed.poll_interval.as_millis(),
        synthetic_interval_ms = config.feed.synthetic_interval.as_millis(),
        connect_timeout_ms = config.feed.connect_timeout.as_millis(),
        health_port = config.server.health_port,
        instruments = ?config.instruments,
        "Configuration loaded"
    );
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

/// Wait for shutdown signal (SIGTERM or SIGINT).
async fn await_shutdown(shutdown_token: CancellationToken) {
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
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();
}
