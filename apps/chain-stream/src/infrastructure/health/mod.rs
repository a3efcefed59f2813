//! Health Check and Metrics Endpoint
//!
//! HTTP endpoint reporting which tier each subscription is on, plus
//! Prometheus metrics.
//!
//! # Endpoints
//!
//! - `GET /health` - JSON health status with per-subscription tiers
//! - `GET /healthz` - Liveness probe (simple OK)
//! - `GET /readyz` - Readiness probe (at least one subscription on a live tier)
//! - `GET /metrics` - Prometheus metrics in text format

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::application::services::{FeedController, SubscriptionInfo};
use crate::domain::tier::Tier;
use crate::infrastructure::metrics::get_metrics_handle;

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status.
    pub status: HealthStatus,
    /// Service version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Subscription count per active tier.
    pub tiers: TierCounts,
    /// Live subscriptions and their active tier.
    pub subscriptions: Vec<SubscriptionInfo>,
}

/// Number of subscriptions on each tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TierCounts {
    /// Subscriptions fed by the push stream.
    pub push: usize,
    /// Subscriptions fed by polling.
    pub poll: usize,
    /// Subscriptions on synthetic data.
    pub synthetic: usize,
}

impl TierCounts {
    fn tally(subscriptions: &[SubscriptionInfo]) -> Self {
        subscriptions
            .iter()
            .fold(Self::default(), |mut counts, info| {
                match info.tier {
                    Tier::Push => counts.push += 1,
                    Tier::Poll => counts.poll += 1,
                    Tier::Synthetic => counts.synthetic += 1,
                }
                counts
            })
    }

    const fn live(self) -> usize {
        self.push + self.poll
    }
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Every subscription is on a live tier.
    Healthy,
    /// At least one subscription has fallen back to synthetic data.
    Degraded,
}

// =============================================================================
// Health Server State
// =============================================================================

/// Shared state for the health server.
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    controller: FeedController,
}

impl HealthServerState {
    /// Create new health server state.
    #[must_use]
    pub fn new(version: String, controller: FeedController) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            controller,
        }
    }
}

// =============================================================================
// Health Server
// =============================================================================

/// Health check HTTP server.
pub struct HealthServer {
    port: u16,
    state: Arc<HealthServerState>,
    cancel: CancellationToken,
}

impl HealthServer {
    /// Create a new health server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<HealthServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Bind the configured port and serve until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HealthServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "Health server listening");
        self.serve(listener).await
    }

    /// Serve on an already bound listener until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError` if the HTTP server fails while running.
    pub async fn serve(self, listener: TcpListener) -> Result<(), HealthServerError> {
        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HealthServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Health server stopped");
        Ok(())
    }
}

fn router(state: Arc<HealthServerState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    (StatusCode::OK, Json(build_health_response(&state)))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let tiers = TierCounts::tally(&state.controller.active_subscriptions());

    if tiers.live() > 0 {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                handle.render(),
            )
        },
    )
}

fn build_health_response(state: &HealthServerState) -> HealthResponse {
    let subscriptions = state.controller.active_subscriptions();

    let tiers = TierCounts::tally(&subscriptions);

    HealthResponse {
        status: determine_health_status(tiers),
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        tiers,
        subscriptions,
    }
}

const fn determine_health_status(tiers: TierCounts) -> HealthStatus {
    if tiers.synthetic > 0 {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Health server errors.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{PollSource, PushStream, PushTransport, TransportError};
    use crate::infrastructure::config::FeedConfig;
    use async_trait::async_trait;

    struct Refusing;

    #[async_trait]
    impl PushTransport for Refusing {
        async fn connect(&self, _: &str) -> Result<PushStream, TransportError> {
            Err(TransportError::Closed)
        }
    }

    #[async_trait]
    impl PollSource for Refusing {
        async fn fetch(&self, _: &str) -> Result<serde_json::Value, TransportError> {
            Err(TransportError::Status(500))
        }
    }

    #[test]
    fn health_status_serialization() {
        assert_eq!(
            serde_json::to_string(&HealthStatus::Healthy).unwrap(),
            "\"healthy\""
        );
        assert_eq!(
            serde_json::to_string(&HealthStatus::Degraded).unwrap(),
            "\"degraded\""
        );
    }

    #[test]
    fn synthetic_subscription_degrades_status() {
        let info = |tier| SubscriptionInfo {
            id: serde_json::from_str("1").unwrap(),
            instrument_key: "BTC".to_string(),
            tier,
        };

        let status = |infos: &[SubscriptionInfo]| determine_health_status(TierCounts::tally(infos));

        assert_eq!(status(&[]), HealthStatus::Healthy);
        assert_eq!(status(&[info(Tier::Push), info(Tier::Poll)]), HealthStatus::Healthy);
        assert_eq!(
            status(&[info(Tier::Push), info(Tier::Synthetic)]),
            HealthStatus::Degraded
        );
    }

    #[test]
    fn tally_counts_each_tier() {
        let info = |tier| SubscriptionInfo {
            id: serde_json::from_str("1").unwrap(),
            instrument_key: "ETH".to_string(),
            tier,
        };

        let counts = TierCounts::tally(&[
            info(Tier::Push),
            info(Tier::Synthetic),
            info(Tier::Synthetic),
        ]);
        assert_eq!(
            counts,
            TierCounts {
                push: 1,
                poll: 0,
                synthetic: 2
            }
        );
        assert_eq!(counts.live(), 1);
    }

    #[tokio::test]
    async fn serves_health_json() {
        let refusing = Arc::new(Refusing);
        let controller = FeedController::with_transports(
            &FeedConfig::default(),
            refusing.clone(),
            refusing,
        );
        let handle = controller.subscribe("BTC", |_snapshot| {});

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let cancel = CancellationToken::new();
        let state = Arc::new(HealthServerState::new("test".to_string(), controller));
        let server = tokio::spawn(HealthServer::new(0, state, cancel.clone()).serve(listener));

        let body: serde_json::Value = reqwest::get(format!("http://{addr}/health"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(body["version"], "test");
        assert_eq!(body["subscriptions"][0]["instrumentKey"], "BTC");
        assert_eq!(body["subscriptions"][0]["id"], handle.id().get());

        let live = reqwest::get(format!("http://{addr}/healthz")).await.unwrap();
        assert_eq!(live.status(), 200);

        // Both upstreams refuse, so the only subscription ends up synthetic.
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        let ready = reqwest::get(format!("http://{addr}/readyz")).await.unwrap();
        assert_eq!(ready.status(), 503);

        handle.unsubscribe();
        cancel.cancel();
        server.await.unwrap().unwrap();
    }
}
