#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements,
        clippy::cast_precision_loss
    )
)]

//! Chain Stream - Resilient Options Chain Feed
//!
//! Delivers a continuously updated options-chain snapshot for an instrument,
//! degrading across three acquisition tiers when upstreams fail.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Snapshot model, tier state machine, synthetic generator
//!   - `snapshot`: `Snapshot` and `QuoteRow`
//!   - `tier`: pure demotion policy
//!   - `synthetic`: locally generated ladder
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: push transport, poll source, snapshot sink
//!   - `services`: `FeedController`
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `chain`: WebSocket push, HTTP poll, JSON codec
//!   - `config`: Configuration from the environment
//!   - `health`: Health check HTTP endpoint
//!   - `metrics`, `telemetry`: Prometheus and tracing
//!
//! # Data Flow
//!
//! ```text
//!  push (ws) ──fail──► poll (http) ──fail──► synthetic
//!      │                   │                    │
//!      └───────────────────┴────────────────────┴──► FeedController ──► on_snapshot
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Snapshot model and tier policy with no I/O.
pub mod domain;

/// Application layer - Feed controller and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::snapshot::{FALLBACK_EXPIRY, QuoteRow, Snapshot};
pub use domain::tier::Tier;

// Application
pub use application::ports::{
    PollSource, PushFrame, PushStream, PushTransport, SnapshotSink, TransportError,
};
pub use application::services::{
    FeedController, FeedError, SubscriptionHandle, SubscriptionId, SubscriptionInfo,
};

// Infrastructure config
pub use infrastructure::config::{FeedConfig, ServerSettings, ServiceConfig};

// Adapters
pub use infrastructure::chain::{HttpPollSource, WsPushTransport};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
