#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::cast_precision_loss
    )
)]

//! Options Relay - Simulated On-Chain Option Market Updates
//!
//! Forwards synthetic option market ticks from two venues to an ingestion
//! sink over a single WebSocket connection, reconnecting after a fixed delay
//! whenever that connection is lost.
//!
//! # Layers
//!
//! - **Domain**: wire model and market simulators
//!   - `event`: `RelayEvent`, `ControlMessage`
//!   - `market`: `MarketSimulator` for the Zeta and PsyOptions venues
//!
//! - **Infrastructure**: connection handling
//!   - `relay`: `RelayClient` run loop
//!   - `reconnect`: fixed-delay policy and single-flight schedule
//!   - `config`: configuration from the environment
//!
//! # Delivery
//!
//! At most once. Ticks generated while disconnected are reported as
//! [`RelayStatus::Dropped`] and never replayed.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

/// Domain layer - Wire model and simulators with no I/O.
pub mod domain;

/// Infrastructure layer - Sink connection and configuration.
pub mod infrastructure;

pub use domain::{ControlMessage, MarketSimulator, OptionMarket, PING, PONG, RelayEvent};
pub use infrastructure::{
    DEFAULT_SINK_URL, ReconnectConfig, ReconnectPolicy, ReconnectSchedule, RelayClient,
    RelayConfig, RelayError, RelayStatus,
};
