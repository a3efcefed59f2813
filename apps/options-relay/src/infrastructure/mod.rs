//! Infrastructure Layer - Sink connection, reconnection and configuration.

pub mod config;
pub mod reconnect;
pub mod relay;

pub use config::{DEFAULT_SINK_URL, RelayConfig};
pub use reconnect::{DEFAULT_RECONNECT_DELAY, ReconnectConfig, ReconnectPolicy, ReconnectSchedule};
pub use relay::{RelayClient, RelayError, RelayStatus};
