//! Domain Layer - Relay wire model and market simulators.
//!
//! No I/O. The relay client in the infrastructure layer drives these.

pub mod event;
pub mod market;

pub use event::{ControlMessage, PING, PONG, RelayEvent};
pub use market::{MarketSimulator, OptionMarket};
