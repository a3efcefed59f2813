//! Application Layer - Use cases and port definitions.
//!
//! The feed controller lives here together with the port interfaces it
//! drives. Nothing in this layer knows about WebSockets or HTTP.

/// Port interfaces for push and poll transports.
pub mod ports;

/// Application services (feed controller).
pub mod services;
