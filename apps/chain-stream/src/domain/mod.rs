//! Domain Layer - Core chain types and tier policy.
//!
//! This layer contains the snapshot model, the tier state machine and the
//! synthetic chain generator. Nothing here performs I/O.

/// Options-chain snapshot model (rows, strikes, liveness flag).
pub mod snapshot;

/// Tier activation policy as a pure state machine.
pub mod tier;

/// Synthetic chain generator used as the last-resort tier.
pub mod synthetic;
