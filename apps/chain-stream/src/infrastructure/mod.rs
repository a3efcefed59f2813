//! Infrastructure Layer - Adapters and external integrations.
//!
//! Concrete implementations of the application ports plus the service
//! plumbing around them.

/// WebSocket push, HTTP poll and the chain JSON codec.
pub mod chain;

/// Configuration loading.
pub mod config;

/// Health check HTTP endpoint.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Tracing subscriber and OpenTelemetry integration.
pub mod telemetry;
