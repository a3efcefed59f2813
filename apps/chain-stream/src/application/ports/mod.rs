//! Port Interfaces
//!
//! Contracts the feed controller depends on. Infrastructure adapters
//! implement them; tests substitute in-memory fakes or mocks.
//!
//! ## Driven Ports (Outbound)
//!
//! - [`PushTransport`]: opens a server-push connection for one instrument
//! - [`PollSource`]: fetches one raw chain snapshot on request
//!
//! ## Driver Ports (Inbound)
//!
//! - [`SnapshotSink`]: receives snapshots for a subscription

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::domain::snapshot::Snapshot;

// =============================================================================
// Errors
// =============================================================================

/// Failures reported by transport adapters.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The connection or request could not be established.
    #[error("connect failed: {0}")]
    Connect(String),

    /// The upstream answered with a non-success status.
    #[error("upstream returned status {0}")]
    Status(u16),

    /// The response body could not be read or decoded.
    #[error("invalid response body: {0}")]
    Body(String),

    /// The connection was closed by either side.
    #[error("connection closed")]
    Closed,
}

// =============================================================================
// Push Transport
// =============================================================================

/// One event read from a push connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushFrame {
    /// A text message.
    Text(String),
    /// A transport-level error. The connection is unusable afterwards.
    Error(String),
    /// The connection closed.
    Closed,
}

/// Inbound frames of an open push connection.
///
/// Dropping the stream closes the connection.
pub type PushStream = BoxStream<'static, PushFrame>;

/// Opens server-push connections.
#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Connect and return the inbound frame stream for `instrument_key`.
    async fn connect(&self, instrument_key: &str) -> Result<PushStream, TransportError>;
}

// =============================================================================
// Poll Source
// =============================================================================

/// Fetches raw chain snapshots by request/response.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PollSource: Send + Sync {
    /// Fetch the current chain for `instrument_key` as raw JSON.
    async fn fetch(&self, instrument_key: &str) -> Result<serde_json::Value, TransportError>;
}

// =============================================================================
// Snapshot Sink
// =============================================================================

/// Receives snapshots for one subscription.
///
/// Implemented for every `FnMut(Snapshot) + Send + 'static` closure.
pub trait SnapshotSink: Send + 'static {
    /// Deliver one snapshot.
    fn deliver(&mut self, snapshot: Snapshot);
}

impl<F> SnapshotSink for F
where
    F: FnMut(Snapshot) + Send + 'static,
{
    fn deliver(&mut self, snapshot: Snapshot) {
        self(snapshot);
    }
}
