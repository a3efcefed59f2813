//! Prometheus Metrics Module
//!
//! Exposes feed metrics in Prometheus format.
//!
//! # Metrics Categories
//!
//! - **Snapshots**: deliveries per tier
//! - **Tiers**: demotions between tiers, stale tier events
//! - **Push**: frames discarded as unparsable
//! - **Poll**: request latency
//! - **Subscriptions**: active subscription count
//!
//! Recording is a no-op until [`init_metrics`] installs the recorder, so the
//! library can be used without a metrics endpoint.
//!
//! Metrics are exposed at `/metrics` on the health server port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::domain::tier::Tier;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Calling this again returns the handle installed by the first call.
///
/// # Errors
///
/// Returns an error if the recorder cannot be installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();

    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "chain_stream_snapshots_delivered_total",
        "Snapshots delivered to subscribers by tier"
    );
    describe_counter!(
        "chain_stream_tier_demotions_total",
        "Tier demotions by source and destination tier"
    );
    describe_counter!(
        "chain_stream_push_frames_discarded_total",
        "Push frames discarded because they could not be parsed"
    );
    describe_counter!(
        "chain_stream_stale_tier_events_total",
        "Events from superseded tier activations that were dropped"
    );
    describe_gauge!(
        "chain_stream_active_subscriptions",
        "Number of live subscriptions"
    );
    describe_histogram!(
        "chain_stream_poll_request_seconds",
        "Round-trip time of poll requests"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record a snapshot delivered from `tier`.
pub fn record_snapshot_delivered(tier: Tier) {
    counter!(
        "chain_stream_snapshots_delivered_total",
        "tier" => tier.as_str()
    )
    .increment(1);
}

/// Record a demotion from `from` to `to`.
pub fn record_demotion(from: Tier, to: Tier) {
    counter!(
        "chain_stream_tier_demotions_total",
        "from" => from.as_str(),
        "to" => to.as_str()
    )
    .increment(1);
}

/// Record an unparsable push frame.
pub fn record_push_frame_discarded() {
    counter!("chain_stream_push_frames_discarded_total").increment(1);
}

/// Record a tier event dropped for carrying a stale generation.
pub fn record_stale_event(tier: Tier) {
    counter!(
        "chain_stream_stale_tier_events_total",
        "tier" => tier.as_str()
    )
    .increment(1);
}

/// Update the active subscription count.
#[allow(clippy::cast_precision_loss)]
pub fn set_active_subscriptions(count: usize) {
    gauge!("chain_stream_active_subscriptions").set(count as f64);
}

/// Record a poll request duration.
pub fn record_poll_duration(duration: Duration, ok: bool) {
    histogram!(
        "chain_stream_poll_request_seconds",
        "outcome" => if ok { "ok" } else { "error" }
    )
    .record(duration.as_secs_f64());
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_without_recorder_is_a_no_op() {
        record_snapshot_delivered(Tier::Poll);
        record_demotion(Tier::Push, Tier::Poll);
        record_push_frame_discarded();
        record_stale_event(Tier::Push);
        set_active_subscriptions(3);
        record_poll_duration(Duration::from_millis(5), true);
    }
}
