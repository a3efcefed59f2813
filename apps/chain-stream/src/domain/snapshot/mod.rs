//! Chain Snapshot Types
//!
//! A snapshot is one point-in-time view of an instrument's options ladder.
//! Every tier (push, poll, synthetic) produces the same shape, so consumers
//! never need to know where a snapshot came from beyond `is_live`.
//!
//! Snapshots are built once by the active tier and handed to subscribers by
//! value. Nothing downstream mutates them; a consumer replaces its previous
//! snapshot wholesale.

use serde::{Deserialize, Serialize};

/// Expiry label used when the source does not report one.
pub const FALLBACK_EXPIRY: &str = "30D";

/// One strike level of the ladder.
///
/// `bid <= ask` holds for well-behaved upstream data but is not enforced
/// here: malformed quotes pass through uncorrected.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRow {
    /// Strike price.
    pub strike: f64,
    /// Best call bid.
    pub call_bid: f64,
    /// Best call ask.
    pub call_ask: f64,
    /// Best put bid.
    pub put_bid: f64,
    /// Best put ask.
    pub put_ask: f64,
    /// Call implied volatility as a decimal fraction (nominally 0..=2).
    #[serde(rename = "callIV")]
    pub call_iv: f64,
    /// Put implied volatility as a decimal fraction (nominally 0..=2).
    #[serde(rename = "putIV")]
    pub put_iv: f64,
}

impl QuoteRow {
    /// A row with every field set to zero except the strike.
    #[must_use]
    pub const fn at_strike(strike: f64) -> Self {
        Self {
            strike,
            call_bid: 0.0,
            call_ask: 0.0,
            put_bid: 0.0,
            put_ask: 0.0,
            call_iv: 0.0,
            put_iv: 0.0,
        }
    }
}

/// Point-in-time options ladder for one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Underlying identifier (e.g. a ticker such as `BTC`).
    pub instrument_key: String,
    /// Informational expiry label.
    pub expiry_label: String,
    /// Rows in source order (ascending strike for well-formed sources).
    pub rows: Vec<QuoteRow>,
    /// `true` when produced by the push or poll tier, `false` when synthetic.
    pub is_live: bool,
}

impl Snapshot {
    /// Build a snapshot that came from a live tier.
    #[must_use]
    pub fn live(
        instrument_key: impl Into<String>,
        expiry_label: Option<String>,
        rows: Vec<QuoteRow>,
    ) -> Self {
        Self {
            instrument_key: instrument_key.into(),
            expiry_label: expiry_label.unwrap_or_else(|| FALLBACK_EXPIRY.to_string()),
            rows,
            is_live: true,
        }
    }

    /// Build a synthetic snapshot.
    #[must_use]
    pub fn synthetic(instrument_key: impl Into<String>, rows: Vec<QuoteRow>) -> Self {
        Self {
            instrument_key: instrument_key.into(),
            expiry_label: FALLBACK_EXPIRY.to_string(),
            rows,
            is_live: false,
        }
    }

    /// Strike ladder in row order.
    #[must_use]
    pub fn strikes(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.strike).collect()
    }

    /// Number of rows in the ladder.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the ladder is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
