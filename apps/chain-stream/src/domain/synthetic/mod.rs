//! Synthetic Chain Generator
//!
//! Produces a 16-strike ladder that looks like a lightly moving market.
//! The strike ladder is fixed; quotes follow a smooth curve across strikes
//! with a little random jitter on every call, so consecutive snapshots share
//! their shape and differ only in bid/ask/IV values.
//!
//! This is the final fallback tier and has no external dependencies.

use rand::Rng;

use super::snapshot::{QuoteRow, Snapshot};

/// Number of rows in every synthetic ladder.
pub const SYNTHETIC_ROWS: usize = 16;

const BASE_STRIKE: f64 = 50_000.0;
const LADDER_OFFSET: f64 = 50.0;
const STRIKE_STEP: f64 = 100.0;
const QUOTE_JITTER: f64 = 10.0;
const IV_JITTER: f64 = 0.005;

/// Strike for row `i` of the synthetic ladder.
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn strike_at(i: usize) -> f64 {
    let k = (LADDER_OFFSET + i as f64) * 2.0;
    k.mul_add(STRIKE_STEP, BASE_STRIKE)
}

/// Generate a synthetic snapshot using the thread-local RNG.
#[must_use]
pub fn generate(instrument_key: &str) -> Snapshot {
    generate_with(&mut rand::rng(), instrument_key)
}

/// Generate a synthetic snapshot from the given RNG.
#[allow(clippy::cast_precision_loss)]
pub fn generate_with<R: Rng>(rng: &mut R, instrument_key: &str) -> Snapshot {
    let rows = (0..SYNTHETIC_ROWS)
        .map(|i| {
            let x = i as f64;
            QuoteRow {
                strike: strike_at(i),
                call_iv: 0.05f64.mul_add((x / 3.0).sin(), 0.45) + iv_jitter(rng),
                call_bid: 14.0f64.mul_add(-x, 900.0) + quote_jitter(rng),
                call_ask: 13.0f64.mul_add(-x, 920.0) + quote_jitter(rng),
                put_bid: 12.0f64.mul_add(x, 880.0) + quote_jitter(rng),
                put_ask: 13.0f64.mul_add(x, 900.0) + quote_jitter(rng),
                put_iv: 0.05f64.mul_add((x / 4.0).cos(), 0.42) + iv_jitter(rng),
            }
        })
        .collect();

    Snapshot::synthetic(instrument_key, rows)
}

fn quote_jitter<R: Rng>(rng: &mut R) -> f64 {
    rng.random_range(0.0..QUOTE_JITTER)
}

fn iv_jitter<R: Rng>(rng: &mut R) -> f64 {
    rng.random_range(-IV_JITTER..IV_JITTER)
}
