//! Simulated Option Markets
//!
//! Two static venues, each with a small list of SOL option markets. Every
//! tick produces one update per market: base IV and mark scaled by a shared
//! random factor within ±5%, open interest nudged by up to ±50 contracts.
//! Base values never drift.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;

use super::event::RelayEvent;

const PRICE_VARIATION: f64 = 0.1;
const OI_VARIATION: f64 = 100.0;

/// Static description of one option market.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionMarket {
    /// Underlying symbol.
    pub underlying: &'static str,
    /// Strike price.
    pub strike: f64,
    /// Expiry date label.
    pub expiry: &'static str,
    /// Base implied volatility.
    pub iv: f64,
    /// Base open interest.
    pub open_interest: i64,
    /// Base mark price.
    pub mark: f64,
}

impl OptionMarket {
    const fn sol(strike: f64, expiry: &'static str, iv: f64, open_interest: i64, mark: f64) -> Self {
        Self {
            underlying: "SOL",
            strike,
            expiry,
            iv,
            open_interest,
            mark,
        }
    }
}

const ZETA_MARKETS: [OptionMarket; 3] = [
    OptionMarket::sol(95.0, "2024-01-26", 0.65, 1250, 3.25),
    OptionMarket::sol(100.0, "2024-01-26", 0.62, 2100, 1.85),
    OptionMarket::sol(105.0, "2024-01-26", 0.60, 1800, 0.95),
];

const PSYOPTIONS_MARKETS: [OptionMarket; 3] = [
    OptionMarket::sol(90.0, "2024-02-23", 0.68, 950, 5.75),
    OptionMarket::sol(95.0, "2024-02-23", 0.65, 1600, 3.45),
    OptionMarket::sol(100.0, "2024-02-23", 0.63, 2200, 1.95),
];

/// A venue emitting updates for its markets on a fixed cadence.
#[derive(Debug, Clone)]
pub struct MarketSimulator {
    source: &'static str,
    markets: Vec<OptionMarket>,
    cadence: Duration,
}

impl MarketSimulator {
    /// Zeta venue, ticking every 5 seconds.
    #[must_use]
    pub fn zeta() -> Self {
        Self {
            source: "zeta",
            markets: ZETA_MARKETS.to_vec(),
            cadence: Duration::from_secs(5),
        }
    }

    /// PsyOptions venue, ticking every 7 seconds.
    #[must_use]
    pub fn psyoptions() -> Self {
        Self {
            source: "psyoptions",
            markets: PSYOPTIONS_MARKETS.to_vec(),
            cadence: Duration::from_secs(7),
        }
    }

    /// Override the tick cadence.
    #[must_use]
    pub const fn with_cadence(mut self, cadence: Duration) -> Self {
        self.cadence = cadence;
        self
    }

    /// Venue name.
    #[must_use]
    pub const fn source(&self) -> &'static str {
        self.source
    }

    /// Time between ticks.
    #[must_use]
    pub const fn cadence(&self) -> Duration {
        self.cadence
    }

    /// Markets covered by this venue.
    #[must_use]
    pub fn markets(&self) -> &[OptionMarket] {
        &self.markets
    }

    /// Event type carried by this venue's updates.
    #[must_use]
    pub fn event_type(&self) -> String {
        format!("{}_market_update", self.source)
    }

    /// One update per market using the thread-local RNG.
    #[must_use]
    pub fn tick(&self, now: DateTime<Utc>) -> Vec<RelayEvent> {
        self.tick_with(&mut rand::rng(), now)
    }

    /// One update per market using `rng`.
    pub fn tick_with<R: Rng>(&self, rng: &mut R, now: DateTime<Utc>) -> Vec<RelayEvent> {
        let event_type = self.event_type();

        self.markets
            .iter()
            .map(|market| {
                let variation = (rng.random::<f64>() - 0.5) * PRICE_VARIATION;
                #[allow(clippy::cast_possible_truncation)]
                let oi_delta = ((rng.random::<f64>() - 0.5) * OI_VARIATION).floor() as i64;

                RelayEvent {
                    event_type: event_type.clone(),
                    underlying: market.underlying.to_string(),
                    market: RelayEvent::market_key(market.underlying, market.strike, market.expiry),
                    strike: Some(market.strike),
                    expiry: Some(market.expiry.to_string()),
                    iv: Some(market.iv * (1.0 + variation)),
                    oi: Some(market.open_interest + oi_delta),
                    mark: Some(market.mark * (1.0 + variation)),
                    timestamp: now,
                }
            })
            .collect()
    }
}
