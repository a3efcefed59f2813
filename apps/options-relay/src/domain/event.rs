//! Relay Wire Model
//!
//! Outbound [`RelayEvent`]s are JSON objects:
//!
//! ```json
//! {"type":"zeta_market_update","underlying":"SOL","market":"SOL-95-2024-01-26",
//!  "strike":95.0,"expiry":"2024-01-26","iv":0.66,"oi":1262,"mark":3.31,
//!  "timestamp":"2024-01-20T12:00:00Z"}
//! ```
//!
//! Inbound frames are [`ControlMessage`]s: any JSON object with a `type`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Inbound message type that asks for a liveness reply.
pub const PING: &str = "ping";
/// Event type of the liveness reply.
pub const PONG: &str = "pong";

const PONG_UNDERLYING: &str = "SOL";
const PONG_MARKET: &str = "ping-response";

/// One outbound tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayEvent {
    /// Event type, e.g. `zeta_market_update` or `pong`.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Underlying symbol.
    pub underlying: String,
    /// Market key, `{underlying}-{strike}-{expiry}` for market updates.
    pub market: String,
    /// Strike price.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strike: Option<f64>,
    /// Expiry date label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<String>,
    /// Implied volatility.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iv: Option<f64>,
    /// Open interest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oi: Option<i64>,
    /// Mark price.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mark: Option<f64>,
    /// Time the tick was produced.
    pub timestamp: DateTime<Utc>,
}

impl RelayEvent {
    /// Liveness reply stamped with `now`.
    #[must_use]
    pub fn pong(now: DateTime<Utc>) -> Self {
        Self {
            event_type: PONG.to_string(),
            underlying: PONG_UNDERLYING.to_string(),
            market: PONG_MARKET.to_string(),
            strike: None,
            expiry: None,
            iv: None,
            oi: None,
            mark: None,
            timestamp: now,
        }
    }

    /// Composite market key.
    #[must_use]
    pub fn market_key(underlying: &str, strike: f64, expiry: &str) -> String {
        format!("{underlying}-{strike}-{expiry}")
    }

    /// Encode as a JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Inbound message from the sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlMessage {
    /// Message type.
    #[serde(rename = "type")]
    pub message_type: String,
    /// Every other field, untouched.
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

impl ControlMessage {
    /// Parse an inbound text frame.
    ///
    /// # Errors
    ///
    /// Returns an error unless the frame is a JSON object with a string `type`.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Whether the sink is probing liveness.
    #[must_use]
    pub fn is_liveness_probe(&self) -> bool {
        self.message_type == PING
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn market_key_formats_integral_strikes_without_decimals() {
        assert_eq!(RelayEvent::market_key("SOL", 95.0, "2024-01-26"), "SOL-95-2024-01-26");
        assert_eq!(RelayEvent::market_key("SOL", 97.5, "2024-01-26"), "SOL-97.5-2024-01-26");
    }

    #[test]
    fn pong_omits_market_fields() {
        let now = Utc.with_ymd_and_hms(2024, 1, 20, 12, 0, 0).unwrap();
        let json: Value = serde_json::from_str(&RelayEvent::pong(now).to_json().unwrap()).unwrap();

        assert_eq!(json["type"], "pong");
        assert_eq!(json["underlying"], "SOL");
        assert_eq!(json["market"], "ping-response");
        assert_eq!(json["timestamp"], "2024-01-20T12:00:00Z");
        assert!(json.get("strike").is_none());
        assert!(json.get("oi").is_none());
    }

    #[test]
    fn control_message_keeps_extra_fields() {
        let msg = ControlMessage::parse(r#"{"type":"resync","from":42}"#).unwrap();
        assert_eq!(msg.message_type, "resync");
        assert_eq!(msg.rest.get("from"), Some(&json!(42)));
        assert!(!msg.is_liveness_probe());
    }

    #[test]
    fn ping_is_a_liveness_probe() {
        assert!(ControlMessage::parse(r#"{"type":"ping"}"#).unwrap().is_liveness_probe());
    }

    #[test]
    fn frames_without_type_are_rejected() {
        assert!(ControlMessage::parse(r#"{"kind":"ping"}"#).is_err());
        assert!(ControlMessage::parse("[]").is_err());
        assert!(ControlMessage::parse("ping").is_err());
    }
}
