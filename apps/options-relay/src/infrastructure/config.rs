//! Relay Configuration
//!
//! Loaded from environment variables. Unset or unparsable values fall back to
//! the defaults; configuration is never fatal.

use std::time::Duration;

use super::reconnect::{DEFAULT_RECONNECT_DELAY, ReconnectConfig};

/// Default ingestion sink.
pub const DEFAULT_SINK_URL: &str = "ws://localhost:8080/ingest";

/// Settings for the relay client.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayConfig {
    /// Full WebSocket URL of the sink.
    pub sink_url: String,
    /// Reconnection policy.
    pub reconnect: ReconnectConfig,
    /// Upper bound on a single connection attempt.
    pub connect_timeout: Duration,
    /// Tick cadence of the primary (Zeta) venue.
    pub primary_cadence: Duration,
    /// Tick cadence of the secondary (PsyOptions) venue.
    pub secondary_cadence: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            sink_url: DEFAULT_SINK_URL.to_string(),
            reconnect: ReconnectConfig::default(),
            connect_timeout: Duration::from_secs(10),
            primary_cadence: Duration::from_secs(5),
            secondary_cadence: Duration::from_secs(7),
        }
    }
}

impl RelayConfig {
    /// Create configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// `RELAY_SINK_URL` wins over the legacy `ORCH_WS_SINK`.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let sink_url = non_empty(&lookup, "RELAY_SINK_URL")
            .or_else(|| non_empty(&lookup, "ORCH_WS_SINK"))
            .unwrap_or(defaults.sink_url);

        Self {
            sink_url,
            reconnect: ReconnectConfig::fixed(parse_duration_millis(
                &lookup,
                "RELAY_RECONNECT_DELAY_MS",
                DEFAULT_RECONNECT_DELAY,
            )),
            connect_timeout: parse_duration_millis(
                &lookup,
                "RELAY_CONNECT_TIMEOUT_MS",
                defaults.connect_timeout,
            ),
            primary_cadence: parse_duration_millis(
                &lookup,
                "RELAY_PRIMARY_CADENCE_MS",
                defaults.primary_cadence,
            ),
            secondary_cadence: parse_duration_millis(
                &lookup,
                "RELAY_SECONDARY_CADENCE_MS",
                defaults.secondary_cadence,
            ),
        }
    }

    /// Override the sink URL.
    #[must_use]
    pub fn with_sink_url(mut self, url: impl Into<String>) -> Self {
        self.sink_url = url.into();
        self
    }

    /// Override the reconnection policy.
    #[must_use]
    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Override the connection attempt timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Override both venue cadences.
    #[must_use]
    pub const fn with_cadences(mut self, primary: Duration, secondary: Duration) -> Self {
        self.primary_cadence = primary;
        self.secondary_cadence = secondary;
        self
    }
}

fn non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_duration_millis<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|&ms| ms > 0)
        .map_or(default, Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = RelayConfig::from_lookup(lookup(&[]));
        assert_eq!(config, RelayConfig::default());
        assert_eq!(config.reconnect.delay, Duration::from_secs(5));
        assert_eq!(config.primary_cadence, Duration::from_secs(5));
        assert_eq!(config.secondary_cadence, Duration::from_secs(7));
    }

    #[test]
    fn legacy_sink_variable_is_honoured() {
        let config = RelayConfig::from_lookup(lookup(&[("ORCH_WS_SINK", "ws://orch:9000/ws")]));
        assert_eq!(config.sink_url, "ws://orch:9000/ws");
    }

    #[test]
    fn primary_sink_variable_wins() {
        let config = RelayConfig::from_lookup(lookup(&[
            ("ORCH_WS_SINK", "ws://orch:9000/ws"),
            ("RELAY_SINK_URL", "wss://sink.example/ingest"),
        ]));
        assert_eq!(config.sink_url, "wss://sink.example/ingest");
    }

    #[test]
    fn overrides_are_parsed() {
        let config = RelayConfig::from_lookup(lookup(&[
            ("RELAY_RECONNECT_DELAY_MS", "250"),
            ("RELAY_PRIMARY_CADENCE_MS", "100"),
            ("RELAY_SECONDARY_CADENCE_MS", "140"),
        ]));
        assert_eq!(config.reconnect, ReconnectConfig::fixed(Duration::from_millis(250)));
        assert_eq!(config.primary_cadence, Duration::from_millis(100));
        assert_eq!(config.secondary_cadence, Duration::from_millis(140));
    }

    #[test]
    fn invalid_values_fall_back() {
        let config = RelayConfig::from_lookup(lookup(&[
            ("RELAY_SINK_URL", "  "),
            ("RELAY_RECONNECT_DELAY_MS", "soon"),
            ("RELAY_PRIMARY_CADENCE_MS", "0"),
        ]));
        assert_eq!(config, RelayConfig::default());
    }
}
