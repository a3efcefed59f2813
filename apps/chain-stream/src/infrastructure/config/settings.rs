//! Feed Configuration Settings
//!
//! Configuration types for the chain feed, loaded from environment variables.
//!
//! Precedence is builder override, then environment, then the defaults
//! below. Missing or unparsable values fall back silently; configuration is
//! never fatal.

use std::time::Duration;

/// Default base URL for the push tier.
pub const DEFAULT_PUSH_BASE: &str = "ws://127.0.0.1:8080";
/// Default base URL for the poll tier.
pub const DEFAULT_POLL_BASE: &str = "http://127.0.0.1:8080";

/// Settings consumed by the feed controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedConfig {
    /// Push tier base URL (`ws://` or `wss://`).
    pub push_base: String,
    /// Poll tier base URL (`http://` or `https://`).
    pub poll_base: String,
    /// Time between poll requests.
    pub poll_interval: Duration,
    /// Time between synthetic snapshots.
    pub synthetic_interval: Duration,
    /// Per-request timeout for the poll tier.
    pub request_timeout: Duration,
    /// Upper bound on the push tier's connection handshake.
    pub connect_timeout: Duration,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            push_base: DEFAULT_PUSH_BASE.to_string(),
            poll_base: DEFAULT_POLL_BASE.to_string(),
            poll_interval: Duration::from_millis(3_000),
            synthetic_interval: Duration::from_millis(1_500),
            request_timeout: Duration::from_millis(2_500),
            connect_timeout: Duration::from_millis(5_000),
        }
    }
}

impl FeedConfig {
    /// Create configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        Self {
            push_base: parse_string(&lookup, "CHAIN_STREAM_PUSH_BASE", defaults.push_base),
            poll_base: parse_string(&lookup, "CHAIN_STREAM_POLL_BASE", defaults.poll_base),
            poll_interval: parse_duration_millis(
                &lookup,
                "CHAIN_STREAM_POLL_INTERVAL_MS",
                defaults.poll_interval,
            ),
            synthetic_interval: parse_duration_millis(
                &lookup,
                "CHAIN_STREAM_SYNTHETIC_INTERVAL_MS",
                defaults.synthetic_interval,
            ),
            request_timeout: parse_duration_millis(
                &lookup,
                "CHAIN_STREAM_REQUEST_TIMEOUT_MS",
                defaults.request_timeout,
            ),
            connect_timeout: parse_duration_millis(
                &lookup,
                "CHAIN_STREAM_CONNECT_TIMEOUT_MS",
                defaults.connect_timeout,
            ),
        }
    }

    /// Override the push base URL.
    #[must_use]
    pub fn with_push_base(mut self, base: impl Into<String>) -> Self {
        self.push_base = base.into();
        self
    }

    /// Override the poll base URL.
    #[must_use]
    pub fn with_poll_base(mut self, base: impl Into<String>) -> Self {
        self.poll_base = base.into();
        self
    }

    /// Override the poll interval.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Override the synthetic interval.
    #[must_use]
    pub const fn with_synthetic_interval(mut self, interval: Duration) -> Self {
        self.synthetic_interval = interval;
        self
    }

    /// Override the poll request timeout.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Override the push connection timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

/// Health server settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    /// Health check HTTP port (0 = disabled).
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { health_port: 8083 }
    }
}

/// Complete service configuration for the `chain-stream` binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Feed controller settings.
    pub feed: FeedConfig,
    /// Server settings.
    pub server: ServerSettings,
    /// Instruments subscribed at startup.
    pub instruments: Vec<String>,
}

impl ServiceConfig {
    /// Create configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let server = ServerSettings {
            health_port: parse_u16(
                &lookup,
                "CHAIN_STREAM_HEALTH_PORT",
                ServerSettings::default().health_port,
            ),
        };

        let instruments = lookup("CHAIN_STREAM_INSTRUMENTS")
            .map(|raw| parse_instruments(&raw))
            .filter(|list| !list.is_empty())
            .unwrap_or_else(|| vec!["BTC".to_string()]);

        Self {
            feed: FeedConfig::from_lookup(&lookup),
            server,
            instruments,
        }
    }
}

fn parse_instruments(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_string<F>(lookup: &F, key: &str, default: String) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().trim_end_matches('/').to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or(default)
}

fn parse_u16<F>(lookup: &F, key: &str, default: u16) -> u16
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_duration_millis<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|ms| *ms > 0)
        .map_or(default, Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn feed_config_defaults() {
        let config = FeedConfig::default();
        assert_eq!(config.push_base, "ws://127.0.0.1:8080");
        assert_eq!(config.poll_base, "http://127.0.0.1:8080");
        assert_eq!(config.poll_interval, Duration::from_secs(3));
        assert_eq!(config.synthetic_interval, Duration::from_millis(1_500));
        assert_eq!(config.request_timeout, Duration::from_millis(2_500));
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
    }

    #[test]
    fn empty_environment_yields_defaults() {
        assert_eq!(FeedConfig::from_lookup(|_| None), FeedConfig::default());
    }

    #[test]
    fn environment_overrides_defaults() {
        let config = FeedConfig::from_lookup(lookup_from(&[
            ("CHAIN_STREAM_PUSH_BASE", "wss://feed.example/"),
            ("CHAIN_STREAM_POLL_INTERVAL_MS", "750"),
            ("CHAIN_STREAM_CONNECT_TIMEOUT_MS", "1200"),
        ]));
        assert_eq!(config.connect_timeout, Duration::from_millis(1_200));
        assert_eq!(config.push_base, "wss://feed.example");
        assert_eq!(config.poll_interval, Duration::from_millis(750));
        assert_eq!(config.poll_base, DEFAULT_POLL_BASE);
    }

    #[test]
    fn unparsable_values_fall_back() {
        let config = FeedConfig::from_lookup(lookup_from(&[
            ("CHAIN_STREAM_POLL_INTERVAL_MS", "soon"),
            ("CHAIN_STREAM_SYNTHETIC_INTERVAL_MS", "0"),
            ("CHAIN_STREAM_PUSH_BASE", "  "),
        ]));
        assert_eq!(config, FeedConfig::default());
    }

    #[test]
    fn builder_overrides_environment() {
        let config = FeedConfig::from_lookup(lookup_from(&[(
            "CHAIN_STREAM_POLL_BASE",
            "http://env",
        )]))
        .with_poll_base("http://explicit")
        .with_synthetic_interval(Duration::from_millis(10));
        assert_eq!(config.poll_base, "http://explicit");
        assert_eq!(config.synthetic_interval, Duration::from_millis(10));
    }

    #[test]
    fn service_config_parses_instruments() {
        let config = ServiceConfig::from_lookup(lookup_from(&[
            ("CHAIN_STREAM_INSTRUMENTS", " BTC, ETH,,SOL "),
            ("CHAIN_STREAM_HEALTH_PORT", "9000"),
        ]));
        assert_eq!(config.instruments, vec!["BTC", "ETH", "SOL"]);
        assert_eq!(config.server.health_port, 9000);
    }

    #[test]
    fn service_config_defaults_to_btc() {
        let config = ServiceConfig::from_lookup(lookup_from(&[("CHAIN_STREAM_INSTRUMENTS", ",")]));
        assert_eq!(config.instruments, vec!["BTC"]);
        assert_eq!(config.server.health_port, 8083);
    }
}
