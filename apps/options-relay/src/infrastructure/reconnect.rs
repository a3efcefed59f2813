//! Reconnection Policy
//!
//! Decides how long to wait before the next connection attempt, and keeps
//! at most one attempt pending at a time.
//!
//! The default is a fixed 5 second delay. Backoff and jitter are available
//! as knobs but off unless configured.

use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;

/// Default delay before reconnecting.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Configuration for reconnection behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Delay before the first attempt after a drop.
    pub delay: Duration,
    /// Upper bound once backoff is applied.
    pub max_delay: Duration,
    /// Growth factor per consecutive failure (1.0 = fixed delay).
    pub multiplier: f64,
    /// Jitter as a fraction of the delay (0.0 = none).
    pub jitter_factor: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self::fixed(DEFAULT_RECONNECT_DELAY)
    }
}

impl ReconnectConfig {
    /// Always wait exactly `delay`.
    #[must_use]
    pub const fn fixed(delay: Duration) -> Self {
        Self {
            delay,
            max_delay: delay,
            multiplier: 1.0,
            jitter_factor: 0.0,
        }
    }

    /// Exponential backoff from `delay` up to `max_delay`.
    #[must_use]
    pub const fn backoff(delay: Duration, max_delay: Duration, multiplier: f64) -> Self {
        Self {
            delay,
            max_delay,
            multiplier,
            jitter_factor: 0.0,
        }
    }

    /// Add ±`factor` jitter.
    #[must_use]
    pub const fn with_jitter(mut self, factor: f64) -> Self {
        self.jitter_factor = factor;
        self
    }
}

/// Delay sequence for consecutive reconnection attempts.
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    current: Duration,
    attempts: u32,
}

impl ReconnectPolicy {
    /// Create a new reconnection policy.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        let current = config.delay;
        Self {
            config,
            current,
            attempts: 0,
        }
    }

    /// Delay for the next attempt. Never gives up.
    pub fn next_delay(&mut self) -> Duration {
        self.attempts = self.attempts.saturating_add(1);
        let delay = self.jittered(self.current);

        #[allow(clippy::cast_precision_loss)]
        let grown = self.current.as_millis() as f64 * self.config.multiplier;
        let ceiling = self.config.max_delay.max(self.config.delay);
        self.current = if grown.is_finite() && grown > 0.0 {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            Duration::from_millis(grown.round() as u64).min(ceiling)
        } else {
            self.config.delay
        };

        delay
    }

    /// Start over after a successful connection.
    pub const fn reset(&mut self) {
        self.current = self.config.delay;
        self.attempts = 0;
    }

    /// Attempts since the last reset.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempts
    }

    fn jittered(&self, base: Duration) -> Duration {
        if self.config.jitter_factor <= 0.0 {
            return base;
        }

        #[allow(clippy::cast_precision_loss)]
        let millis = base.as_millis() as f64;
        let spread = millis * self.config.jitter_factor;
        let adjusted = (millis + rand::rng().random_range(-spread..=spread)).max(1.0);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Duration::from_millis(adjusted as u64)
    }
}

/// The single pending reconnect attempt, if any.
#[derive(Debug, Default)]
pub struct ReconnectSchedule {
    deadline: Option<Instant>,
}

impl ReconnectSchedule {
    /// Nothing pending.
    #[must_use]
    pub const fn new() -> Self {
        Self { deadline: None }
    }

    /// Schedule an attempt at `now + delay`.
    ///
    /// Returns `false` and leaves the existing deadline alone when an
    /// attempt is already pending.
    pub fn schedule(&mut self, now: Instant, delay: Duration) -> bool {
        if self.deadline.is_some() {
            return false;
        }
        self.deadline = Some(now + delay);
        true
    }

    /// Pending deadline.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Whether an attempt is pending.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Consume the pending attempt if it is due at `now`.
    pub fn take_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    /// Drop any pending attempt.
    pub const fn cancel(&mut self) {
        self.deadline = None;
    }
}
