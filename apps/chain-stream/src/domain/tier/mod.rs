//! Tier Activation Policy
//!
//! A subscription acquires snapshots from exactly one tier at a time and
//! only ever moves down the ladder:
//!
//! ```text
//! Push ──fail──► Poll ──fail──► Synthetic
//!   │              │                │
//!   └──────────────┴── unsubscribe ─┴──► TornDown
//! ```
//!
//! There is no path back up within one subscription. Re-subscribing is the
//! only way to try the push tier again.
//!
//! The transition function is pure so the policy can be tested without any
//! connection or timer. The controller feeds it signals and performs the
//! returned action.

use std::fmt;

use serde::Serialize;

/// One acquisition strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Persistent server-push connection.
    Push,
    /// Periodic request/response polling.
    Poll,
    /// Locally generated chain.
    Synthetic,
}

impl Tier {
    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Push => "push",
            Self::Poll => "poll",
            Self::Synthetic => "synthetic",
        }
    }

    /// The tier a failure of `self` demotes to, if any.
    #[must_use]
    pub const fn demoted(&self) -> Option<Self> {
        match self {
            Self::Push => Some(Self::Poll),
            Self::Poll => Some(Self::Synthetic),
            Self::Synthetic => None,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subscription state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierState {
    /// The given tier is the single active tier.
    Active(Tier),
    /// Unsubscribed. Terminal.
    TornDown,
}

impl TierState {
    /// State every subscription starts in.
    pub const INITIAL: Self = Self::Active(Tier::Push);

    /// The active tier, or `None` once torn down.
    #[must_use]
    pub const fn tier(&self) -> Option<Tier> {
        match self {
            Self::Active(tier) => Some(*tier),
            Self::TornDown => None,
        }
    }

    /// Whether the subscription has been torn down.
    #[must_use]
    pub const fn is_torn_down(&self) -> bool {
        matches!(self, Self::TornDown)
    }
}

/// Inputs to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedSignal {
    /// The named tier reported a failure (transport error, close, bad poll body).
    TierFailed(Tier),
    /// The caller unsubscribed.
    Unsubscribed,
}

/// Side effect the controller must carry out after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierAction {
    /// Stop the current tier and start the given one.
    Activate(Tier),
    /// Stop everything owned by the subscription.
    TearDown,
}

/// Result of applying a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// State after the signal.
    pub next: TierState,
    /// Action to perform, `None` when the signal is ignored.
    pub action: Option<TierAction>,
}

impl Transition {
    const fn stay(state: TierState) -> Self {
        Self {
            next: state,
            action: None,
        }
    }
}

/// Apply `signal` to `state`.
///
/// A failure report for a tier that is not the active one is ignored, which
/// collapses an error followed by a close for the same connection into a
/// single demotion. A synthetic failure cannot happen by construction and is
/// ignored as well.
#[must_use]
pub const fn transition(state: TierState, signal: FeedSignal) -> Transition {
    match (state, signal) {
        (TierState::TornDown, _) => Transition::stay(TierState::TornDown),
        (TierState::Active(_), FeedSignal::Unsubscribed) => Transition {
            next: TierState::TornDown,
            action: Some(TierAction::TearDown),
        },
        (TierState::Active(active), FeedSignal::TierFailed(failed)) => {
            if !matches!(
                (active, failed),
                (Tier::Push, Tier::Push) | (Tier::Poll, Tier::Poll)
            ) {
                return Transition::stay(state);
            }
            match active.demoted() {
                Some(next) => Transition {
                    next: TierState::Active(next),
                    action: Some(TierAction::Activate(next)),
                },
                None => Transition::stay(state),
            }
        }
    }
}
