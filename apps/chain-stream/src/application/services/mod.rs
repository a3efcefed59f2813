//! Application Services
//!
//! - [`FeedController`]: subscription lifecycle and tier orchestration

mod controller;

pub use controller::{
    FeedController, FeedError, SubscriptionHandle, SubscriptionId, SubscriptionInfo,
};
