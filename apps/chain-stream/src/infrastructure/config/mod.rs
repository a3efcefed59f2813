//! Configuration Module
//!
//! Configuration loading for the feed controller and the service binary.

mod settings;

pub use settings::{
    DEFAULT_POLL_BASE, DEFAULT_PUSH_BASE, FeedConfig, ServerSettings, ServiceConfig,
};
