//! Dispatcher configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Dispatcher configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Buffer size of the request channel into the dispatcher task
    #[serde(rename = "channel-buffer", default = "default_channel_buffer")]
    pub channel_buffer: usize,

    /// Capacity of the event broadcast channel
    #[serde(rename = "event-capacity", default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Handler timeout for queues that do not set one, in milliseconds
    #[serde(rename = "default-timeout-ms", default = "default_timeout_ms")]
    pub default_timeout_ms: u64,

    /// Cadence of the polling driver, in milliseconds
    #[serde(rename = "poll-interval-ms", default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_channel_buffer() -> usize {
    debug!("default_channel_buffer: called");
    256
}

fn default_event_capacity() -> usize {
    debug!("default_event_capacity: called");
    1024
}

fn default_timeout_ms() -> u64 {
    debug!("default_timeout_ms: called");
    1000
}

fn default_poll_interval_ms() -> u64 {
    debug!("default_poll_interval_ms: called");
    10
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        debug!("DispatcherConfig::default: called");
        Self {
            channel_buffer: 256,
            event_capacity: 1024,
            default_timeout_ms: 1000,
            poll_interval_ms: 10,
        }
    }
}

impl DispatcherConfig {
    /// Get the default handler timeout as a Duration
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    /// Get the driver poll interval as a Duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
