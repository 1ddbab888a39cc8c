//! Engine timing and capacity configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Pause between broker order polls, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Timeout for every broker call, in seconds.
    #[serde(default = "default_broker_timeout_secs")]
    pub broker_timeout_secs: u64,
    /// Capacity of every bounded queue.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Interval between reconciler passes, in milliseconds.
    #[serde(default = "default_commit_interval_ms")]
    pub commit_interval_ms: u64,
    /// Internal errors tolerated per broker order before its fill is dropped.
    #[serde(default = "default_max_internal_errors")]
    pub max_internal_errors: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            broker_timeout_secs: default_broker_timeout_secs(),
            queue_capacity: default_queue_capacity(),
            commit_interval_ms: default_commit_interval_ms(),
            max_internal_errors: default_max_internal_errors(),
        }
    }
}

impl EngineConfig {
    /// Poll interval as a duration.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Broker timeout as a duration.
    #[must_use]
    pub const fn broker_timeout(&self) -> Duration {
        Duration::from_secs(self.broker_timeout_secs)
    }

    /// Commit interval as a duration.
    #[must_use]
    pub const fn commit_interval(&self) -> Duration {
        Duration::from_millis(self.commit_interval_ms)
    }
}

const fn default_poll_interval_ms() -> u64 {
    250
}

const fn default_broker_timeout_secs() -> u64 {
    10
}

const fn default_queue_capacity() -> usize {
    1024
}

const fn default_commit_interval_ms() -> u64 {
    500
}

const fn default_max_internal_errors() -> u32 {
    3
}
