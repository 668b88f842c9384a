//! # Bus Configuration

use std::time::Duration;

/// Tunable limits and intervals for a [`crate::MessageBus`].
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Bound on the consumer-local dedup window (FIFO eviction past this).
    pub dedup_capacity: usize,

    /// How often the consumer loop scans the store when no watch
    /// notification arrives.
    pub poll_interval: Duration,

    /// Agents whose `last_seen` is older than this are marked disconnected
    /// by `check_health`.
    pub liveness_timeout: Duration,

    /// Safety valve on outstanding requests; `register` fails past this.
    pub max_pending_requests: usize,
}

impl BusConfig {
    /// Default liveness threshold before an agent is considered gone.
    pub const DEFAULT_LIVENESS_TIMEOUT: Duration = Duration::from_secs(30);

    /// Default store polling interval.
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

    /// Default cap on outstanding pending requests.
    pub const DEFAULT_MAX_PENDING_REQUESTS: usize = 1024;
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            dedup_capacity: crate::dedup::DEFAULT_DEDUP_CAPACITY,
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
            liveness_timeout: Self::DEFAULT_LIVENESS_TIMEOUT,
            max_pending_requests: Self::DEFAULT_MAX_PENDING_REQUESTS,
        }
    }
}
