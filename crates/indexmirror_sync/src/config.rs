//! Configuration for the remote source and sync driver.

use indexmirror_core::TrackerConfig;
use std::time::Duration;

/// Largest page size the remote accepts for a single collection.
pub const MAX_PAGE_SIZE: u32 = 5000;

/// Configuration for synchronization.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Subgraph GraphQL endpoint.
    pub endpoint: String,
    /// Rows requested per collection in a full snapshot.
    pub page_size: u32,
    /// Period of the delta schedule.
    pub update_interval: Duration,
    /// Retry configuration for remote fetches.
    pub retry: RetryConfig,
    /// Staleness beyond which the tracker is reported unhealthy.
    pub tracker_max_age: Duration,
    /// Progress tracker configuration.
    pub tracker: TrackerConfig,
    /// `User-Agent` sent with every request.
    pub user_agent: String,
}

impl SyncConfig {
    /// Creates a configuration for `endpoint` with default values.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            page_size: 1000,
            update_interval: Duration::from_secs(30),
            retry: RetryConfig::default(),
            tracker_max_age: Duration::from_secs(5 * 60),
            tracker: TrackerConfig::default(),
            user_agent: concat!("indexmirror/", env!("CARGO_PKG_VERSION")).to_owned(),
        }
    }

    /// Sets the snapshot page size (1 to [`MAX_PAGE_SIZE`]).
    pub fn with_page_size(mut self, size: u32) -> Self {
        self.page_size = size.clamp(1, MAX_PAGE_SIZE);
        self
    }

    /// Sets the schedule period.
    pub fn with_update_interval(mut self, interval: Duration) -> Self {
        self.update_interval = interval;
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the tracker health threshold.
    pub fn with_tracker_max_age(mut self, max_age: Duration) -> Self {
        self.tracker_max_age = max_age;
        self
    }

    /// Sets the progress tracker configuration.
    pub fn with_tracker(mut self, tracker: TrackerConfig) -> Self {
        self.tracker = tracker;
        self
    }

    /// Sets the `User-Agent` header.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new("")
    }
}

/// Fixed-delay retry behavior for remote fetches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Pause between attempts.
    pub delay: Duration,
    /// Upper bound on a single attempt.
    pub attempt_timeout: Duration,
}

impl RetryConfig {
    /// Creates a retry configuration with `max_attempts` (at least 1).
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay: Duration::from_secs(2),
            attempt_timeout: Duration::from_secs(30),
        }
    }

    /// A single attempt, no waiting.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            delay: Duration::ZERO,
            attempt_timeout: Duration::from_secs(30),
        }
    }

    /// Sets the delay between attempts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Sets the per-attempt timeout.
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Delay before the given attempt (0-indexed): none before the first,
    /// then a constant pause.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            Duration::ZERO
        } else {
            self.delay
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}
