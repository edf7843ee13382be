//! Progress tracker configuration.

/// Configuration for a [`ProgressTracker`](crate::ProgressTracker).
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Maximum number of history entries kept in memory.
    pub history_capacity: usize,

    /// Number of most recent entries written by `export_state`.
    pub exported_history: usize,

    /// Number of most recent entries used for the advance rate.
    pub rate_window: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            history_capacity: 100,
            exported_history: 20,
            rate_window: 10,
        }
    }
}

impl TrackerConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the history capacity (at least 1).
    #[must_use]
    pub fn history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity.max(1);
        self
    }

    /// Sets how many entries are exported.
    #[must_use]
    pub const fn exported_history(mut self, count: usize) -> Self {
        self.exported_history = count;
        self
    }

    /// Sets the advance-rate window (at least 2).
    #[must_use]
    pub fn rate_window(mut self, window: usize) -> Self {
        self.rate_window = window.max(2);
        self
    }
}
