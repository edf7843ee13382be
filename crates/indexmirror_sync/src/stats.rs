//! Sync attempt statistics.

use indexmirror_core::unix_millis;
use serde::{Serialize, Serializer};
use std::time::SystemTime;

/// Counters accumulated over the life of a driver.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStats {
    /// Attempts that got past the in-flight guard.
    pub total_attempts: u64,
    /// Attempts that ended up-to-date or applied a delta.
    pub successes: u64,
    /// Attempts that failed to fetch or apply.
    pub failures: u64,
    /// When the last successful attempt finished.
    #[serde(serialize_with = "as_unix_millis")]
    pub last_success_time: Option<SystemTime>,
    /// Message of the most recent failure, cleared by the next success.
    pub last_error: Option<String>,
}

impl SyncStats {
    pub(crate) fn record_attempt(&mut self) {
        self.total_attempts += 1;
    }

    pub(crate) fn record_success(&mut self) {
        self.successes += 1;
        self.last_success_time = Some(SystemTime::now());
        self.last_error = None;
    }

    pub(crate) fn record_failure(&mut self, message: String) {
        self.failures += 1;
        self.last_error = Some(message);
    }
}

fn as_unix_millis<S: Serializer>(time: &Option<SystemTime>, serializer: S) -> Result<S::Ok, S::Error> {
    match time {
        Some(time) => serializer.serialize_some(&unix_millis(*time)),
        None => serializer.serialize_none(),
    }
}
