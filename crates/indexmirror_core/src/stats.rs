//! Cache statistics.

use serde::Serialize;
use std::collections::BTreeMap;

/// Summary of the cache store contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    /// Whether a full load has completed.
    pub initialized: bool,
    /// Last full load or merge, as Unix milliseconds.
    pub last_updated: Option<u64>,
    /// Sum of collection lengths plus present singletons.
    pub total_records: usize,
    /// Record count per kind, keyed by reader name.
    pub entities: BTreeMap<&'static str, usize>,
}

impl CacheStats {
    /// Returns the count for one kind (0 if absent).
    pub fn count(&self, name: &str) -> usize {
        self.entities.get(name).copied().unwrap_or(0)
    }

    /// Returns true if the cache is initialized and holds at least one record.
    pub fn is_ready(&self) -> bool {
        self.initialized && self.total_records > 0
    }
}
