//! Synchronization progress tracking.
//!
//! The tracker is the single source of truth for how far the mirror is
//! synchronized. It is deliberately separate from the cache store, so
//! staleness and health never touch entity collections.

use crate::config::TrackerConfig;
use crate::error::CoreResult;
use crate::time::{elapsed_since, from_unix_millis, unix_millis};
use indexmirror_protocol::{is_valid_checkpoint, parse_checkpoint, Checkpoint};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::path::Path;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

/// One accepted checkpoint advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressEntry {
    /// When the advance was accepted.
    pub observed_at: SystemTime,
    /// Checkpoint before the advance.
    pub from: Checkpoint,
    /// Checkpoint after the advance.
    pub to: Checkpoint,
    /// `to - from`.
    pub delta: u64,
}

/// Point-in-time view of the tracker.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerStatus {
    /// Current checkpoint (0 if uninitialized).
    pub checkpoint: Checkpoint,
    /// Last initialization or advance, as Unix milliseconds.
    pub last_updated: Option<u64>,
    /// Milliseconds since `last_updated`.
    pub staleness_ms: Option<u64>,
    /// Number of entries in the history.
    pub total_advances: usize,
    /// Mean advance size over the history.
    pub average_advance: u64,
    /// Advances per minute over the most recent window.
    pub advances_per_minute: u64,
}

#[derive(Debug, Default)]
struct TrackerInner {
    checkpoint: Checkpoint,
    last_updated: Option<SystemTime>,
    history: VecDeque<ProgressEntry>,
}

/// Tracks the last synchronized checkpoint.
///
/// # Invariants
///
/// - The checkpoint only moves forward, except through [`reset`](Self::reset)
/// - Every accepted advance appends exactly one history entry
/// - The history never exceeds the configured capacity (FIFO)
#[derive(Debug)]
pub struct ProgressTracker {
    config: TrackerConfig,
    inner: RwLock<TrackerInner>,
}

impl ProgressTracker {
    /// Creates an uninitialized tracker with default configuration.
    pub fn new() -> Self {
        Self::with_config(TrackerConfig::default())
    }

    /// Creates an uninitialized tracker.
    pub fn with_config(config: TrackerConfig) -> Self {
        Self {
            config,
            inner: RwLock::new(TrackerInner::default()),
        }
    }

    /// Returns the current checkpoint (0 if uninitialized).
    pub fn current(&self) -> Checkpoint {
        self.inner.read().checkpoint
    }

    /// Sets the checkpoint once, from the uninitialized state.
    ///
    /// Returns false without touching anything if the tracker is already
    /// initialized or `value` is not a valid checkpoint.
    pub fn initialize(&self, value: Checkpoint) -> bool {
        let mut inner = self.inner.write();
        if inner.checkpoint != 0 {
            debug!(current = inner.checkpoint, value, "tracker already initialized");
            return false;
        }
        if !is_valid_checkpoint(value) {
            warn!(value, "refusing to initialize tracker with invalid checkpoint");
            return false;
        }
        inner.checkpoint = value;
        inner.last_updated = Some(SystemTime::now());
        info!(checkpoint = value, "progress tracker initialized");
        true
    }

    /// Moves the checkpoint forward to `candidate`.
    ///
    /// Returns false for invalid values, for the current value (no new
    /// blocks), and for older values (out-of-order data, never applied).
    pub fn advance(&self, candidate: Checkpoint) -> bool {
        self.advance_at(candidate, SystemTime::now())
    }

    fn advance_at(&self, candidate: Checkpoint, now: SystemTime) -> bool {
        if !is_valid_checkpoint(candidate) {
            warn!(candidate, "invalid checkpoint received");
            return false;
        }

        let mut inner = self.inner.write();
        let previous = inner.checkpoint;
        if candidate == previous {
            debug!(checkpoint = candidate, "no new blocks");
            return false;
        }
        if candidate < previous {
            warn!(candidate, current = previous, "checkpoint older than current, ignoring");
            return false;
        }

        inner.checkpoint = candidate;
        inner.last_updated = Some(now);
        inner.history.push_back(ProgressEntry {
            observed_at: now,
            from: previous,
            to: candidate,
            delta: candidate - previous,
        });
        while inner.history.len() > self.config.history_capacity {
            inner.history.pop_front();
        }

        info!(from = previous, to = candidate, "checkpoint advanced");
        true
    }

    /// Returns true if `latest` is ahead of the current checkpoint.
    pub fn has_new(&self, latest: Checkpoint) -> bool {
        latest > self.current()
    }

    /// Number of checkpoints the mirror is behind `latest`.
    pub fn behind(&self, latest: Checkpoint) -> u64 {
        latest.saturating_sub(self.current())
    }

    /// Wall-clock time since the last initialization or advance.
    pub fn staleness(&self) -> Option<Duration> {
        self.inner.read().last_updated.map(elapsed_since)
    }

    /// Returns true if the tracker has been updated within `max_age`.
    pub fn healthy(&self, max_age: Duration) -> bool {
        self.staleness().is_some_and(|age| age <= max_age)
    }

    /// Clears the checkpoint, timestamp and history.
    pub fn reset(&self) {
        *self.inner.write() = TrackerInner::default();
        info!("progress tracker reset");
    }

    /// Returns up to `count` most recent entries, oldest first.
    pub fn history(&self, count: usize) -> Vec<ProgressEntry> {
        let inner = self.inner.read();
        let skip = inner.history.len().saturating_sub(count);
        inner.history.iter().skip(skip).copied().collect()
    }

    /// Mean advance size over the history, rounded (0 when empty).
    pub fn average_advance(&self) -> u64 {
        let inner = self.inner.read();
        if inner.history.is_empty() {
            return 0;
        }
        let total: u64 = inner.history.iter().map(|e| e.delta).sum();
        (total as f64 / inner.history.len() as f64).round() as u64
    }

    /// Advances per minute over the most recent window, rounded.
    ///
    /// Zero with fewer than two entries or when they share a timestamp.
    pub fn advances_per_minute(&self) -> u64 {
        let recent = self.history(self.config.rate_window);
        let (Some(first), Some(last)) = (recent.first(), recent.last()) else {
            return 0;
        };
        if recent.len() < 2 {
            return 0;
        }
        let span = last
            .observed_at
            .duration_since(first.observed_at)
            .unwrap_or(Duration::ZERO);
        if span.is_zero() {
            return 0;
        }
        let minutes = span.as_secs_f64() / 60.0;
        ((recent.len() - 1) as f64 / minutes).round() as u64
    }

    /// Returns a snapshot of the tracker.
    pub fn status(&self) -> TrackerStatus {
        let (checkpoint, last_updated, total_advances) = {
            let inner = self.inner.read();
            (inner.checkpoint, inner.last_updated, inner.history.len())
        };
        TrackerStatus {
            checkpoint,
            last_updated: last_updated.map(unix_millis),
            staleness_ms: last_updated
                .map(|t| u64::try_from(elapsed_since(t).as_millis()).unwrap_or(u64::MAX)),
            total_advances,
            average_advance: self.average_advance(),
            advances_per_minute: self.advances_per_minute(),
        }
    }

    // === Persistence ===

    /// Exports the checkpoint, timestamp and most recent history entries.
    pub fn export_state(&self) -> Value {
        let inner = self.inner.read();
        let skip = inner
            .history
            .len()
            .saturating_sub(self.config.exported_history);
        let state = ExportedState {
            checkpoint: inner.checkpoint,
            last_updated: inner.last_updated.map(unix_millis),
            history: inner
                .history
                .iter()
                .skip(skip)
                .map(|e| ExportedEntry {
                    observed_at: unix_millis(e.observed_at),
                    from: e.from,
                    to: e.to,
                    delta: e.delta,
                })
                .collect(),
        };
        serde_json::to_value(state).unwrap_or(Value::Null)
    }

    /// Replaces the tracker state from an exported value.
    ///
    /// Missing or malformed fields fall back to defaults individually;
    /// malformed history entries are skipped. Returns false, changing
    /// nothing, if `state` is not an object.
    pub fn import_state(&self, state: &Value) -> bool {
        let Some(object) = state.as_object() else {
            warn!("ignoring tracker state that is not an object");
            return false;
        };

        let checkpoint = object
            .get("checkpoint")
            .and_then(parse_checkpoint)
            .filter(|c| is_valid_checkpoint(*c))
            .unwrap_or(0);
        let last_updated = object
            .get("lastUpdated")
            .and_then(Value::as_u64)
            .map(from_unix_millis);
        let mut history: VecDeque<ProgressEntry> = object
            .get("history")
            .and_then(Value::as_array)
            .map(|entries| entries.iter().filter_map(parse_entry).collect())
            .unwrap_or_default();
        while history.len() > self.config.history_capacity {
            history.pop_front();
        }

        *self.inner.write() = TrackerInner {
            checkpoint,
            last_updated,
            history,
        };
        info!(checkpoint, "progress tracker state imported");
        true
    }

    /// Writes [`export_state`](Self::export_state) to `path` as JSON.
    pub fn save_to(&self, path: &Path) -> CoreResult<()> {
        let bytes = serde_json::to_vec_pretty(&self.export_state())?;
        std::fs::write(path, bytes)?;
        debug!(path = %path.display(), "tracker state saved");
        Ok(())
    }

    /// Imports tracker state from a JSON file written by
    /// [`save_to`](Self::save_to).
    pub fn load_from(&self, path: &Path) -> CoreResult<bool> {
        let bytes = std::fs::read(path)?;
        let value: Value = serde_json::from_slice(&bytes)?;
        Ok(self.import_state(&value))
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExportedState {
    checkpoint: Checkpoint,
    last_updated: Option<u64>,
    history: Vec<ExportedEntry>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExportedEntry {
    observed_at: u64,
    from: Checkpoint,
    to: Checkpoint,
    delta: u64,
}

fn parse_entry(value: &Value) -> Option<ProgressEntry> {
    let observed_at = from_unix_millis(value.get("observedAt")?.as_u64()?);
    let from = value.get("from").and_then(parse_checkpoint)?;
    let to = value.get("to").and_then(parse_checkpoint)?;
    if to <= from {
        return None;
    }
    Some(ProgressEntry {
        observed_at,
        from,
        to,
        delta: to - from,
    })
}
