//! # indexmirror core
//!
//! In-process mirror of a subgraph's entities.
//!
//! This crate provides:
//! - `ProgressTracker`: the last synchronized checkpoint, a bounded history
//!   of advances, staleness and health
//! - `CacheStore`: per-kind entity collections with full replace and
//!   id-deduplicated merge, plus read accessors
//! - Derived time-series reads (latest price, historical buckets)
//! - Best-effort persistence of tracker state
//!
//! ## Key Invariants
//!
//! - The checkpoint never decreases except through an explicit reset
//! - Collections are unique by id and keep arrival order
//! - `total_records` is always recomputed, never incremented
//! - Readers see a kind either before or after a merge, never halfway

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod stats;
mod store;
mod time;
mod tracker;

pub use config::TrackerConfig;
pub use error::{CoreError, CoreResult};
pub use stats::CacheStats;
pub use store::{CacheStore, Collection, MergeCounts, PricePoint, SeriesPoint, DEFAULT_SERIES_LIMIT};
pub use time::{from_unix_millis, unix_millis};
pub use tracker::{ProgressEntry, ProgressTracker, TrackerStatus};

pub use indexmirror_protocol::{Checkpoint, Entity, EntityKind, Granularity, MergePolicy, Payload};
