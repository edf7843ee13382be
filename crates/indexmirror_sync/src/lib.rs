//! # indexmirror sync
//!
//! Remote source client and sync driver for indexmirror.
//!
//! This crate provides:
//! - `RemoteSource`: the async seam to the subgraph (full snapshot, delta,
//!   current checkpoint)
//! - `GraphqlSource`: GraphQL over HTTP with fixed-delay retry and a
//!   per-attempt timeout, over a pluggable `HttpClient`
//! - `SyncDriver`: initial load, scheduled deltas, force refresh, status
//!   and health reporting
//!
//! ## Architecture
//!
//! The driver follows a **load-then-follow** model:
//! 1. Fetch a full snapshot and load it into the cache store
//! 2. Initialize the progress tracker from the snapshot's checkpoint
//! 3. On every tick, fetch the delta since the tracked checkpoint, advance
//!    the tracker, and merge the delta only if the advance was accepted
//!
//! ## Key Invariants
//!
//! - At most one delta attempt is in flight
//! - A failed attempt changes neither the cache nor the checkpoint
//! - Failures during scheduled sync never stop the schedule
//! - A response without a checkpoint is a failure, never an empty success

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod driver;
mod error;
mod http;
mod source;
mod stats;

pub use config::{RetryConfig, SyncConfig, MAX_PAGE_SIZE};
pub use driver::{DriverState, DriverStatus, HealthReport, SyncDriver, SyncOutcome};
pub use error::{SyncError, SyncResult};
pub use http::{GraphqlSource, HttpClient, ReqwestClient};
pub use source::{MockResponse, MockSource, RemoteSource};
pub use stats::SyncStats;
