//! # indexmirror protocol
//!
//! Data types shared by the cache and the sync engine.
//!
//! This crate provides:
//! - `Checkpoint` helpers (block height validation and parsing)
//! - `Entity` for opaque records keyed by a string `id`
//! - The entity-kind table with per-kind merge policies
//! - `Payload` decoded from a subgraph response
//! - GraphQL query documents and the response envelope
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod checkpoint;
mod entity;
mod error;
mod kind;
mod payload;
pub mod queries;

pub use checkpoint::{is_valid_checkpoint, parse_checkpoint, Checkpoint, CHECKPOINT_CEILING};
pub use entity::{as_f64, Entity};
pub use error::{ProtocolError, ProtocolResult};
pub use kind::{EntityKind, Granularity, KindSpec, MergePolicy, Shape, KINDS};
pub use payload::Payload;
pub use queries::{GraphqlError, GraphqlRequest, GraphqlResponse};
