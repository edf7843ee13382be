//! Checkpoint values reported by the remote indexer.

use serde_json::Value;

/// Remote progress marker (a block height). Zero means "uninitialized".
pub type Checkpoint = u64;

/// Exclusive upper bound for checkpoints.
///
/// The remote speaks JSON, so anything at or above `2^53 - 1` cannot be
/// represented exactly on the other side either.
pub const CHECKPOINT_CEILING: Checkpoint = (1 << 53) - 1;

/// Returns true if `value` may be stored as a checkpoint.
pub fn is_valid_checkpoint(value: Checkpoint) -> bool {
    value > 0 && value < CHECKPOINT_CEILING
}

/// Parses a checkpoint from a JSON value.
///
/// Accepts non-negative integers and integer strings. Fractional numbers,
/// negative numbers and anything else yield `None`.
pub fn parse_checkpoint(value: &Value) -> Option<Checkpoint> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
}
