//! Error types for payload decoding.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while decoding a subgraph response.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The remote reported GraphQL errors inline.
    #[error("remote error: {0}")]
    Remote(String),

    /// The response carried no `data` object.
    #[error("response contained no data")]
    MissingData,

    /// The response lacked a parseable `_meta.block.number`.
    #[error("response contained no parseable checkpoint")]
    MissingCheckpoint,

    /// The `data` member was not a JSON object.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// The body was not valid JSON.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
