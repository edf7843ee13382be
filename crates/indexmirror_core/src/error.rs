//! Error types for indexmirror core.

use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in core operations.
///
/// Validation failures (bad checkpoints, unknown kinds on read paths) are not
/// errors; they are sentinel returns. These variants cover the I/O edges.
#[derive(Debug, Error)]
pub enum CoreError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON encoding or decoding error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Entity kind not found.
    #[error("unknown entity kind: {name}")]
    UnknownKind {
        /// Name that was looked up.
        name: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = CoreError::UnknownKind {
            name: "widgets".into(),
        };
        assert_eq!(err.to_string(), "unknown entity kind: widgets");

        let err: CoreError = io::Error::new(io::ErrorKind::NotFound, "gone").into();
        assert!(err.to_string().starts_with("I/O error"));
    }
}
