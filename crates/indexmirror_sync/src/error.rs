//! Error types for the sync layer.

use indexmirror_protocol::ProtocolError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while fetching or applying remote data.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// An attempt exceeded its time budget.
    #[error("request timed out")]
    Timeout,

    /// The endpoint answered with a non-success status.
    #[error("http status {status}")]
    Http {
        /// Status code.
        status: u16,
    },

    /// The remote reported GraphQL errors inline.
    #[error("remote error: {0}")]
    Remote(String),

    /// The response could not be turned into a payload.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// Every attempt failed.
    #[error("giving up after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        /// Attempts made.
        attempts: u32,
        /// The last failure.
        last_error: Box<SyncError>,
    },
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if another attempt may succeed.
    ///
    /// Client errors (4xx) are final except 408 and 429.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Timeout => true,
            SyncError::Http { status } => !(400..500).contains(status) || matches!(status, 408 | 429),
            SyncError::Remote(_) => true,
            SyncError::MalformedPayload(_) => true,
            SyncError::RetriesExhausted { .. } => false,
        }
    }
}

impl From<ProtocolError> for SyncError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Remote(message) => SyncError::Remote(message),
            other => SyncError::MalformedPayload(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(SyncError::transport_retryable("connection reset").is_retryable());
        assert!(!SyncError::transport_fatal("bad request body").is_retryable());
        assert!(SyncError::Timeout.is_retryable());
        assert!(SyncError::Http { status: 502 }.is_retryable());
        assert!(SyncError::Http { status: 429 }.is_retryable());
        assert!(SyncError::Http { status: 408 }.is_retryable());
        assert!(!SyncError::Http { status: 404 }.is_retryable());
        assert!(SyncError::Remote("indexing error".into()).is_retryable());
        assert!(SyncError::from(ProtocolError::MissingCheckpoint).is_retryable());
    }

    #[test]
    fn protocol_errors_map() {
        let err = SyncError::from(ProtocolError::Remote("boom".into()));
        assert!(matches!(err, SyncError::Remote(ref m) if m == "boom"));

        let err = SyncError::from(ProtocolError::MissingData);
        assert!(matches!(err, SyncError::MalformedPayload(_)));
    }

    #[test]
    fn error_display() {
        let err = SyncError::RetriesExhausted {
            attempts: 3,
            last_error: Box::new(SyncError::Timeout),
        };
        assert_eq!(err.to_string(), "giving up after 3 attempts: request timed out");
        assert!(!err.is_retryable());
    }
}
