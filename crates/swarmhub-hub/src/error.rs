//! Session error primitives.

use std::error::Error as StdError;
use std::time::Duration;

use thiserror::Error;

/// Failure reported by a [`SessionTransport`](crate::SessionTransport).
#[derive(Debug, Error)]
#[error("session transport failed")]
pub struct TransportError {
    /// Operation identifier.
    pub operation: &'static str,
    #[source]
    source: Box<dyn StdError + Send + Sync>,
}

impl TransportError {
    /// Wrap an underlying transport failure.
    pub fn new(operation: &'static str, source: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self {
            operation,
            source: source.into(),
        }
    }
}

/// Errors surfaced by session writes.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The session is closing or closed and accepts no more writes.
    #[error("session is closed")]
    Closed {
        /// Owner of the session.
        username: String,
        /// Session token.
        token: String,
    },
    /// The write did not complete within the configured deadline.
    #[error("session write timed out")]
    WriteTimeout {
        /// Owner of the session.
        username: String,
        /// Deadline that elapsed.
        timeout: Duration,
    },
    /// The transport rejected the write.
    #[error("session write failed")]
    Write {
        /// Owner of the session.
        username: String,
        /// Underlying transport failure.
        #[source]
        source: TransportError,
    },
    /// A frame could not be encoded.
    #[error("session frame encoding failed")]
    Encode {
        /// Underlying serde error.
        #[source]
        source: serde_json::Error,
    },
}

/// Result alias for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn transport_error_keeps_source() {
        let err = TransportError::new("ws.send", io::Error::other("broken pipe"));
        assert_eq!(err.operation, "ws.send");
        assert_eq!(err.to_string(), "session transport failed");
        assert!(err.source().is_some());
    }

    #[test]
    fn session_error_messages_are_constant() {
        let closed = SessionError::Closed {
            username: "alice".into(),
            token: "t1".into(),
        };
        assert_eq!(closed.to_string(), "session is closed");

        let write = SessionError::Write {
            username: "alice".into(),
            source: TransportError::new("ws.send", "reset"),
        };
        assert_eq!(write.to_string(), "session write failed");
        assert!(write.source().is_some());
    }
}
