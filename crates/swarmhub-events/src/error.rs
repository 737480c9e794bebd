//! Event bus error primitives.

use std::io;

use thiserror::Error;

/// Error emitted when talking to the external bus fails.
#[derive(Debug, Error)]
pub enum EventBusError {
    /// The producer connection could not be established.
    #[error("event bus connection failed")]
    Connect {
        /// Address of the bus daemon.
        address: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The producer connection did not complete in time.
    #[error("event bus connection timed out")]
    ConnectTimeout {
        /// Address of the bus daemon.
        address: String,
    },
    /// Reading from or writing to the bus connection failed.
    #[error("event bus io failed")]
    Io {
        /// Operation identifier.
        operation: &'static str,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// A publish exchange did not complete in time.
    #[error("event bus operation timed out")]
    Timeout {
        /// Operation identifier.
        operation: &'static str,
    },
    /// The bus answered a publish with an error frame.
    #[error("event bus rejected publish")]
    Rejected {
        /// Topic the publish targeted.
        topic: String,
        /// Error text returned by the bus.
        reason: String,
    },
    /// The bus sent something the producer does not understand.
    #[error("event bus protocol violation")]
    Protocol {
        /// Machine-readable reason.
        reason: &'static str,
    },
    /// Encoding the event payload failed.
    #[error("event payload encoding failed")]
    Encode {
        /// Underlying serde error.
        #[source]
        source: serde_json::Error,
    },
}

/// Result wrapper for event bus operations.
pub type EventBusResult<T> = Result<T, EventBusError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn event_bus_error_display_and_source() {
        let connect = EventBusError::Connect {
            address: "127.0.0.1:4150".into(),
            source: io::Error::other("refused"),
        };
        assert_eq!(connect.to_string(), "event bus connection failed");
        assert!(connect.source().is_some());

        let rejected = EventBusError::Rejected {
            topic: "torrent".into(),
            reason: "E_BAD_TOPIC".into(),
        };
        assert_eq!(rejected.to_string(), "event bus rejected publish");
        assert!(rejected.source().is_none());
    }
}
