#![forbid(unsafe_code)]
#![warn(
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    rustdoc::broken_intra_doc_links,
    missing_docs
)]

//! Real-time connection hub.
//!
//! Tracks every live duplex session per user in a [`ConnectionRegistry`],
//! serialises concurrent writers onto each [`SessionConnection`], exposes a
//! cooperative stop primitive for long-running stream tasks, and fans
//! lifecycle notifications out through the [`EventNotifier`].

pub mod error;
pub mod messages;
pub mod notifier;
pub mod registry;
pub mod session;
pub mod stream;
pub mod transport;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{SessionError, SessionResult, TransportError};
pub use messages::{DataMsg, Notification, STATE_ERROR, STATE_SUCCESS, TYPE_RESP, UserConnMsg};
pub use notifier::EventNotifier;
pub use registry::ConnectionRegistry;
pub use session::{SessionConfig, SessionConnection, SessionIdentity, SessionState};
pub use stream::{StreamGuard, StreamStop};
pub use transport::SessionTransport;
