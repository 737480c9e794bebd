//! One live duplex connection for one (user, session token) pair.

use std::fmt;
use std::sync::Weak;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{SessionError, SessionResult};
use crate::messages::{Notification, UserConnMsg};
use crate::registry::ConnectionRegistry;
use crate::stream::{StreamGuard, StreamSlot, StreamStop};
use crate::transport::SessionTransport;

const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_STOP_STREAM_TIMEOUT: Duration = Duration::from_secs(5);

const STATE_ACTIVE: u8 = 0;
const STATE_CLOSING: u8 = 1;
const STATE_CLOSED: u8 = 2;

/// Per-session timing bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Deadline for a single transport write.
    pub write_timeout: Duration,
    /// How long [`SessionConnection::stop_stream`] waits for a stream to yield.
    pub stop_stream_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            stop_stream_timeout: DEFAULT_STOP_STREAM_TIMEOUT,
        }
    }
}

/// Who is on the other end of a session, as established by the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    /// Owner of the session.
    pub username: String,
    /// Session token; unique per user among live sessions.
    pub token: String,
    /// Whether the session carries admin rights.
    pub is_admin: bool,
    /// Peer address of the connection.
    pub remote_addr: String,
}

impl SessionIdentity {
    /// Identity for a non-admin session.
    #[must_use]
    pub fn new(
        username: impl Into<String>,
        token: impl Into<String>,
        remote_addr: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            token: token.into(),
            is_admin: false,
            remote_addr: remote_addr.into(),
        }
    }

    /// Grant or revoke admin rights.
    #[must_use]
    pub const fn admin(mut self, is_admin: bool) -> Self {
        self.is_admin = is_admin;
        self
    }
}

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Accepting writes.
    Active,
    /// A close is in progress.
    Closing,
    /// The transport has been closed.
    Closed,
}

impl SessionState {
    const fn from_raw(raw: u8) -> Self {
        match raw {
            STATE_ACTIVE => Self::Active,
            STATE_CLOSING => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// Live session registered in a [`ConnectionRegistry`].
///
/// Every transport write happens while holding the session's write lock, so
/// concurrent senders never interleave frames. Closing is idempotent and
/// always asks the owning registry to drop the session.
pub struct SessionConnection {
    id: Uuid,
    identity: SessionIdentity,
    connected_at: DateTime<Utc>,
    transport: Mutex<Box<dyn SessionTransport>>,
    state: AtomicU8,
    stream: StreamSlot,
    config: SessionConfig,
    registry: Weak<ConnectionRegistry>,
}

impl fmt::Debug for SessionConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConnection")
            .field("id", &self.id)
            .field("username", &self.identity.username)
            .field("token", &self.identity.token)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl SessionConnection {
    pub(crate) fn new(
        identity: SessionIdentity,
        transport: Box<dyn SessionTransport>,
        config: SessionConfig,
        registry: Weak<ConnectionRegistry>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            identity,
            connected_at: Utc::now(),
            transport: Mutex::new(transport),
            state: AtomicU8::new(STATE_ACTIVE),
            stream: StreamSlot::default(),
            config,
            registry,
        }
    }

    /// Unique id of this connection; distinguishes it from a successor with the same token.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Owner of the session.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.identity.username
    }

    /// Session token.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.identity.token
    }

    /// Whether the session carries admin rights.
    #[must_use]
    pub const fn is_admin(&self) -> bool {
        self.identity.is_admin
    }

    /// Peer address of the connection.
    #[must_use]
    pub fn remote_addr(&self) -> &str {
        &self.identity.remote_addr
    }

    /// When the session was established.
    #[must_use]
    pub const fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        SessionState::from_raw(self.state.load(Ordering::Acquire))
    }

    /// Whether the session still accepts writes.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state() == SessionState::Active
    }

    /// Admin listing entry for this session.
    #[must_use]
    pub fn describe(&self) -> UserConnMsg {
        UserConnMsg {
            username: self.identity.username.clone(),
            token: self.identity.token.clone(),
            is_admin: self.identity.is_admin,
            time: self.connected_at,
            remote_addr: self.identity.remote_addr.clone(),
        }
    }

    /// Write one text frame.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] when the session no longer accepts
    /// writes. A transport failure or a write exceeding the deadline closes
    /// and deregisters the session before the error is returned.
    pub async fn send(&self, payload: &str) -> SessionResult<()> {
        let result = {
            let mut transport = self.transport.lock().await;
            if !self.is_active() {
                return Err(SessionError::Closed {
                    username: self.identity.username.clone(),
                    token: self.identity.token.clone(),
                });
            }
            match timeout(self.config.write_timeout, transport.send_text(payload)).await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(source)) => Err(SessionError::Write {
                    username: self.identity.username.clone(),
                    source,
                }),
                Err(_) => Err(SessionError::WriteTimeout {
                    username: self.identity.username.clone(),
                    timeout: self.config.write_timeout,
                }),
            }
        };

        if let Err(err) = &result {
            warn!(
                user = %self.identity.username,
                remote_addr = %self.identity.remote_addr,
                error = %err,
                "session write failed; dropping session"
            );
            self.close().await;
        }
        result
    }

    /// Encode `frame` as JSON and write it.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Encode`] when serialisation fails, otherwise
    /// the same errors as [`Self::send`].
    pub async fn send_frame<T: Serialize + ?Sized>(&self, frame: &T) -> SessionResult<()> {
        let payload =
            serde_json::to_string(frame).map_err(|source| SessionError::Encode { source })?;
        self.send(&payload).await
    }

    /// Write a [`Notification`].
    ///
    /// # Errors
    ///
    /// Same as [`Self::send_frame`].
    pub async fn send_notification(&self, notification: &Notification) -> SessionResult<()> {
        self.send_frame(notification).await
    }

    /// Claim the stream slot for a long-running stream task.
    ///
    /// Any stream already running on this session is asked to stop first;
    /// the returned guard is granted once it has yielded.
    pub async fn begin_stream(&self) -> StreamGuard {
        self.stream.begin().await
    }

    /// Ask the running stream task, if any, to stop and wait (bounded) for it to yield.
    pub async fn stop_stream(&self) -> StreamStop {
        let outcome = self.stream.stop(self.config.stop_stream_timeout).await;
        if outcome == StreamStop::TimedOut {
            warn!(
                user = %self.identity.username,
                timeout = ?self.config.stop_stream_timeout,
                "stream did not yield to stop request"
            );
        }
        outcome
    }

    /// Close the transport and deregister the session.
    ///
    /// Only the first call closes the transport; every call requests registry
    /// removal, which is itself idempotent.
    pub async fn close(&self) {
        if self
            .state
            .compare_exchange(
                STATE_ACTIVE,
                STATE_CLOSING,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
        {
            self.stream.cancel();
            let mut transport = self.transport.lock().await;
            if let Err(err) = transport.close().await {
                debug!(user = %self.identity.username, error = %err, "transport close failed");
            }
            self.state.store(STATE_CLOSED, Ordering::Release);
        }

        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self);
        }
    }
}
