//! Process-wide directory of live sessions.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use futures_util::future::join_all;
use swarmhub_telemetry::Metrics;
use tracing::{info, warn};

use crate::error::{SessionError, SessionResult};
use crate::messages::{DataMsg, Notification, UserConnMsg};
use crate::session::{SessionConfig, SessionConnection, SessionIdentity};
use crate::stream::StreamStop;
use crate::transport::SessionTransport;

/// Frame type of the admin connection listing.
pub const USER_CONN_FRAME: &str = "userconn";

type UserSessions = HashMap<String, Arc<SessionConnection>>;

/// Directory `username -> session token -> session`.
///
/// At most one session exists per (username, token): registering a duplicate
/// closes the previous occupant before the new one is inserted. The directory
/// lock is never held across an `.await`.
#[derive(Debug)]
pub struct ConnectionRegistry {
    sessions: RwLock<HashMap<String, UserSessions>>,
    config: SessionConfig,
    metrics: Option<Metrics>,
}

impl ConnectionRegistry {
    /// Empty registry whose sessions use `config`.
    #[must_use]
    pub fn new(config: SessionConfig) -> Arc<Self> {
        Self::build(config, None)
    }

    /// Empty registry that reports its population to `metrics`.
    #[must_use]
    pub fn with_metrics(config: SessionConfig, metrics: Metrics) -> Arc<Self> {
        Self::build(config, Some(metrics))
    }

    fn build(config: SessionConfig, metrics: Option<Metrics>) -> Arc<Self> {
        Arc::new(Self {
            sessions: RwLock::new(HashMap::new()),
            config,
            metrics,
        })
    }

    /// Build a session owned by this registry without registering it.
    pub fn create_session<T: SessionTransport>(
        self: &Arc<Self>,
        identity: SessionIdentity,
        transport: T,
    ) -> Arc<SessionConnection> {
        Arc::new(SessionConnection::new(
            identity,
            Box::new(transport),
            self.config,
            Arc::downgrade(self),
        ))
    }

    /// Build a session for a completed handshake and register it.
    pub async fn connect<T: SessionTransport>(
        self: &Arc<Self>,
        identity: SessionIdentity,
        transport: T,
    ) -> Arc<SessionConnection> {
        let session = self.create_session(identity, transport);
        self.add(Arc::clone(&session)).await;
        session
    }

    /// Register `conn`, closing any session already holding its (username, token).
    pub async fn add(&self, conn: Arc<SessionConnection>) {
        loop {
            let previous = {
                let mut sessions = self.write();
                let user = sessions.entry(conn.username().to_string()).or_default();
                match user.get(conn.token()) {
                    Some(existing) if existing.id() == conn.id() => return,
                    Some(_) => user.remove(conn.token()),
                    None => {
                        user.insert(conn.token().to_string(), Arc::clone(&conn));
                        None
                    }
                }
            };
            let Some(previous) = previous else { break };
            info!(
                user = %previous.username(),
                remote_addr = %previous.remote_addr(),
                "session token reused; closing previous session"
            );
            previous.close().await;
        }

        info!(
            user = %conn.username(),
            remote_addr = %conn.remote_addr(),
            admin = conn.is_admin(),
            "user connected"
        );
        self.refresh_population();
    }

    /// Snapshot of the sessions of `username`; `None` when the user has none.
    #[must_use]
    pub fn get(&self, username: &str) -> Option<Vec<Arc<SessionConnection>>> {
        self.read()
            .get(username)
            .filter(|user| !user.is_empty())
            .map(|user| user.values().cloned().collect())
    }

    /// Drop `conn` if it is still the registered session for its (username, token).
    ///
    /// Returns whether an entry was removed.
    pub fn remove(&self, conn: &SessionConnection) -> bool {
        let removed = {
            let mut sessions = self.write();
            let Some(user) = sessions.get_mut(conn.username()) else {
                return false;
            };
            let removed = match user.get(conn.token()) {
                Some(existing) if existing.id() == conn.id() => {
                    user.remove(conn.token()).is_some()
                }
                _ => false,
            };
            if user.is_empty() {
                sessions.remove(conn.username());
            }
            removed
        };

        if removed {
            info!(
                user = %conn.username(),
                remote_addr = %conn.remote_addr(),
                "user disconnected"
            );
            self.refresh_population();
        }
        removed
    }

    /// Close every session of `username`. Returns how many were closed.
    pub async fn remove_user(&self, username: &str) -> usize {
        let Some(sessions) = self.get(username) else {
            return 0;
        };
        join_all(sessions.iter().map(|session| session.close())).await;
        sessions.len()
    }

    /// Ask every session of `username` to stop its running stream.
    pub async fn stop_stream_by_user(&self, username: &str) -> Vec<StreamStop> {
        let Some(sessions) = self.get(username) else {
            return Vec::new();
        };
        join_all(sessions.iter().map(|session| session.stop_stream())).await
    }

    /// Send `notification` to every session of `username`.
    ///
    /// Returns the number of sessions that accepted the frame. A session whose
    /// write fails is dropped; the others are unaffected.
    pub async fn broadcast(&self, username: &str, notification: &Notification) -> usize {
        match serde_json::to_string(notification) {
            Ok(payload) => self.broadcast_raw(username, &payload).await,
            Err(err) => {
                warn!(user = %username, error = %err, "failed to encode notification");
                0
            }
        }
    }

    /// Send an already encoded frame to every session of `username`.
    pub async fn broadcast_raw(&self, username: &str, payload: &str) -> usize {
        let Some(sessions) = self.get(username) else {
            return 0;
        };
        let results = join_all(sessions.iter().map(|session| session.send(payload))).await;

        let delivered = results.iter().filter(|result| result.is_ok()).count();
        if let Some(metrics) = self.metrics.as_ref() {
            metrics.add_notifications_sent(delivered);
            for _ in delivered..results.len() {
                metrics.inc_session_send_failure();
            }
        }
        delivered
    }

    /// Every live session, for the admin listing.
    #[must_use]
    pub fn list_users(&self) -> DataMsg<Vec<UserConnMsg>> {
        let mut entries: Vec<UserConnMsg> = self
            .read()
            .values()
            .flat_map(|user| user.values().map(|session| session.describe()))
            .collect();
        entries.sort_by(|a, b| {
            a.username
                .cmp(&b.username)
                .then_with(|| a.time.cmp(&b.time))
                .then_with(|| a.token.cmp(&b.token))
        });
        DataMsg::new(USER_CONN_FRAME, entries)
    }

    /// Admin listing encoded as a frame.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Encode`] when serialisation fails.
    pub fn list_users_frame(&self) -> SessionResult<String> {
        serde_json::to_string(&self.list_users()).map_err(|source| SessionError::Encode { source })
    }

    /// Number of live sessions across all users.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.read().values().map(HashMap::len).sum()
    }

    /// Number of users with at least one live session.
    #[must_use]
    pub fn user_count(&self) -> usize {
        self.read().len()
    }

    /// Timing bounds applied to sessions of this registry.
    #[must_use]
    pub const fn config(&self) -> SessionConfig {
        self.config
    }

    fn refresh_population(&self) {
        if let Some(metrics) = self.metrics.as_ref() {
            let (sessions, users) = {
                let guard = self.read();
                (guard.values().map(HashMap::len).sum(), guard.len())
            };
            metrics.set_hub_population(sessions, users);
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, UserSessions>> {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, UserSessions>> {
        self.sessions.write().unwrap_or_else(PoisonError::into_inner)
    }
}
