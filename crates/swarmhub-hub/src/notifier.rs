//! Formats user notifications and mirrors lifecycle transitions to the bus.

use std::sync::Arc;

use swarmhub_events::{EventBusPublisher, EventKind};
use tracing::debug;

use crate::messages::Notification;
use crate::registry::ConnectionRegistry;

/// Fan-out entry point used by request handlers and engine callbacks.
#[derive(Clone, Debug)]
pub struct EventNotifier {
    registry: Arc<ConnectionRegistry>,
    publisher: EventBusPublisher,
}

impl EventNotifier {
    /// Notifier broadcasting through `registry` and publishing through `publisher`.
    #[must_use]
    pub const fn new(registry: Arc<ConnectionRegistry>, publisher: EventBusPublisher) -> Self {
        Self {
            registry,
            publisher,
        }
    }

    /// Registry notifications are delivered through.
    #[must_use]
    pub const fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Send a plain notification to every session of `user`.
    ///
    /// An empty `user` is a no-op. Returns the number of sessions reached.
    pub async fn send_msg(&self, user: &str, kind: &str, state: &str, message: &str) -> usize {
        if user.is_empty() {
            return 0;
        }
        self.registry
            .broadcast(user, &Notification::new(kind, state, message))
            .await
    }

    /// Send a notification about transfer `hash` and publish its lifecycle event.
    ///
    /// When `label` names a lifecycle transition the matching event is queued
    /// on the bus before, and independently of, the broadcast. Publication
    /// happens even when `user` is empty.
    pub async fn send_msg_with_hash(
        &self,
        user: &str,
        kind: &str,
        hash: &str,
        state: &str,
        label: &str,
    ) -> usize {
        if let Some(event) = EventKind::from_label(label)
            && !self.publisher.publish(hash, event)
        {
            debug!(hash = %hash, kind = %event, "lifecycle event not queued");
        }

        if user.is_empty() {
            return 0;
        }
        self.registry
            .broadcast(user, &Notification::with_hash(kind, state, hash, label))
            .await
    }
}
