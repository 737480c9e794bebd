//! Cooperative stop rendezvous for long-running stream tasks.
//!
//! A stream task holds the session's stream-activity lock for as long as it
//! runs (through a [`StreamGuard`]). A stopper cancels the task's token and
//! then waits for that lock; getting it is the acknowledgement that the task
//! has yielded. The wait is bounded so a stuck task cannot wedge the stopper.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

/// Outcome of a stop request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStop {
    /// No stream was running.
    Idle,
    /// The running stream yielded.
    Acknowledged,
    /// The running stream did not yield within the bound.
    TimedOut,
}

/// Held by a running stream task; dropping it acknowledges any stop request.
#[derive(Debug)]
pub struct StreamGuard {
    _activity: OwnedMutexGuard<()>,
    token: CancellationToken,
}

impl StreamGuard {
    /// Whether the stream has been asked to stop.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the stream has been asked to stop.
    pub async fn cancelled(&self) {
        if self.is_stopped() {
            return;
        }
        self.token.cancelled().await;
    }
}

#[derive(Debug, Default)]
pub(crate) struct StreamSlot {
    activity: Arc<AsyncMutex<()>>,
    token: Mutex<CancellationToken>,
}

impl StreamSlot {
    /// Stop whatever is running and take the activity lock for a new stream.
    pub(crate) async fn begin(&self) -> StreamGuard {
        let token = CancellationToken::new();
        let previous = std::mem::replace(&mut *self.lock_token(), token.clone());
        previous.cancel();
        let activity = Arc::clone(&self.activity).lock_owned().await;
        StreamGuard {
            _activity: activity,
            token,
        }
    }

    pub(crate) async fn stop(&self, bound: Duration) -> StreamStop {
        if self.activity.try_lock().is_ok() {
            return StreamStop::Idle;
        }
        self.cancel();
        match timeout(bound, self.activity.lock()).await {
            Ok(_released) => StreamStop::Acknowledged,
            Err(_) => StreamStop::TimedOut,
        }
    }

    pub(crate) fn cancel(&self) {
        self.lock_token().cancel();
    }

    fn lock_token(&self) -> std::sync::MutexGuard<'_, CancellationToken> {
        self.token.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
