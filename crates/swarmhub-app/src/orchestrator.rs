//! Workflow orchestration over the engine and the notifier.
//!
//! Every successful user action is reported to all sessions of the acting
//! user with a lifecycle label, which the notifier also mirrors to the bus.
//! Engine-initiated changes (metadata loaded, transfer completed) reach every
//! owner of the transfer and publish once per change.

use std::sync::Arc;

use async_trait::async_trait;
use swarmhub_events::EventKind;
use swarmhub_hub::{EventNotifier, Notification, STATE_SUCCESS, TYPE_RESP};
use swarmhub_torrent_core::{
    EngineEvent, FsEntry, InfoHash, TorrentEngine, TorrentResult, TorrentSpec, TorrentStatus,
    TorrentWorkflow,
};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::webhook::CompletionHook;

/// Coordinates engine calls with user notifications and bus events.
pub struct TorrentOrchestrator<E>
where
    E: TorrentEngine + 'static,
{
    engine: Arc<E>,
    notifier: EventNotifier,
    hook: Option<CompletionHook>,
}

impl<E> TorrentOrchestrator<E>
where
    E: TorrentEngine + 'static,
{
    /// Construct an orchestrator over `engine`.
    #[must_use]
    pub const fn new(engine: Arc<E>, notifier: EventNotifier, hook: Option<CompletionHook>) -> Self {
        Self {
            engine,
            notifier,
            hook,
        }
    }

    /// Underlying engine.
    #[must_use]
    pub const fn engine(&self) -> &Arc<E> {
        &self.engine
    }

    async fn report(&self, user: &str, hash: InfoHash, kind: EventKind) {
        let delivered = self
            .notifier
            .send_msg_with_hash(user, TYPE_RESP, &hash.to_hex(), STATE_SUCCESS, kind.label())
            .await;
        debug!(user = %user, hash = %hash, kind = %kind, delivered, "lifecycle result reported");
    }

    /// Tell every owner about an engine-initiated change; the bus sees it once.
    async fn announce(&self, users: &[String], hash: InfoHash, kind: EventKind) {
        let hex = hash.to_hex();
        let (first, rest) = users.split_first().map_or(("", &[][..]), |(first, rest)| {
            (first.as_str(), rest)
        });
        self.notifier
            .send_msg_with_hash(first, TYPE_RESP, &hex, STATE_SUCCESS, kind.label())
            .await;
        let notification = Notification::with_hash(TYPE_RESP, STATE_SUCCESS, hex, kind.label());
        for user in rest {
            self.notifier.registry().broadcast(user, &notification).await;
        }
    }

    async fn handle_engine_event(&self, event: EngineEvent) {
        match event {
            EngineEvent::Loaded { hash, users } => {
                info!(hash = %hash, owners = users.len(), "transfer metadata loaded");
                self.announce(&users, hash, EventKind::Loaded).await;
            }
            EngineEvent::Completed { hash, name, users } => {
                info!(hash = %hash, name = %name, owners = users.len(), "transfer completed");
                self.announce(&users, hash, EventKind::Completed).await;
                if let Some(hook) = self.hook.as_ref() {
                    hook.spawn_notify(hash, name);
                }
            }
        }
    }

    /// Spawn the task forwarding engine events to users, the bus and the hook.
    pub fn spawn_event_loop(self: &Arc<Self>) -> JoinHandle<()> {
        let orchestrator = Arc::clone(self);
        let mut events = orchestrator.engine.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => orchestrator.handle_engine_event(event).await,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "engine event stream lagged; events dropped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("engine event stream closed");
        })
    }
}

#[async_trait]
impl<E> TorrentWorkflow for TorrentOrchestrator<E>
where
    E: TorrentEngine + 'static,
{
    async fn add_spec(
        &self,
        user: &str,
        spec: TorrentSpec,
        auto_start: bool,
    ) -> TorrentResult<InfoHash> {
        let hash = spec.info_hash;
        self.engine.add_spec(user, spec, auto_start).await?;
        self.report(user, hash, EventKind::Added).await;
        if auto_start {
            self.report(user, hash, EventKind::Started).await;
        }
        Ok(hash)
    }

    async fn start(&self, user: &str, hash: InfoHash) -> TorrentResult<()> {
        self.engine.start(hash).await?;
        self.report(user, hash, EventKind::Started).await;
        Ok(())
    }

    async fn stop(&self, user: &str, hash: InfoHash) -> TorrentResult<()> {
        self.engine.stop(hash).await?;
        self.report(user, hash, EventKind::Stopped).await;
        Ok(())
    }

    async fn remove(&self, user: &str, hash: InfoHash) -> TorrentResult<()> {
        self.engine.remove(hash).await?;
        self.report(user, hash, EventKind::Removed).await;
        Ok(())
    }

    async fn delete(&self, user: &str, hash: InfoHash) -> TorrentResult<()> {
        self.engine.delete(hash).await?;
        self.report(user, hash, EventKind::Deleted).await;
        Ok(())
    }

    async fn list(&self, user: &str) -> TorrentResult<Vec<TorrentStatus>> {
        self.engine.list(user).await
    }

    async fn dir_info(&self, hash: InfoHash, dir: &str) -> TorrentResult<Vec<FsEntry>> {
        self.engine.dir_info(hash, dir).await
    }
}
