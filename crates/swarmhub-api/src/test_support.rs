//! Shared fixtures for handler tests.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use swarmhub_hub::testing::RecordingTransport;
use swarmhub_hub::{ConnectionRegistry, SessionConfig, SessionConnection, SessionIdentity};
use swarmhub_telemetry::Metrics;
use swarmhub_torrent_core::{
    FsEntry, InfoHash, TorrentError, TorrentProgress, TorrentResult, TorrentSpec, TorrentState,
    TorrentStatus, TorrentWorkflow,
};

use crate::state::ApiState;

pub(crate) const HASH_A: &str = "c9e15763f722f23e98a29decdfae341b98d53056";
pub(crate) const MAGNET_A: &str =
    "magnet:?xt=urn:btih:c9e15763f722f23e98a29decdfae341b98d53056&dn=demo";

/// Single-file metainfo (`a.txt`, 5 bytes) announcing to one tracker.
pub(crate) fn torrent_bytes() -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"d8:announce18:udp://tracker.test");
    out.extend_from_slice(b"4:infod6:lengthi5e4:name5:a.txt");
    out.extend_from_slice(b"12:piece lengthi16384e6:pieces20:");
    out.extend_from_slice(&[0xAB; 20]);
    out.extend_from_slice(b"ee");
    out
}

/// Workflow keeping transfers in a list, without notifications.
#[derive(Default)]
pub(crate) struct StubWorkflow {
    transfers: Mutex<Vec<(String, TorrentStatus)>>,
    added: Mutex<Vec<TorrentSpec>>,
}

impl StubWorkflow {
    /// Specs passed to `add_spec`, in call order.
    pub(crate) fn added_specs(&self) -> Vec<TorrentSpec> {
        self.added
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn seed(&self, user: &str, hash: &str) -> TorrentResult<()> {
        let hash = InfoHash::from_hex(hash)?;
        self.insert(user, TorrentSpec::from_hash(hash), false);
        Ok(())
    }

    fn insert(&self, user: &str, spec: TorrentSpec, running: bool) {
        let status = TorrentStatus {
            info_hash: spec.info_hash,
            name: spec.name(),
            state: if running {
                TorrentState::Downloading
            } else {
                TorrentState::Stopped
            },
            progress: TorrentProgress::default(),
            added_at: Utc::now(),
        };
        self.transfers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((user.to_string(), status));
    }

    fn take(&self, hash: InfoHash) -> TorrentResult<()> {
        let mut transfers = self
            .transfers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let before = transfers.len();
        transfers.retain(|(_, status)| status.info_hash != hash);
        if transfers.len() == before {
            return Err(TorrentError::NotFound { hash });
        }
        Ok(())
    }

    fn set_state(&self, hash: InfoHash, state: TorrentState) -> TorrentResult<()> {
        let mut transfers = self
            .transfers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let (_, status) = transfers
            .iter_mut()
            .find(|(_, status)| status.info_hash == hash)
            .ok_or(TorrentError::NotFound { hash })?;
        status.state = state;
        Ok(())
    }
}

#[async_trait]
impl TorrentWorkflow for StubWorkflow {
    async fn add_spec(
        &self,
        user: &str,
        spec: TorrentSpec,
        auto_start: bool,
    ) -> TorrentResult<InfoHash> {
        let hash = spec.info_hash;
        self.added
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(spec.clone());
        self.insert(user, spec, auto_start);
        Ok(hash)
    }

    async fn start(&self, _user: &str, hash: InfoHash) -> TorrentResult<()> {
        self.set_state(hash, TorrentState::Downloading)
    }

    async fn stop(&self, _user: &str, hash: InfoHash) -> TorrentResult<()> {
        self.set_state(hash, TorrentState::Stopped)
    }

    async fn remove(&self, _user: &str, hash: InfoHash) -> TorrentResult<()> {
        self.take(hash)
    }

    async fn delete(&self, _user: &str, hash: InfoHash) -> TorrentResult<()> {
        self.take(hash)
    }

    async fn list(&self, user: &str) -> TorrentResult<Vec<TorrentStatus>> {
        Ok(self
            .transfers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(owner, _)| owner == user)
            .map(|(_, status)| status.clone())
            .collect())
    }

    async fn dir_info(&self, hash: InfoHash, _dir: &str) -> TorrentResult<Vec<FsEntry>> {
        Err(TorrentError::NotFound { hash })
    }
}

pub(crate) fn state_with(workflow: impl Into<Arc<StubWorkflow>>) -> ApiState {
    let metrics = Metrics::new().expect("metrics registry");
    let workflow: Arc<StubWorkflow> = workflow.into();
    ApiState::new(
        ConnectionRegistry::with_metrics(SessionConfig::default(), metrics.clone()),
        workflow,
        metrics,
        "adminuser",
    )
}

pub(crate) async fn connect(
    state: &ApiState,
    user: &str,
    token: &str,
    admin: bool,
) -> (Arc<SessionConnection>, RecordingTransport) {
    let transport = RecordingTransport::new();
    let session = state
        .registry
        .connect(
            SessionIdentity::new(user, token, "127.0.0.1:9").admin(admin),
            transport.clone(),
        )
        .await;
    (session, transport)
}
