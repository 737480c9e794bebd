//! Engine and workflow traits implemented by torrent adapters.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::TorrentResult;
use crate::model::{EngineEvent, FsEntry, InfoHash, TorrentSpec, TorrentStatus};

/// Narrow call surface of the content-distribution engine.
#[async_trait]
pub trait TorrentEngine: Send + Sync {
    /// Register `spec` for `user`, starting it when `start` is set.
    ///
    /// Registering a hash the engine already knows adds `user` as an owner
    /// and merges trackers; it is not an error.
    async fn add_spec(&self, user: &str, spec: TorrentSpec, start: bool) -> TorrentResult<()>;

    /// Start (or resume) transferring.
    async fn start(&self, hash: InfoHash) -> TorrentResult<()>;

    /// Stop transferring, keeping the registration.
    async fn stop(&self, hash: InfoHash) -> TorrentResult<()>;

    /// Drop the transfer, keeping downloaded data.
    async fn remove(&self, hash: InfoHash) -> TorrentResult<()>;

    /// Drop the transfer together with its downloaded data.
    async fn delete(&self, hash: InfoHash) -> TorrentResult<()>;

    /// Transfers owned by `user`.
    async fn list(&self, user: &str) -> TorrentResult<Vec<TorrentStatus>>;

    /// Contents of `dir` (relative to the transfer's data root).
    async fn dir_info(&self, hash: InfoHash, dir: &str) -> TorrentResult<Vec<FsEntry>>;

    /// Stream of changes the engine makes on its own.
    fn subscribe(&self) -> broadcast::Receiver<EngineEvent>;
}

/// Workflow facade exposed to the API layer for lifecycle control.
///
/// Implementations notify the acting user and mirror lifecycle transitions to
/// the event bus; callers only see the outcome.
#[async_trait]
pub trait TorrentWorkflow: Send + Sync {
    /// Register `spec` for `user`; returns the content hash.
    async fn add_spec(
        &self,
        user: &str,
        spec: TorrentSpec,
        auto_start: bool,
    ) -> TorrentResult<InfoHash>;

    /// Start a transfer on behalf of `user`.
    async fn start(&self, user: &str, hash: InfoHash) -> TorrentResult<()>;

    /// Stop a transfer on behalf of `user`.
    async fn stop(&self, user: &str, hash: InfoHash) -> TorrentResult<()>;

    /// Remove a transfer, keeping data.
    async fn remove(&self, user: &str, hash: InfoHash) -> TorrentResult<()>;

    /// Remove a transfer and its data.
    async fn delete(&self, user: &str, hash: InfoHash) -> TorrentResult<()>;

    /// Transfers owned by `user`.
    async fn list(&self, user: &str) -> TorrentResult<Vec<TorrentStatus>>;

    /// Directory listing inside a transfer.
    async fn dir_info(&self, hash: InfoHash, dir: &str) -> TorrentResult<Vec<FsEntry>>;
}
