#![forbid(unsafe_code)]
#![warn(
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    rustdoc::broken_intra_doc_links,
    missing_docs
)]

//! In-process transfer engine.
//!
//! Stands in for the external content-distribution engine behind the
//! [`TorrentEngine`] trait. All state lives in one worker task fed through a
//! bounded command queue; callers get answers over oneshot replies. Metadata
//! and byte progress arrive either from the transfer layer (via
//! [`InMemoryEngine::provide_metadata`] / [`InMemoryEngine::record_progress`])
//! or, when configured, from a fixed simulated rate.

mod command;
mod fs;
mod worker;

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use swarmhub_torrent_core::{
    EngineEvent, FsEntry, InfoHash, SpecMetadata, TorrentEngine, TorrentError, TorrentResult,
    TorrentSpec, TorrentStatus,
};
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::command::{EngineCommand, Reply};
use crate::worker::WorkerConfig;

const COMMAND_BUFFER: usize = 128;
const EVENT_BUFFER: usize = 256;
const DEFAULT_TICK: Duration = Duration::from_secs(1);

/// Construction parameters for [`InMemoryEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Directory holding one data directory per transfer, named by hex hash.
    pub data_root: PathBuf,
    /// Interval of the worker's progress tick.
    pub tick: Duration,
    /// Simulated download rate applied on each tick; `None` disables simulation.
    pub simulated_rate_bps: Option<u64>,
}

impl EngineConfig {
    /// Configuration rooted at `data_root` without simulated progress.
    #[must_use]
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
            tick: DEFAULT_TICK,
            simulated_rate_bps: None,
        }
    }
}

/// Handle to the engine worker. Cloning is cheap.
#[derive(Debug, Clone)]
pub struct InMemoryEngine {
    commands: mpsc::Sender<EngineCommand>,
    events: broadcast::Sender<EngineEvent>,
    data_root: PathBuf,
}

impl InMemoryEngine {
    /// Spawn the worker. Must be called from within a Tokio runtime.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        let (commands, rx) = mpsc::channel(COMMAND_BUFFER);
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let data_root = config.data_root.clone();
        worker::spawn(
            WorkerConfig {
                data_root: config.data_root,
                tick: config.tick,
                simulated_rate_bps: config.simulated_rate_bps,
            },
            events.clone(),
            rx,
        );
        Self {
            commands,
            events,
            data_root,
        }
    }

    /// Record metadata fetched from peers for a magnet-only transfer.
    ///
    /// # Errors
    ///
    /// Returns [`TorrentError::NotFound`] for unknown transfers.
    pub async fn provide_metadata(
        &self,
        hash: InfoHash,
        metadata: SpecMetadata,
    ) -> TorrentResult<()> {
        self.request(|reply| EngineCommand::Metadata {
            hash,
            metadata,
            reply,
        })
        .await
    }

    /// Record how many payload bytes are verified on disk.
    ///
    /// # Errors
    ///
    /// Returns [`TorrentError::NotFound`] for unknown transfers.
    pub async fn record_progress(&self, hash: InfoHash, bytes_completed: u64) -> TorrentResult<()> {
        self.request(|reply| EngineCommand::Progress {
            hash,
            bytes_completed,
            reply,
        })
        .await
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> EngineCommand,
    ) -> TorrentResult<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| TorrentError::EngineUnavailable)?;
        response.await.map_err(|_| TorrentError::EngineUnavailable)?
    }
}

#[async_trait]
impl TorrentEngine for InMemoryEngine {
    async fn add_spec(&self, user: &str, spec: TorrentSpec, start: bool) -> TorrentResult<()> {
        self.request(|reply| EngineCommand::Add {
            user: user.to_string(),
            spec: Box::new(spec),
            start,
            reply,
        })
        .await
    }

    async fn start(&self, hash: InfoHash) -> TorrentResult<()> {
        self.request(|reply| EngineCommand::Start { hash, reply })
            .await
    }

    async fn stop(&self, hash: InfoHash) -> TorrentResult<()> {
        self.request(|reply| EngineCommand::Stop { hash, reply })
            .await
    }

    async fn remove(&self, hash: InfoHash) -> TorrentResult<()> {
        self.request(|reply| EngineCommand::Remove {
            hash,
            delete_data: false,
            reply,
        })
        .await
    }

    async fn delete(&self, hash: InfoHash) -> TorrentResult<()> {
        self.request(|reply| EngineCommand::Remove {
            hash,
            delete_data: true,
            reply,
        })
        .await
    }

    async fn list(&self, user: &str) -> TorrentResult<Vec<TorrentStatus>> {
        self.request(|reply| EngineCommand::List {
            user: user.to_string(),
            reply,
        })
        .await
    }

    async fn dir_info(&self, hash: InfoHash, dir: &str) -> TorrentResult<Vec<FsEntry>> {
        let relative = fs::sanitize(dir)?;
        let known = self
            .request(|reply| EngineCommand::Contains { hash, reply })
            .await?;
        if !known {
            return Err(TorrentError::NotFound { hash });
        }
        fs::list(&self.data_root.join(hash.to_hex()), &relative).await
    }

    fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swarmhub_torrent_core::{TorrentFile, TorrentState};
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(2);

    fn spec(byte: u8, total: Option<u64>) -> TorrentSpec {
        let mut spec = TorrentSpec::from_hash(InfoHash::from_bytes([byte; 20]));
        spec.metadata = total.map(metadata);
        spec
    }

    fn metadata(total: u64) -> SpecMetadata {
        SpecMetadata {
            name: "payload".into(),
            piece_length: 16_384,
            files: vec![TorrentFile {
                path: "payload/file.bin".into(),
                length: total,
            }],
        }
    }

    #[tokio::test]
    async fn added_spec_without_start_stays_stopped() -> TorrentResult<()> {
        let root = tempfile::tempdir().map_err(|source| TorrentError::Io {
            operation: "tempdir",
            source,
        })?;
        let engine = InMemoryEngine::new(EngineConfig::new(root.path()));
        let mut events = engine.subscribe();

        engine.add_spec("alice", spec(1, Some(10)), false).await?;
        let listed = engine.list("alice").await?;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].state, TorrentState::Stopped);
        assert!(engine.list("bob").await?.is_empty());
        assert!(events.try_recv().is_err());
        Ok(())
    }

    #[tokio::test]
    async fn lifecycle_emits_loaded_then_completed_once() -> Result<(), Box<dyn std::error::Error>>
    {
        let root = tempfile::tempdir()?;
        let engine = InMemoryEngine::new(EngineConfig::new(root.path()));
        let mut events = engine.subscribe();
        let hash = InfoHash::from_bytes([2; 20]);

        engine.add_spec("alice", spec(2, None), true).await?;
        assert_eq!(
            engine.list("alice").await?[0].state,
            TorrentState::FetchingMetadata
        );
        engine.provide_metadata(hash, metadata(100)).await?;
        let loaded = timeout(WAIT, events.recv()).await??;
        assert_eq!(
            loaded,
            EngineEvent::Loaded {
                hash,
                users: vec!["alice".into()]
            }
        );

        engine.record_progress(hash, 40).await?;
        engine.record_progress(hash, 100).await?;
        engine.record_progress(hash, 100).await?;
        let completed = timeout(WAIT, events.recv()).await??;
        assert!(matches!(completed, EngineEvent::Completed { name, .. } if name == "payload"));
        assert!(events.try_recv().is_err());
        assert_eq!(engine.list("alice").await?[0].state, TorrentState::Seeding);
        Ok(())
    }

    #[tokio::test]
    async fn unknown_hash_is_not_found() {
        let engine = InMemoryEngine::new(EngineConfig::new("/nonexistent"));
        let hash = InfoHash::from_bytes([9; 20]);
        assert!(matches!(
            engine.remove(hash).await,
            Err(TorrentError::NotFound { .. })
        ));
        assert!(matches!(
            engine.start(hash).await,
            Err(TorrentError::NotFound { .. })
        ));
        assert!(matches!(
            engine.dir_info(hash, "").await,
            Err(TorrentError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn delete_removes_data_and_remove_keeps_it() -> Result<(), Box<dyn std::error::Error>> {
        let root = tempfile::tempdir()?;
        let engine = InMemoryEngine::new(EngineConfig::new(root.path()));
        let kept = InfoHash::from_bytes([3; 20]);
        let deleted = InfoHash::from_bytes([4; 20]);
        for hash in [kept, deleted] {
            tokio::fs::create_dir_all(root.path().join(hash.to_hex())).await?;
            tokio::fs::write(root.path().join(hash.to_hex()).join("f"), b"x").await?;
        }
        engine.add_spec("alice", spec(3, Some(1)), false).await?;
        engine.add_spec("alice", spec(4, Some(1)), false).await?;

        let listing = engine.dir_info(kept, ".").await?;
        assert_eq!(listing.len(), 1);
        assert!(matches!(
            engine.dir_info(kept, "../").await,
            Err(TorrentError::InvalidPath { .. })
        ));

        engine.remove(kept).await?;
        engine.delete(deleted).await?;
        assert!(root.path().join(kept.to_hex()).exists());
        assert!(!root.path().join(deleted.to_hex()).exists());
        assert!(engine.list("alice").await?.is_empty());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn simulated_rate_completes_running_transfers() -> Result<(), Box<dyn std::error::Error>>
    {
        let engine = InMemoryEngine::new(EngineConfig {
            data_root: PathBuf::from("/nonexistent"),
            tick: Duration::from_millis(100),
            simulated_rate_bps: Some(1_000),
        });
        let mut events = engine.subscribe();
        engine.add_spec("alice", spec(5, Some(250)), true).await?;
        assert!(matches!(events.recv().await?, EngineEvent::Loaded { .. }));
        let completed = timeout(Duration::from_secs(5), events.recv()).await??;
        assert!(matches!(completed, EngineEvent::Completed { .. }));
        Ok(())
    }
}
