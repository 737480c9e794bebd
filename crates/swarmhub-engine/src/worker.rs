#![allow(clippy::redundant_pub_crate)]

use std::collections::{BTreeSet, HashMap};
use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use swarmhub_torrent_core::{
    EngineEvent, InfoHash, SpecMetadata, TorrentError, TorrentProgress, TorrentResult,
    TorrentSpec, TorrentState, TorrentStatus,
};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info};

use crate::command::EngineCommand;

pub(crate) struct WorkerConfig {
    pub(crate) data_root: PathBuf,
    pub(crate) tick: Duration,
    pub(crate) simulated_rate_bps: Option<u64>,
}

pub(crate) fn spawn(
    config: WorkerConfig,
    events: broadcast::Sender<EngineEvent>,
    mut commands: mpsc::Receiver<EngineCommand>,
) {
    tokio::spawn(async move {
        let mut poll = tokio::time::interval(config.tick);
        poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut worker = Worker::new(config, events);
        loop {
            tokio::select! {
                command = commands.recv() => {
                    match command {
                        Some(command) => worker.handle(command).await,
                        None => break,
                    }
                }
                _ = poll.tick() => worker.advance(),
            }
        }
        debug!("engine worker stopped");
    });
}

struct Transfer {
    spec: TorrentSpec,
    owners: BTreeSet<String>,
    state: TorrentState,
    bytes_completed: u64,
    added_at: DateTime<Utc>,
    loaded_announced: bool,
    completed_announced: bool,
}

impl Transfer {
    fn new(user: String, spec: TorrentSpec) -> Self {
        Self {
            spec,
            owners: BTreeSet::from([user]),
            state: TorrentState::Stopped,
            bytes_completed: 0,
            added_at: Utc::now(),
            loaded_announced: false,
            completed_announced: false,
        }
    }

    fn total(&self) -> u64 {
        self.spec
            .metadata
            .as_ref()
            .map_or(0, SpecMetadata::total_length)
    }

    fn progress(&self) -> TorrentProgress {
        TorrentProgress {
            bytes_completed: self.bytes_completed,
            bytes_total: self.total(),
        }
    }

    fn running_state(&self) -> TorrentState {
        if self.spec.metadata.is_none() {
            TorrentState::FetchingMetadata
        } else if self.progress().is_complete() {
            TorrentState::Seeding
        } else {
            TorrentState::Downloading
        }
    }

    fn status(&self) -> TorrentStatus {
        TorrentStatus {
            info_hash: self.spec.info_hash,
            name: self.spec.name(),
            state: self.state,
            progress: self.progress(),
            added_at: self.added_at,
        }
    }

    fn users(&self) -> Vec<String> {
        self.owners.iter().cloned().collect()
    }
}

struct Worker {
    config: WorkerConfig,
    events: broadcast::Sender<EngineEvent>,
    transfers: HashMap<InfoHash, Transfer>,
}

impl Worker {
    fn new(config: WorkerConfig, events: broadcast::Sender<EngineEvent>) -> Self {
        Self {
            config,
            events,
            transfers: HashMap::new(),
        }
    }

    async fn handle(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::Add {
                user,
                spec,
                start,
                reply,
            } => {
                let result = self.add(user, *spec, start);
                let _ = reply.send(result);
            }
            EngineCommand::Start { hash, reply } => {
                let _ = reply.send(self.start(hash));
            }
            EngineCommand::Stop { hash, reply } => {
                let _ = reply.send(self.stop(hash));
            }
            EngineCommand::Remove {
                hash,
                delete_data,
                reply,
            } => {
                let _ = reply.send(self.remove(hash, delete_data).await);
            }
            EngineCommand::List { user, reply } => {
                let _ = reply.send(Ok(self.list(&user)));
            }
            EngineCommand::Contains { hash, reply } => {
                let _ = reply.send(Ok(self.transfers.contains_key(&hash)));
            }
            EngineCommand::Metadata {
                hash,
                metadata,
                reply,
            } => {
                let _ = reply.send(self.apply_metadata(hash, metadata));
            }
            EngineCommand::Progress {
                hash,
                bytes_completed,
                reply,
            } => {
                let _ = reply.send(self.record_progress(hash, bytes_completed));
            }
        }
    }

    fn add(&mut self, user: String, spec: TorrentSpec, start: bool) -> TorrentResult<()> {
        let hash = spec.info_hash;
        match self.transfers.get_mut(&hash) {
            Some(existing) => {
                debug!(hash = %hash, user = %user, "transfer already registered; merging");
                existing.owners.insert(user);
                for tier in spec.trackers {
                    if !existing.spec.trackers.contains(&tier) {
                        existing.spec.trackers.push(tier);
                    }
                }
                if existing.spec.metadata.is_none() && spec.metadata.is_some() {
                    existing.spec.metadata = spec.metadata;
                }
            }
            None => {
                info!(hash = %hash, user = %user, name = %spec.name(), "transfer registered");
                self.transfers.insert(hash, Transfer::new(user, spec));
            }
        }
        if start { self.start(hash) } else { Ok(()) }
    }

    fn start(&mut self, hash: InfoHash) -> TorrentResult<()> {
        let transfer = self.transfer_mut(hash)?;
        transfer.state = transfer.running_state();
        self.announce(hash);
        Ok(())
    }

    fn stop(&mut self, hash: InfoHash) -> TorrentResult<()> {
        self.transfer_mut(hash)?.state = TorrentState::Stopped;
        Ok(())
    }

    async fn remove(&mut self, hash: InfoHash, delete_data: bool) -> TorrentResult<()> {
        if self.transfers.remove(&hash).is_none() {
            return Err(TorrentError::NotFound { hash });
        }
        info!(hash = %hash, delete_data, "transfer removed");
        if delete_data {
            let dir = self.config.data_root.join(hash.to_hex());
            match tokio::fs::remove_dir_all(&dir).await {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(source) => {
                    return Err(TorrentError::Io {
                        operation: "engine.delete_data",
                        source,
                    });
                }
            }
        }
        Ok(())
    }

    fn list(&self, user: &str) -> Vec<TorrentStatus> {
        let mut statuses: Vec<_> = self
            .transfers
            .values()
            .filter(|transfer| transfer.owners.contains(user))
            .map(Transfer::status)
            .collect();
        statuses.sort_by(|a, b| a.added_at.cmp(&b.added_at).then(a.name.cmp(&b.name)));
        statuses
    }

    fn apply_metadata(&mut self, hash: InfoHash, metadata: SpecMetadata) -> TorrentResult<()> {
        let transfer = self.transfer_mut(hash)?;
        transfer.spec.metadata = Some(metadata);
        if transfer.state.is_running() {
            transfer.state = transfer.running_state();
        }
        self.announce(hash);
        Ok(())
    }

    fn record_progress(&mut self, hash: InfoHash, bytes_completed: u64) -> TorrentResult<()> {
        let transfer = self.transfer_mut(hash)?;
        transfer.bytes_completed = bytes_completed.min(transfer.total());
        if transfer.state.is_running() {
            transfer.state = transfer.running_state();
        }
        self.announce(hash);
        Ok(())
    }

    /// Advance running transfers at the simulated rate, if one is configured.
    fn advance(&mut self) {
        let Some(rate) = self.config.simulated_rate_bps else {
            return;
        };
        let step = u64::try_from(self.config.tick.as_millis())
            .unwrap_or(u64::MAX)
            .saturating_mul(rate)
            / 1000;
        let advanced: Vec<InfoHash> = self
            .transfers
            .iter_mut()
            .filter(|(_, transfer)| transfer.state == TorrentState::Downloading)
            .map(|(hash, transfer)| {
                transfer.bytes_completed = transfer
                    .bytes_completed
                    .saturating_add(step.max(1))
                    .min(transfer.total());
                transfer.state = transfer.running_state();
                *hash
            })
            .collect();
        for hash in advanced {
            self.announce(hash);
        }
    }

    /// Emit `Loaded` / `Completed` the first time a running transfer reaches them.
    fn announce(&mut self, hash: InfoHash) {
        let Some(transfer) = self.transfers.get_mut(&hash) else {
            return;
        };
        if !transfer.state.is_running() {
            return;
        }
        let mut pending = Vec::new();
        if transfer.spec.metadata.is_some() && !transfer.loaded_announced {
            transfer.loaded_announced = true;
            pending.push(EngineEvent::Loaded {
                hash,
                users: transfer.users(),
            });
        }
        if transfer.progress().is_complete() && !transfer.completed_announced {
            transfer.completed_announced = true;
            info!(hash = %hash, name = %transfer.spec.name(), "transfer completed");
            pending.push(EngineEvent::Completed {
                hash,
                name: transfer.spec.name(),
                users: transfer.users(),
            });
        }
        for event in pending {
            if self.events.send(event).is_err() {
                debug!(hash = %hash, "no engine event subscribers");
            }
        }
    }

    fn transfer_mut(&mut self, hash: InfoHash) -> TorrentResult<&mut Transfer> {
        self.transfers
            .get_mut(&hash)
            .ok_or(TorrentError::NotFound { hash })
    }
}
