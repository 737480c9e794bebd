//! Commands accepted by the engine worker.

use swarmhub_torrent_core::{InfoHash, SpecMetadata, TorrentResult, TorrentSpec, TorrentStatus};
use tokio::sync::oneshot;

pub(crate) type Reply<T> = oneshot::Sender<TorrentResult<T>>;

#[derive(Debug)]
pub(crate) enum EngineCommand {
    Add {
        user: String,
        spec: Box<TorrentSpec>,
        start: bool,
        reply: Reply<()>,
    },
    Start {
        hash: InfoHash,
        reply: Reply<()>,
    },
    Stop {
        hash: InfoHash,
        reply: Reply<()>,
    },
    Remove {
        hash: InfoHash,
        delete_data: bool,
        reply: Reply<()>,
    },
    List {
        user: String,
        reply: Reply<Vec<TorrentStatus>>,
    },
    Contains {
        hash: InfoHash,
        reply: Reply<bool>,
    },
    /// Metadata fetched from peers for a magnet-only transfer.
    Metadata {
        hash: InfoHash,
        metadata: SpecMetadata,
        reply: Reply<()>,
    },
    /// Verified byte count reported by the transfer layer.
    Progress {
        hash: InfoHash,
        bytes_completed: u64,
        reply: Reply<()>,
    },
}
