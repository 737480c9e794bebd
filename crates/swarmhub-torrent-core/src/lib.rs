#![forbid(unsafe_code)]
#![warn(
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    rustdoc::broken_intra_doc_links,
    missing_docs
)]

//! Engine-agnostic torrent interfaces and DTOs.
//!
//! The content-distribution engine is an opaque collaborator reached through
//! [`TorrentEngine`]. This crate owns everything needed to talk to it: the
//! content hash type, transfer specs and their constructors (URL, file,
//! bytes, base64, magnet), status snapshots, and the [`TorrentWorkflow`]
//! facade the API layer drives.

pub mod error;
pub mod model;
pub mod service;
pub mod spec;

pub use error::{MetainfoError, TorrentError, TorrentResult};
pub use model::{
    EngineEvent, FsEntry, InfoHash, SpecMetadata, TorrentFile, TorrentProgress, TorrentSpec,
    TorrentState, TorrentStatus,
};
pub use service::{TorrentEngine, TorrentWorkflow};
pub use spec::{
    MAX_SPEC_BYTES, spec_from_base64, spec_from_bytes, spec_from_magnet, spec_from_path,
    spec_from_url,
};
