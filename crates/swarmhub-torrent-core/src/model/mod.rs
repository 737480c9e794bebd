//! Core torrent domain types shared across the workspace.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{TorrentError, TorrentResult};

/// 20-byte content hash identifying a transfer.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InfoHash([u8; 20]);

impl InfoHash {
    /// Length of the hash in bytes.
    pub const LEN: usize = 20;

    /// Wrap raw hash bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Parse a 40-character hex string.
    ///
    /// # Errors
    ///
    /// Returns [`TorrentError::InvalidHash`] for anything other than exactly
    /// 40 hex digits (surrounding whitespace is ignored).
    pub fn from_hex(value: &str) -> TorrentResult<Self> {
        let trimmed = value.trim();
        let mut bytes = [0_u8; Self::LEN];
        hex::decode_to_slice(trimmed, &mut bytes).map_err(|_| TorrentError::InvalidHash {
            value: value.to_string(),
        })?;
        Ok(Self(bytes))
    }

    /// Raw hash bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Lower-case hex rendering.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InfoHash({})", self.to_hex())
    }
}

impl FromStr for InfoHash {
    type Err = TorrentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::from_hex(value)
    }
}

impl Serialize for InfoHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for InfoHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::from_hex(&raw).map_err(serde::de::Error::custom)
    }
}

/// One file inside a transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TorrentFile {
    /// Path relative to the transfer root, `/`-separated.
    pub path: String,
    /// Size in bytes.
    pub length: u64,
}

/// Information carried by full metainfo but absent from a bare magnet link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecMetadata {
    /// Name of the transfer root.
    pub name: String,
    /// Piece size in bytes.
    pub piece_length: u64,
    /// File manifest.
    pub files: Vec<TorrentFile>,
}

impl SpecMetadata {
    /// Total payload size.
    #[must_use]
    pub fn total_length(&self) -> u64 {
        self.files.iter().map(|file| file.length).sum()
    }
}

/// Parsed description of a transferable content item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TorrentSpec {
    /// Content hash.
    pub info_hash: InfoHash,
    /// Display name suggested by the source, if any.
    pub display_name: Option<String>,
    /// Announce URLs grouped in tiers.
    pub trackers: Vec<Vec<String>>,
    /// HTTP seed URLs.
    pub web_seeds: Vec<String>,
    /// Metainfo details; `None` until fetched from peers for magnet specs.
    pub metadata: Option<SpecMetadata>,
}

impl TorrentSpec {
    /// Spec knowing only its content hash.
    #[must_use]
    pub const fn from_hash(info_hash: InfoHash) -> Self {
        Self {
            info_hash,
            display_name: None,
            trackers: Vec::new(),
            web_seeds: Vec::new(),
            metadata: None,
        }
    }

    /// Best available human-readable name.
    #[must_use]
    pub fn name(&self) -> String {
        self.metadata
            .as_ref()
            .map(|meta| meta.name.clone())
            .or_else(|| self.display_name.clone())
            .unwrap_or_else(|| self.info_hash.to_hex())
    }

    /// Drop every tracker, leaving discovery to other peers.
    pub fn strip_trackers(&mut self) {
        self.trackers.clear();
    }
}

/// Run state of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TorrentState {
    /// Registered but not transferring.
    Stopped,
    /// Waiting for metadata from peers.
    FetchingMetadata,
    /// Transferring pieces.
    Downloading,
    /// Complete and serving pieces to peers.
    Seeding,
}

impl TorrentState {
    /// Whether the engine is actively working on the transfer.
    #[must_use]
    pub const fn is_running(self) -> bool {
        !matches!(self, Self::Stopped)
    }
}

/// Byte-level progress of a transfer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct TorrentProgress {
    /// Bytes verified on disk.
    pub bytes_completed: u64,
    /// Total payload size; zero while metadata is unknown.
    pub bytes_total: u64,
}

impl TorrentProgress {
    /// Completion percentage in `0.0..=100.0`.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn percent_complete(&self) -> f64 {
        if self.bytes_total == 0 {
            0.0
        } else {
            (self.bytes_completed as f64 / self.bytes_total as f64) * 100.0
        }
    }

    /// Whether every byte is present.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.bytes_total > 0 && self.bytes_completed >= self.bytes_total
    }
}

/// Snapshot of one transfer as seen by a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TorrentStatus {
    /// Content hash.
    #[serde(rename = "infohash")]
    pub info_hash: InfoHash,
    /// Best available name.
    pub name: String,
    /// Run state.
    pub state: TorrentState,
    /// Byte-level progress.
    pub progress: TorrentProgress,
    /// When the transfer was first registered.
    pub added_at: DateTime<Utc>,
}

/// Entry of a directory listing inside a transfer's data root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsEntry {
    /// File or directory name.
    pub name: String,
    /// Path relative to the transfer's data root.
    pub path: String,
    /// Whether the entry is a directory.
    #[serde(rename = "isDir")]
    pub is_dir: bool,
    /// Size in bytes (zero for directories).
    pub size: u64,
}

/// Notification emitted by the engine when a transfer changes on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Metadata for the transfer became available.
    Loaded {
        /// Transfer concerned.
        hash: InfoHash,
        /// Users owning the transfer.
        users: Vec<String>,
    },
    /// Every piece of the transfer is present.
    Completed {
        /// Transfer concerned.
        hash: InfoHash,
        /// Name of the transfer.
        name: String,
        /// Users owning the transfer.
        users: Vec<String>,
    },
}

impl EngineEvent {
    /// Transfer the event refers to.
    #[must_use]
    pub const fn hash(&self) -> InfoHash {
        match self {
            Self::Loaded { hash, .. } | Self::Completed { hash, .. } => *hash,
        }
    }

    /// Users that should hear about the event.
    #[must_use]
    pub fn users(&self) -> &[String] {
        match self {
            Self::Loaded { users, .. } | Self::Completed { users, .. } => users,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEX: &str = "c9e15763f722f23e98a29decdfae341b98d53056";

    #[test]
    fn info_hash_parses_hex_and_round_trips_through_serde() -> Result<(), Box<dyn std::error::Error>>
    {
        let hash = InfoHash::from_hex(HEX)?;
        assert_eq!(hash.to_hex(), HEX);
        assert_eq!(InfoHash::from_hex(&HEX.to_uppercase())?, hash);
        assert_eq!(InfoHash::from_hex(&format!("  {HEX}\n"))?, hash);

        let json = serde_json::to_string(&hash)?;
        assert_eq!(json, format!("\"{HEX}\""));
        let back: InfoHash = serde_json::from_str(&json)?;
        assert_eq!(back, hash);
        Ok(())
    }

    #[test]
    fn info_hash_rejects_malformed_input() {
        assert!(InfoHash::from_hex("").is_err());
        assert!(InfoHash::from_hex(&HEX[..39]).is_err());
        assert!(InfoHash::from_hex(&format!("{HEX}00")).is_err());
        assert!(matches!(
            InfoHash::from_hex("zz15763f722f23e98a29decdfae341b98d53056a"),
            Err(TorrentError::InvalidHash { .. })
        ));
    }

    #[test]
    fn strip_trackers_empties_tiers() {
        let mut spec = TorrentSpec::from_hash(InfoHash::from_bytes([7; 20]));
        spec.trackers = vec![vec!["udp://tracker.example:80".into()]];
        spec.strip_trackers();
        assert!(spec.trackers.is_empty());
    }

    #[test]
    fn spec_name_prefers_metadata() {
        let mut spec = TorrentSpec::from_hash(InfoHash::from_bytes([1; 20]));
        assert_eq!(spec.name(), "01".repeat(20));
        spec.display_name = Some("display".into());
        assert_eq!(spec.name(), "display");
        spec.metadata = Some(SpecMetadata {
            name: "real".into(),
            piece_length: 16_384,
            files: vec![],
        });
        assert_eq!(spec.name(), "real");
    }

    #[test]
    fn progress_reports_percent() {
        let progress = TorrentProgress {
            bytes_completed: 50,
            bytes_total: 200,
        };
        assert!((progress.percent_complete() - 25.0).abs() < f64::EPSILON);
        assert!(!progress.is_complete());
        assert!((TorrentProgress::default().percent_complete()).abs() < f64::EPSILON);
    }
}
