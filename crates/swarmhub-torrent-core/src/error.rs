//! Error types for torrent core services.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::model::InfoHash;

/// Primary error type for torrent operations.
#[derive(Debug, Error)]
pub enum TorrentError {
    /// A content hash string could not be parsed.
    #[error("error parsing string to InfoHash")]
    InvalidHash {
        /// Rejected input.
        value: String,
    },
    /// A magnet URI could not be parsed.
    #[error("invalid magnet uri")]
    InvalidMagnet {
        /// Machine-readable reason.
        reason: &'static str,
    },
    /// Torrent metainfo was malformed.
    #[error("invalid torrent metainfo")]
    InvalidMetainfo {
        /// Where the metainfo came from.
        origin: &'static str,
        /// Parser failure.
        #[source]
        source: MetainfoError,
    },
    /// The metainfo parser faulted; the input is treated as malformed.
    #[error("error loading torrent spec")]
    ParserFault {
        /// Where the metainfo came from.
        origin: &'static str,
    },
    /// Base64 input could not be decoded.
    #[error("invalid base64 torrent")]
    InvalidBase64 {
        /// Underlying decode error.
        #[source]
        source: base64::DecodeError,
    },
    /// The torrent file path does not exist.
    #[error("file doesn't exist")]
    FileMissing {
        /// Requested path.
        path: PathBuf,
    },
    /// The torrent file path names a directory.
    #[error("directory present")]
    DirectoryPresent {
        /// Requested path.
        path: PathBuf,
    },
    /// Downloading a torrent file failed.
    #[error("torrent download failed")]
    Fetch {
        /// Requested URL.
        url: String,
        /// Underlying HTTP error.
        #[source]
        source: reqwest::Error,
    },
    /// A torrent file exceeded the size limit.
    #[error("torrent file too large")]
    TooLarge {
        /// Maximum accepted size in bytes.
        limit: usize,
    },
    /// Filesystem access failed.
    #[error("torrent io failed")]
    Io {
        /// Operation identifier.
        operation: &'static str,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// No transfer with this hash is known.
    #[error("torrent not found")]
    NotFound {
        /// Missing transfer.
        hash: InfoHash,
    },
    /// A directory query escaped the transfer root or was otherwise invalid.
    #[error("invalid directory path")]
    InvalidPath {
        /// Rejected path.
        path: String,
    },
    /// The engine worker is gone.
    #[error("torrent engine unavailable")]
    EngineUnavailable,
}

/// Failure decoding bencoded metainfo.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MetainfoError {
    /// Input ended in the middle of a value.
    #[error("unexpected end of input")]
    Truncated {
        /// Offset where more input was expected.
        offset: usize,
    },
    /// A byte that cannot start or continue a value.
    #[error("unexpected byte")]
    UnexpectedByte {
        /// Offending byte.
        byte: u8,
        /// Offset of the byte.
        offset: usize,
    },
    /// An integer or string length was malformed.
    #[error("invalid integer")]
    InvalidInteger {
        /// Offset of the integer.
        offset: usize,
    },
    /// Values nested deeper than the decoder accepts.
    #[error("nesting too deep")]
    TooDeep,
    /// Bytes left over after the top-level value.
    #[error("trailing data")]
    TrailingData {
        /// Offset of the first extra byte.
        offset: usize,
    },
    /// A required field is absent.
    #[error("missing field")]
    MissingField {
        /// Field name.
        field: &'static str,
    },
    /// A field has the wrong type or an invalid value.
    #[error("invalid field")]
    InvalidField {
        /// Field name.
        field: &'static str,
    },
}

/// Convenience alias for torrent operation results.
pub type TorrentResult<T> = Result<T, TorrentError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn path_errors_use_user_facing_text() {
        let missing = TorrentError::FileMissing {
            path: PathBuf::from("/nope.torrent"),
        };
        assert_eq!(missing.to_string(), "file doesn't exist");
        let dir = TorrentError::DirectoryPresent {
            path: PathBuf::from("/tmp"),
        };
        assert_eq!(dir.to_string(), "directory present");
    }

    #[test]
    fn metainfo_error_is_exposed_as_source() {
        let err = TorrentError::InvalidMetainfo {
            origin: "bytes",
            source: MetainfoError::TooDeep,
        };
        assert_eq!(err.to_string(), "invalid torrent metainfo");
        assert_eq!(
            err.source().map(ToString::to_string).as_deref(),
            Some("nesting too deep")
        );
    }
}
