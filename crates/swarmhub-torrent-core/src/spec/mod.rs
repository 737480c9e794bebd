//! Constructors turning the supported sources into a [`TorrentSpec`].
//!
//! Every constructor contains parser faults: malformed input, including input
//! that makes the metainfo parser panic, is reported as a [`TorrentError`]
//! instead of unwinding into the caller.

mod bencode;
mod magnet;
mod metainfo;

use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use tracing::{info, warn};

use crate::error::{TorrentError, TorrentResult};
use crate::model::TorrentSpec;

/// Largest metainfo document accepted from a URL (20 MiB).
pub const MAX_SPEC_BYTES: usize = 20 * 1024 * 1024;

/// Download a `.torrent` file over HTTP(S) and parse it.
///
/// # Errors
///
/// Fails when the request fails or returns a non-success status, when the
/// body exceeds [`MAX_SPEC_BYTES`], or when the metainfo is malformed.
pub async fn spec_from_url(client: &reqwest::Client, url: &str) -> TorrentResult<TorrentSpec> {
    let url = url.trim();
    info!(url = %url, "loading torrent spec from url");
    let fetch_error = |source| TorrentError::Fetch {
        url: url.to_string(),
        source,
    };

    let mut response = client
        .get(url)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(fetch_error)?;
    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await.map_err(fetch_error)? {
        if body.len() + chunk.len() > MAX_SPEC_BYTES {
            return Err(TorrentError::TooLarge {
                limit: MAX_SPEC_BYTES,
            });
        }
        body.extend_from_slice(&chunk);
    }
    parse_contained("url", &body)
}

/// Read and parse a `.torrent` file from disk.
///
/// # Errors
///
/// Returns [`TorrentError::FileMissing`] when nothing exists at `path`,
/// [`TorrentError::DirectoryPresent`] when it is a directory, and a parse
/// error when the contents are malformed.
pub async fn spec_from_path(path: impl AsRef<Path>) -> TorrentResult<TorrentSpec> {
    let path = path.as_ref();
    let metadata = match tokio::fs::metadata(path).await {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(TorrentError::FileMissing {
                path: path.to_path_buf(),
            });
        }
        Err(source) => {
            return Err(TorrentError::Io {
                operation: "spec.path.stat",
                source,
            });
        }
    };
    if metadata.is_dir() {
        warn!(path = %path.display(), "directory given instead of torrent file");
        return Err(TorrentError::DirectoryPresent {
            path: path.to_path_buf(),
        });
    }

    info!(path = %path.display(), "loading torrent spec from file");
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| TorrentError::Io {
            operation: "spec.path.read",
            source,
        })?;
    parse_contained("path", &bytes)
}

/// Parse an in-memory `.torrent` document.
///
/// # Errors
///
/// Returns an error when the metainfo is malformed.
pub fn spec_from_bytes(bytes: &[u8]) -> TorrentResult<TorrentSpec> {
    parse_contained("bytes", bytes)
}

/// Parse a standard-alphabet base64 encoded `.torrent` document.
///
/// # Errors
///
/// Returns [`TorrentError::InvalidBase64`] when decoding fails, otherwise the
/// errors of [`spec_from_bytes`].
pub fn spec_from_base64(encoded: &str) -> TorrentResult<TorrentSpec> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|source| TorrentError::InvalidBase64 { source })?;
    parse_contained("base64", &bytes)
}

/// Parse a `magnet:` URI carrying a `urn:btih` hash (hex or base32).
///
/// # Errors
///
/// Returns [`TorrentError::InvalidMagnet`] when the URI is malformed or has
/// no usable content hash.
pub fn spec_from_magnet(uri: &str) -> TorrentResult<TorrentSpec> {
    match panic::catch_unwind(AssertUnwindSafe(|| magnet::parse(uri))) {
        Ok(result) => result,
        Err(_) => {
            warn!("magnet parser faulted");
            Err(TorrentError::ParserFault { origin: "magnet" })
        }
    }
}

fn parse_contained(origin: &'static str, bytes: &[u8]) -> TorrentResult<TorrentSpec> {
    match panic::catch_unwind(|| metainfo::parse(bytes)) {
        Ok(Ok(spec)) => Ok(spec),
        Ok(Err(source)) => Err(TorrentError::InvalidMetainfo { origin, source }),
        Err(_) => {
            warn!(origin, "metainfo parser faulted");
            Err(TorrentError::ParserFault { origin })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metainfo::fixtures;

    #[test]
    fn bytes_and_base64_agree() -> TorrentResult<()> {
        let raw = fixtures::single_file();
        let from_bytes = spec_from_bytes(&raw)?;
        let from_b64 = spec_from_base64(&STANDARD.encode(&raw))?;
        assert_eq!(from_bytes, from_b64);
        Ok(())
    }

    #[test]
    fn malformed_sources_are_errors() {
        assert!(matches!(
            spec_from_bytes(b"d4:info"),
            Err(TorrentError::InvalidMetainfo { origin: "bytes", .. })
        ));
        assert!(matches!(
            spec_from_base64("***"),
            Err(TorrentError::InvalidBase64 { .. })
        ));
        assert!(matches!(
            spec_from_magnet("magnet:?dn=x"),
            Err(TorrentError::InvalidMagnet { .. })
        ));
    }

    #[tokio::test]
    async fn path_errors_distinguish_missing_and_directory() -> Result<(), Box<dyn std::error::Error>>
    {
        let dir = tempfile::tempdir()?;
        let missing = spec_from_path(dir.path().join("absent.torrent")).await;
        assert_eq!(
            missing.err().map(|err| err.to_string()).as_deref(),
            Some("file doesn't exist")
        );
        let directory = spec_from_path(dir.path()).await;
        assert_eq!(
            directory.err().map(|err| err.to_string()).as_deref(),
            Some("directory present")
        );

        let file = dir.path().join("movie.torrent");
        tokio::fs::write(&file, fixtures::single_file()).await?;
        let spec = spec_from_path(&file).await?;
        assert_eq!(spec.name(), "movie.mkv");
        Ok(())
    }
}
