//! Directory listings inside a transfer's data root.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use swarmhub_torrent_core::{FsEntry, TorrentError, TorrentResult};

/// Normalise `dir` to a relative path that cannot leave the data root.
pub(crate) fn sanitize(dir: &str) -> TorrentResult<PathBuf> {
    let mut clean = PathBuf::new();
    for component in Path::new(dir.trim()).components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::RootDir | Component::ParentDir | Component::Prefix(_) => {
                return Err(TorrentError::InvalidPath {
                    path: dir.to_string(),
                });
            }
        }
    }
    Ok(clean)
}

/// List `relative` under `root`. A directory that does not exist yet lists as empty.
pub(crate) async fn list(root: &Path, relative: &Path) -> TorrentResult<Vec<FsEntry>> {
    let target = root.join(relative);
    let mut reader = match tokio::fs::read_dir(&target).await {
        Ok(reader) => reader,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(TorrentError::Io {
                operation: "engine.dir_info.read_dir",
                source,
            });
        }
    };

    let io_error = |source| TorrentError::Io {
        operation: "engine.dir_info.entry",
        source,
    };
    let mut entries = Vec::new();
    while let Some(entry) = reader.next_entry().await.map_err(io_error)? {
        let metadata = entry.metadata().await.map_err(io_error)?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let path = relative.join(&name).to_string_lossy().replace('\\', "/");
        entries.push(FsEntry {
            name,
            path,
            is_dir: metadata.is_dir(),
            size: if metadata.is_dir() { 0 } else { metadata.len() },
        });
    }
    entries.sort_by(|a, b| b.is_dir.cmp(&a.is_dir).then_with(|| a.name.cmp(&b.name)));
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_rejects_escapes() {
        assert_eq!(sanitize("").ok(), Some(PathBuf::new()));
        assert_eq!(sanitize("./a/./b").ok(), Some(PathBuf::from("a/b")));
        assert!(sanitize("../etc").is_err());
        assert!(sanitize("a/../../b").is_err());
        assert!(sanitize("/etc/passwd").is_err());
    }

    #[tokio::test]
    async fn lists_directories_first() -> Result<(), Box<dyn std::error::Error>> {
        let root = tempfile::tempdir()?;
        tokio::fs::create_dir_all(root.path().join("season/extras")).await?;
        tokio::fs::write(root.path().join("season/b.mkv"), b"12345").await?;
        tokio::fs::write(root.path().join("season/a.nfo"), b"1").await?;

        let entries = list(root.path(), Path::new("season")).await?;
        let names: Vec<_> = entries.iter().map(|entry| entry.name.as_str()).collect();
        assert_eq!(names, ["extras", "a.nfo", "b.mkv"]);
        assert_eq!(entries[0].path, "season/extras");
        assert!(entries[0].is_dir);
        assert_eq!(entries[2].size, 5);

        assert!(list(root.path(), Path::new("missing")).await?.is_empty());
        Ok(())
    }
}
