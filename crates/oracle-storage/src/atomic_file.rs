//! Crash-safe whole-file replacement.
//!
//! Bytes go to a temp file in the target's directory, are synced, then
//! renamed over the target. A reader of the target sees either the complete
//! old content or the complete new content.

use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use tempfile::{Builder, NamedTempFile};
use tracing::debug;

const TEMP_PREFIX: &str = ".oracle-";

/// Temp file holding fully-synced new content, not yet visible at `target`.
/// Dropping it without `commit` deletes the temp file.
#[derive(Debug)]
pub struct StagedWrite {
    tmp: NamedTempFile,
    target: PathBuf,
}

impl StagedWrite {
    /// Path of the temp file backing this write.
    pub fn temp_path(&self) -> &Path {
        self.tmp.path()
    }

    /// Atomically replace `target` with the staged bytes.
    pub fn commit(self) -> io::Result<()> {
        let target = self.target;
        self.tmp.persist(&target).map_err(|e| e.error)?;
        sync_parent(&target);
        debug!(path = %target.display(), "atomic write committed");
        Ok(())
    }
}

/// Write `bytes` to a synced temp file beside `path` without touching `path`.
pub fn stage(path: &Path, bytes: &[u8]) -> io::Result<StagedWrite> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        Some(_) => Path::new("."),
        None => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid storage path",
            ))
        }
    };
    fs::create_dir_all(parent)?;

    let mut tmp = Builder::new().prefix(TEMP_PREFIX).tempfile_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;

    Ok(StagedWrite {
        tmp,
        target: path.to_path_buf(),
    })
}

/// Stage then commit. On any error the target is untouched and the temp
/// file is removed.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    stage(path, bytes)?.commit()
}

/// Best-effort: persist the rename itself by syncing the directory entry.
fn sync_parent(path: &Path) {
    #[cfg(unix)]
    {
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        if let Ok(dir) = fs::File::open(parent) {
            let _ = dir.sync_all();
        }
    }
    #[cfg(not(unix))]
    let _ = path;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_entries(dir: &Path) -> Vec<String> {
        fs::read_dir(dir)
            .expect("read dir")
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .filter(|name| name.starts_with(TEMP_PREFIX))
            .collect()
    }

    #[test]
    fn writes_and_replaces() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("profiles.bin");

        write_atomic(&path, b"first").expect("first write");
        write_atomic(&path, b"second").expect("second write");

        assert_eq!(fs::read(&path).expect("read"), b"second");
        assert!(temp_entries(path.parent().unwrap()).is_empty());
    }

    #[test]
    fn dropped_stage_leaves_target_and_no_garbage() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("profiles.bin");
        write_atomic(&path, b"old").expect("seed");

        let staged = stage(&path, b"new").expect("stage");
        assert!(staged.temp_path().exists());
        assert_eq!(fs::read(&path).expect("read"), b"old");
        drop(staged);

        assert_eq!(fs::read(&path).expect("read"), b"old");
        assert!(temp_entries(dir.path()).is_empty());
    }

    #[test]
    fn unwritable_target_surfaces_io_error_and_cleans_up() {
        let dir = tempfile::tempdir().expect("tempdir");
        // A directory in the target's place makes the rename fail.
        let path = dir.path().join("occupied");
        fs::create_dir(&path).expect("mkdir");
        fs::write(path.join("child"), b"x").expect("child");

        assert!(write_atomic(&path, b"data").is_err());
        assert!(path.is_dir());
        assert!(temp_entries(dir.path()).is_empty());
    }
}
