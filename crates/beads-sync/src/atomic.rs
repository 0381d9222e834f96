//! Atomic file writes: write to a sibling temp file, then rename.
//!
//! Every write this crate performs against `.beads/*.jsonl` goes through
//! this helper so a crash or concurrent reader never observes a
//! partially-written file.

use std::fs;
use std::io::Write;
use std::path::Path;

use crate::error::{Result, SyncError};

/// Writes `contents` to `path` atomically: a temp file in the same
/// directory is written and fsynced, then renamed over `path`.
///
/// # Errors
///
/// Returns [`SyncError::Io`] if the temp file cannot be created, written, or
/// renamed into place.
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("tmp");
    let tmp_path = dir.join(format!(".{file_name}.tmp"));

    let write = || -> std::io::Result<()> {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(contents.as_bytes())?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)?;
        Ok(())
    };

    write().map_err(|source| SyncError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Reads `path`'s contents, returning an empty string if it does not exist.
///
/// Used for snapshot companions (`.base`, `.left`) which are absent on the
/// very first sync cycle.
pub fn read_or_empty(path: &Path) -> Result<String> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
        Err(source) => Err(SyncError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_atomic_creates_file_with_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("issues.jsonl");
        write_atomic(&path, "hello\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "hello\n");
    }

    #[test]
    fn write_atomic_overwrites_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("issues.jsonl");
        write_atomic(&path, "first\n").unwrap();
        write_atomic(&path, "second\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "second\n");
    }

    #[test]
    fn write_atomic_leaves_no_temp_file_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("issues.jsonl");
        write_atomic(&path, "x\n").unwrap();
        let remaining: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(remaining.len(), 1);
    }

    #[test]
    fn read_or_empty_missing_file_returns_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nonexistent.jsonl");
        assert_eq!(read_or_empty(&path).unwrap(), "");
    }
}
