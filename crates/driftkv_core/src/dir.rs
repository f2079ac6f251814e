//! Data directory layout and scanning.
//!
//! ```text
//! <dir>/
//! ├─ LOCK            # advisory lock, one handle per directory
//! ├─ current-data    # the active (writable) segment
//! ├─ segment-<id>    # sealed segments
//! └─ temp-merge      # transient merge output
//! ```
//!
//! Any file not matching these names is ignored, so the directory stays
//! readable by other implementations of the record codec.

use crate::error::{DbError, DbResult};
use crate::segment::SealedSegment;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

const ACTIVE_FILE: &str = "current-data";
const SEGMENT_PREFIX: &str = "segment-";
const TEMP_MERGE_FILE: &str = "temp-merge";
const LOCK_FILE: &str = "LOCK";

/// Owns the data directory path and its advisory lock.
///
/// The lock is held for the lifetime of this value; a second open of the
/// same directory fails with [`DbError::Locked`].
#[derive(Debug)]
pub struct DataDir {
    path: PathBuf,
    _lock_file: File,
}

impl DataDir {
    /// Opens or creates the data directory and takes the exclusive lock.
    pub fn open(path: &Path) -> DbResult<Self> {
        fs::create_dir_all(path)?;

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(DbError::Locked);
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Returns the path of the active segment file.
    #[must_use]
    pub fn active_path(&self) -> PathBuf {
        self.path.join(ACTIVE_FILE)
    }

    /// Returns the path of a sealed segment file.
    #[must_use]
    pub fn segment_path(&self, id: u64) -> PathBuf {
        self.path.join(format!("{SEGMENT_PREFIX}{id}"))
    }

    /// Returns the path of the transient merge output.
    #[must_use]
    pub fn temp_merge_path(&self) -> PathBuf {
        self.path.join(TEMP_MERGE_FILE)
    }

    /// Scans the directory for sealed segments, ascending by id.
    pub fn scan_sealed(&self) -> DbResult<Vec<SealedSegment>> {
        let mut sealed = Vec::new();

        for dir_entry in fs::read_dir(&self.path)? {
            let dir_entry = dir_entry?;
            let name = dir_entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(id_str) = name.strip_prefix(SEGMENT_PREFIX) else {
                continue;
            };
            let Ok(id) = id_str.parse::<u64>() else { continue };
            sealed.push(SealedSegment {
                id,
                path: dir_entry.path(),
            });
        }

        sealed.sort_by_key(|seg| seg.id);
        Ok(sealed)
    }

    /// Returns the id the active segment gets: one past the highest sealed
    /// id, or 0 for an empty directory.
    #[must_use]
    pub fn next_active_id(sealed: &[SealedSegment]) -> u64 {
        sealed.last().map_or(0, |seg| seg.id + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_creates_directory() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("data");
        assert!(!path.exists());

        let dir = DataDir::open(&path).unwrap();
        assert!(path.is_dir());
        assert_eq!(dir.active_path(), path.join("current-data"));
        assert_eq!(dir.segment_path(7), path.join("segment-7"));
    }

    #[test]
    fn lock_prevents_second_open() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("locked");

        let _dir = DataDir::open(&path).unwrap();
        let result = DataDir::open(&path);
        assert!(matches!(result, Err(DbError::Locked)));
    }

    #[test]
    fn lock_released_on_drop() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("reopen");

        {
            let _dir = DataDir::open(&path).unwrap();
        }
        let _dir = DataDir::open(&path).unwrap();
    }

    #[test]
    fn scan_finds_segments_in_id_order() {
        let temp = tempdir().unwrap();
        let dir = DataDir::open(temp.path()).unwrap();

        fs::write(dir.segment_path(10), b"").unwrap();
        fs::write(dir.segment_path(2), b"").unwrap();
        fs::write(dir.segment_path(0), b"").unwrap();

        let sealed = dir.scan_sealed().unwrap();
        let ids: Vec<_> = sealed.iter().map(|seg| seg.id).collect();
        assert_eq!(ids, vec![0, 2, 10]);
        assert_eq!(DataDir::next_active_id(&sealed), 11);
    }

    #[test]
    fn scan_ignores_foreign_files() {
        let temp = tempdir().unwrap();
        let dir = DataDir::open(temp.path()).unwrap();

        fs::write(dir.active_path(), b"").unwrap();
        fs::write(dir.temp_merge_path(), b"").unwrap();
        fs::write(temp.path().join("segment-notanumber"), b"").unwrap();
        fs::write(temp.path().join("README"), b"").unwrap();

        let sealed = dir.scan_sealed().unwrap();
        assert!(sealed.is_empty());
        assert_eq!(DataDir::next_active_id(&sealed), 0);
    }
}
