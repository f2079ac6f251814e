//! The in-memory key index.

use crate::error::DbResult;
use crate::segment::Record;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

/// Physical location of the latest record for a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    /// Segment the record lives in.
    pub segment_id: u64,
    /// Byte offset of the record start within that segment.
    pub offset: u64,
}

/// Process-wide map from key to the location of its latest record.
///
/// Readers copy the slot out under a shared lock. The writer's exclusive
/// section is a single insert; rebuilds swap a whole map in at once.
#[derive(Debug, Default)]
pub struct KeyIndex {
    map: RwLock<HashMap<Vec<u8>, Slot>>,
}

impl KeyIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up the slot for a key.
    pub fn get(&self, key: &[u8]) -> Option<Slot> {
        self.map.read().get(key).copied()
    }

    /// Points a key at a new location.
    pub fn insert(&self, key: Vec<u8>, slot: Slot) {
        self.map.write().insert(key, slot);
    }

    /// Atomically replaces the whole map.
    pub fn replace(&self, map: HashMap<Vec<u8>, Slot>) {
        *self.map.write() = map;
    }

    /// Returns the number of indexed keys.
    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    /// Returns whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }
}

/// Builds a fresh index map from segment files.
///
/// Files are processed ascending by id and front-to-back, so a later record
/// always overwrites an earlier one and the result points at the last write
/// for every key. A record that fails to decode fails the whole build, since
/// offsets after it cannot be trusted. Files that no longer exist are
/// skipped.
pub fn build_index(files: &[(u64, PathBuf)]) -> DbResult<HashMap<Vec<u8>, Slot>> {
    let mut ordered: Vec<&(u64, PathBuf)> = files.iter().collect();
    ordered.sort_by_key(|(id, _)| *id);

    let mut map = HashMap::new();
    for (segment_id, path) in ordered {
        scan_segment_file(path, *segment_id, &mut map)?;
    }
    Ok(map)
}

fn scan_segment_file(
    path: &Path,
    segment_id: u64,
    map: &mut HashMap<Vec<u8>, Slot>,
) -> DbResult<()> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err.into()),
    };

    let mut reader = BufReader::new(file);
    let mut offset = 0u64;
    while let Some((consumed, record)) = Record::read_from(&mut reader)? {
        map.insert(record.key, Slot { segment_id, offset });
        offset += consumed as u64;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use std::fs;
    use tempfile::tempdir;

    fn write_segment(path: &Path, records: &[Record]) {
        let mut bytes = Vec::new();
        for record in records {
            bytes.extend_from_slice(&record.encode());
        }
        fs::write(path, bytes).unwrap();
    }

    #[test]
    fn index_points_at_last_write() {
        let temp = tempdir().unwrap();
        let older = temp.path().join("segment-0");
        let newer = temp.path().join("segment-1");

        write_segment(
            &older,
            &[Record::string("a", "old"), Record::string("b", "only")],
        );
        write_segment(&newer, &[Record::string("a", "new")]);

        let map = build_index(&[(1, newer), (0, older.clone())]).unwrap();
        assert_eq!(map.len(), 2);

        // "a" resolves to the newer segment even though the file list was
        // passed out of order.
        assert_eq!(map[b"a".as_slice()].segment_id, 1);
        assert_eq!(map[b"a".as_slice()].offset, 0);

        let b_slot = map[b"b".as_slice()];
        assert_eq!(b_slot.segment_id, 0);
        assert_eq!(b_slot.offset, Record::string("a", "old").encoded_size() as u64);
    }

    #[test]
    fn duplicate_keys_within_one_file() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("segment-0");

        let first = Record::string("k", "v1");
        write_segment(&path, &[first.clone(), Record::string("k", "v2")]);

        let map = build_index(&[(0, path)]).unwrap();
        assert_eq!(map[b"k".as_slice()].offset, first.encoded_size() as u64);
    }

    #[test]
    fn missing_file_is_skipped() {
        let temp = tempdir().unwrap();
        let map = build_index(&[(0, temp.path().join("segment-0"))]).unwrap();
        assert!(map.is_empty());
    }

    #[test]
    fn corrupt_tail_fails_the_build() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("segment-0");

        let mut bytes = Record::string("k", "v").encode();
        bytes.extend_from_slice(&[0xde, 0xad]); // torn write
        fs::write(&path, bytes).unwrap();

        let result = build_index(&[(0, path)]);
        assert!(matches!(result, Err(DbError::Corrupt { .. })));
    }

    #[test]
    fn key_index_lookup_and_replace() {
        let index = KeyIndex::new();
        assert!(index.is_empty());

        index.insert(
            b"k".to_vec(),
            Slot {
                segment_id: 0,
                offset: 0,
            },
        );
        index.insert(
            b"k".to_vec(),
            Slot {
                segment_id: 1,
                offset: 16,
            },
        );
        assert_eq!(index.len(), 1);
        assert_eq!(
            index.get(b"k"),
            Some(Slot {
                segment_id: 1,
                offset: 16
            })
        );
        assert_eq!(index.get(b"missing"), None);

        index.replace(HashMap::new());
        assert!(index.is_empty());
    }
}
