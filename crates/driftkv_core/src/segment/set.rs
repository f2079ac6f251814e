//! Sealed-segment bookkeeping.

use parking_lot::RwLock;
use std::path::PathBuf;

/// A sealed, read-only segment file.
#[derive(Debug, Clone)]
pub struct SealedSegment {
    /// Monotonic id assigned when the segment was the active one.
    pub id: u64,
    /// Path of the segment file.
    pub path: PathBuf,
}

#[derive(Debug)]
struct SegmentsInner {
    active_id: u64,
    sealed: Vec<SealedSegment>,
}

/// The sealed-segment list plus the active segment id.
///
/// Guarded by its own lock, separate from the key index, so a reader
/// resolving a file path never queues behind index updates. Sealed ids are
/// always strictly less than the active id.
#[derive(Debug)]
pub struct SegmentSet {
    inner: RwLock<SegmentsInner>,
}

impl SegmentSet {
    /// Creates a segment set from the state found on disk.
    #[must_use]
    pub fn new(active_id: u64, sealed: Vec<SealedSegment>) -> Self {
        Self {
            inner: RwLock::new(SegmentsInner { active_id, sealed }),
        }
    }

    /// Returns the current active segment id.
    pub fn active_id(&self) -> u64 {
        self.inner.read().active_id
    }

    /// Returns a copy of the sealed-segment list, ascending by id.
    pub fn sealed(&self) -> Vec<SealedSegment> {
        self.inner.read().sealed.clone()
    }

    /// Returns the number of sealed segments.
    pub fn sealed_count(&self) -> usize {
        self.inner.read().sealed.len()
    }

    /// Returns the active id and sealed list in one consistent snapshot.
    pub fn snapshot(&self) -> (u64, Vec<SealedSegment>) {
        let inner = self.inner.read();
        (inner.active_id, inner.sealed.clone())
    }

    /// Seals the active segment under the lock.
    ///
    /// `rename` receives the id being sealed and moves the active file to
    /// its sealed path. Holding the exclusive lock across the rename means
    /// no reader can resolve a path from the half-rotated state. On error
    /// nothing is recorded and the active id is unchanged.
    pub fn seal_active_with<E, F>(&self, rename: F) -> Result<u64, E>
    where
        F: FnOnce(u64) -> Result<PathBuf, E>,
    {
        let mut inner = self.inner.write();
        let sealed_id = inner.active_id;
        let path = rename(sealed_id)?;
        inner.sealed.push(SealedSegment {
            id: sealed_id,
            path,
        });
        inner.active_id += 1;
        Ok(sealed_id)
    }

    /// Replaces the whole sealed list with the single merged segment.
    pub fn replace_sealed(&self, merged: SealedSegment) {
        self.inner.write().sealed = vec![merged];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seal(set: &SegmentSet) -> u64 {
        set.seal_active_with(|id| Ok::<_, ()>(PathBuf::from(format!("segment-{id}"))))
            .unwrap()
    }

    #[test]
    fn seal_active_bumps_id() {
        let set = SegmentSet::new(0, Vec::new());
        assert_eq!(set.active_id(), 0);

        let sealed_id = seal(&set);
        assert_eq!(sealed_id, 0);
        assert_eq!(set.active_id(), 1);
        assert_eq!(set.sealed_count(), 1);

        seal(&set);
        assert_eq!(set.active_id(), 2);
        assert_eq!(set.sealed().last().unwrap().id, 1);
    }

    #[test]
    fn failed_rename_leaves_state_unchanged() {
        let set = SegmentSet::new(0, Vec::new());
        let result = set.seal_active_with(|_| Err("rename failed"));
        assert!(result.is_err());
        assert_eq!(set.active_id(), 0);
        assert_eq!(set.sealed_count(), 0);
    }

    #[test]
    fn replace_sealed_keeps_one_segment() {
        let set = SegmentSet::new(0, Vec::new());
        seal(&set);
        seal(&set);
        seal(&set);

        set.replace_sealed(SealedSegment {
            id: 0,
            path: PathBuf::from("segment-0"),
        });

        let (active_id, sealed) = set.snapshot();
        assert_eq!(active_id, 3);
        assert_eq!(sealed.len(), 1);
        assert_eq!(sealed[0].id, 0);
    }
}
