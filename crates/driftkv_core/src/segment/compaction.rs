//! Sealed-segment compaction.
//!
//! Folds the records of the sealed segments down to the latest version per
//! key. Compaction must not change any lookup result; it only drops
//! superseded versions.

use crate::segment::Record;
use std::collections::HashMap;

/// Statistics from one compaction pass.
#[derive(Debug, Clone, Copy)]
pub struct CompactionStats {
    /// Records read from the sealed segments.
    pub input_records: usize,
    /// Records surviving into the merged segment.
    pub output_records: usize,
    /// Encoded bytes dropped along with superseded versions.
    pub bytes_reclaimed: usize,
}

/// Reduces `records` (oldest first) to the latest version of each key.
///
/// Output is sorted by key so merged segments are byte-deterministic; lookup
/// results do not depend on the order because the index is rebuilt after a
/// merge.
#[must_use]
pub fn compact(records: Vec<Record>) -> (Vec<Record>, CompactionStats) {
    let input_records = records.len();
    let input_size: usize = records.iter().map(Record::encoded_size).sum();

    let mut latest: HashMap<Vec<u8>, Record> = HashMap::with_capacity(records.len());
    for record in records {
        latest.insert(record.key.clone(), record);
    }

    let mut output: Vec<Record> = latest.into_values().collect();
    output.sort_by(|a, b| a.key.cmp(&b.key));

    let output_size: usize = output.iter().map(Record::encoded_size).sum();
    let stats = CompactionStats {
        input_records,
        output_records: output.len(),
        bytes_reclaimed: input_size.saturating_sub(output_size),
    };

    (output, stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latest_version_wins() {
        let records = vec![
            Record::string("k", "v1"),
            Record::string("k", "v2"),
            Record::string("k", "v3"),
        ];

        let (output, stats) = compact(records);
        assert_eq!(output.len(), 1);
        assert_eq!(output[0], Record::string("k", "v3"));
        assert_eq!(stats.input_records, 3);
        assert_eq!(stats.output_records, 1);
        assert!(stats.bytes_reclaimed > 0);
    }

    #[test]
    fn distinct_keys_are_preserved() {
        let records = vec![
            Record::string("a", "1"),
            Record::int64("b", 2),
            Record::string("c", "3"),
        ];

        let (output, stats) = compact(records.clone());
        assert_eq!(output, records);
        assert_eq!(stats.bytes_reclaimed, 0);
    }

    #[test]
    fn later_write_can_change_type() {
        let records = vec![Record::string("k", "text"), Record::int64("k", 9)];

        let (output, _) = compact(records);
        assert_eq!(output, vec![Record::int64("k", 9)]);
    }

    #[test]
    fn output_is_sorted_by_key() {
        let records = vec![
            Record::string("zz", "1"),
            Record::string("aa", "2"),
            Record::string("mm", "3"),
        ];

        let (output, _) = compact(records);
        let keys: Vec<_> = output.iter().map(|r| r.key.clone()).collect();
        assert_eq!(keys, vec![b"aa".to_vec(), b"mm".to_vec(), b"zz".to_vec()]);
    }

    #[test]
    fn empty_input() {
        let (output, stats) = compact(Vec::new());
        assert!(output.is_empty());
        assert_eq!(stats.input_records, 0);
        assert_eq!(stats.output_records, 0);
        assert_eq!(stats.bytes_reclaimed, 0);
    }
}
