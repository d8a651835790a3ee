//! Log compaction.
//!
//! Compaction rewrites the log keeping only the live value of each key,
//! reclaiming the space taken by superseded versions and tombstones.
//!
//! ## Invariants
//!
//! - Compaction **MUST NOT** change logical state
//! - The record with the highest sequence per key wins
//! - Tombstones are dropped along with everything they shadow
//! - Output keeps the original sequence numbers, in ascending order

use crate::error::CoreResult;
use crate::log::{encode_header, LogRecord};
use std::collections::HashMap;

/// Result of a compaction operation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CompactionResult {
    /// Number of records in the input.
    pub input_records: usize,
    /// Number of records in the output.
    pub output_records: usize,
    /// Number of tombstones removed.
    pub tombstones_removed: usize,
    /// Number of superseded values removed.
    pub obsolete_versions_removed: usize,
    /// Log size before compaction.
    pub bytes_before: u64,
    /// Log size after compaction.
    pub bytes_after: u64,
}

impl CompactionResult {
    /// Returns the number of bytes reclaimed.
    #[must_use]
    pub fn bytes_saved(&self) -> u64 {
        self.bytes_before.saturating_sub(self.bytes_after)
    }
}

/// Reduces a sequence of log records to the live set.
///
/// ## Example
///
/// ```rust
/// use minidb_core::{Compactor, LogRecord, SequenceNumber};
///
/// let records = vec![
///     LogRecord::put(SequenceNumber::new(1), "a", vec![0x01]),
///     LogRecord::put(SequenceNumber::new(2), "a", vec![0x02]),
///     LogRecord::tombstone(SequenceNumber::new(3), "b"),
/// ];
/// let (live, result) = Compactor::compact(records);
/// assert_eq!(live.len(), 1);
/// assert_eq!(result.obsolete_versions_removed, 1);
/// assert_eq!(result.tombstones_removed, 1);
/// ```
pub struct Compactor;

impl Compactor {
    /// Compacts a set of records, producing the live records in sequence order.
    ///
    /// The byte counts of the returned result are left at zero; see
    /// [`Compactor::compact_log`] for a version that fills them in.
    #[must_use]
    pub fn compact(records: Vec<LogRecord>) -> (Vec<LogRecord>, CompactionResult) {
        let input_records = records.len();
        let mut latest: HashMap<String, LogRecord> = HashMap::with_capacity(records.len());
        let mut obsolete = 0usize;
        let mut tombstones = 0usize;

        for record in records {
            if record.is_tombstone() {
                tombstones += 1;
            }
            let replace = latest
                .get(&record.key)
                .map_or(true, |existing| record.sequence > existing.sequence);
            if !replace {
                if !record.is_tombstone() {
                    obsolete += 1;
                }
                continue;
            }
            if let Some(old) = latest.insert(record.key.clone(), record) {
                if !old.is_tombstone() {
                    obsolete += 1;
                }
            }
        }

        let mut output: Vec<LogRecord> = latest
            .into_values()
            .filter(|record| !record.is_tombstone())
            .collect();
        output.sort_by_key(|record| record.sequence);

        let result = CompactionResult {
            input_records,
            output_records: output.len(),
            tombstones_removed: tombstones,
            obsolete_versions_removed: obsolete,
            bytes_before: 0,
            bytes_after: 0,
        };
        (output, result)
    }

    /// Compacts records into a complete log image, header included.
    ///
    /// `bytes_before` is the size of the log the records came from.
    pub fn compact_log(records: Vec<LogRecord>, bytes_before: u64) -> CoreResult<(Vec<u8>, CompactionResult)> {
        let (live, mut result) = Self::compact(records);

        let mut log = encode_header().to_vec();
        for record in &live {
            log.extend_from_slice(&record.encode()?);
        }

        result.bytes_before = bytes_before;
        result.bytes_after = log.len() as u64;
        Ok((log, result))
    }
}
