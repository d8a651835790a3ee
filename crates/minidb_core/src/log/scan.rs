//! Walking a log the way recovery does.

use super::header::{check_header, HeaderCheck, LOG_HEADER_SIZE};
use super::record::{LogRecord, RecordDefect};
use crate::config::Config;
use crate::error::CoreError;

/// A record found during a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedRecord {
    /// Offset of the record in the log.
    pub offset: u64,
    /// Encoded length of the record.
    pub len: u64,
    /// The decoded record.
    pub record: LogRecord,
}

/// Why a scan stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanStop {
    /// Every byte of the log belongs to a valid record.
    End,
    /// The log ends in an interrupted write that can be cut off.
    TornTail {
        /// Where the torn bytes begin.
        offset: u64,
        /// What was wrong with them.
        reason: String,
    },
    /// The log is damaged in a way truncation cannot repair.
    Corrupt {
        /// Where the damage begins.
        offset: u64,
        /// What was wrong.
        reason: String,
    },
}

/// Result of scanning a log.
#[derive(Debug, Clone)]
pub struct LogScan {
    /// Valid records, in log order.
    pub records: Vec<ScannedRecord>,
    /// Length of the valid prefix of the log.
    pub valid_len: u64,
    /// Total length of the scanned bytes.
    pub total_len: u64,
    /// Why the scan stopped.
    pub stop: ScanStop,
}

impl LogScan {
    /// Returns whether the log lacks a complete header.
    #[must_use]
    pub fn needs_header(&self) -> bool {
        self.valid_len < LOG_HEADER_SIZE as u64
    }

    /// Returns the number of bytes a recovery would cut off.
    #[must_use]
    pub fn torn_bytes(&self) -> u64 {
        match self.stop {
            ScanStop::TornTail { .. } => self.total_len - self.valid_len,
            _ => 0,
        }
    }

    /// Converts a corrupt stop into an error.
    ///
    /// # Errors
    ///
    /// Returns `CorruptStore` if the scan hit unrecoverable damage.
    pub fn check(&self) -> Result<(), CoreError> {
        match &self.stop {
            ScanStop::Corrupt { offset, reason } => {
                Err(CoreError::corrupt_store(*offset, reason.clone()))
            }
            _ => Ok(()),
        }
    }
}

/// Scans a complete log image, accepting records up to the largest size any
/// configuration can write.
///
/// See [`scan_log_with_limit`].
#[must_use]
pub fn scan_log(log: &[u8]) -> LogScan {
    scan_log_with_limit(log, Config::new().max_value_size(usize::MAX).max_record_len())
}

/// Scans a complete log image.
///
/// An interrupted append can only damage the end of the log, so a defect is
/// treated as a torn tail when nothing valid could follow it: the record is
/// incomplete, its checksum fails and it ends exactly at the end of the log,
/// or everything from it onward is zero fill. Any other defect is corruption.
///
/// An incomplete record claiming more than `max_record_len` bytes was never
/// written whole by anyone, so its length field is damaged and it counts as
/// corruption rather than a torn tail.
#[must_use]
pub fn scan_log_with_limit(log: &[u8], max_record_len: usize) -> LogScan {
    let total_len = log.len() as u64;
    let mut records = Vec::new();

    match check_header(log) {
        HeaderCheck::Valid => {}
        HeaderCheck::Torn => {
            let stop = if log.is_empty() {
                ScanStop::End
            } else {
                ScanStop::TornTail {
                    offset: 0,
                    reason: "incomplete log header".into(),
                }
            };
            return LogScan {
                records,
                valid_len: 0,
                total_len,
                stop,
            };
        }
        HeaderCheck::Invalid(reason) => {
            return LogScan {
                records,
                valid_len: 0,
                total_len,
                stop: ScanStop::Corrupt { offset: 0, reason },
            };
        }
    }

    let mut pos = LOG_HEADER_SIZE;
    let mut last_sequence = None;

    let stop = loop {
        if pos == log.len() {
            break ScanStop::End;
        }
        let rest = &log[pos..];
        let offset = pos as u64;

        match LogRecord::decode(rest) {
            Ok((record, used)) => {
                if let Some(last) = last_sequence {
                    if record.sequence <= last {
                        break ScanStop::Corrupt {
                            offset,
                            reason: format!(
                                "sequence {} does not follow {}",
                                record.sequence, last
                            ),
                        };
                    }
                }
                last_sequence = Some(record.sequence);
                records.push(ScannedRecord {
                    offset,
                    len: used as u64,
                    record,
                });
                pos += used;
            }
            Err(defect) => {
                let torn = match &defect {
                    RecordDefect::Incomplete { needed, .. } => *needed <= max_record_len,
                    RecordDefect::Checksum { record_len, .. } => *record_len == rest.len(),
                    RecordDefect::Malformed(_) => false,
                } || rest.iter().all(|&b| b == 0);

                let reason = defect.to_string();
                break if torn {
                    ScanStop::TornTail { offset, reason }
                } else {
                    ScanStop::Corrupt { offset, reason }
                };
            }
        }
    };

    LogScan {
        records,
        valid_len: pos as u64,
        total_len,
        stop,
    }
}
