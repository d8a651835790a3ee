//! Log writer.

use super::record::LogRecord;
use crate::config::Config;
use crate::error::CoreResult;
use crate::types::SequenceNumber;
use minidb_storage::StorageBackend;
use std::io;

/// Where an appended record landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Appended {
    /// Sequence number assigned to the record.
    pub sequence: SequenceNumber,
    /// Offset of the record in the log.
    pub offset: u64,
    /// Encoded length of the record.
    pub len: u64,
    /// Whether the append was followed by a sync.
    pub synced: bool,
}

/// Appends records to the log and applies the sync policy.
///
/// The writer owns sequence assignment. It is not synchronized itself; the
/// database keeps it behind its writer lock.
pub struct LogWriter {
    backend: Box<dyn StorageBackend>,
    sync_on_write: bool,
    sync_batch_size: usize,
    next_sequence: SequenceNumber,
    unsynced: usize,
}

impl LogWriter {
    /// Creates a writer over a recovered log.
    ///
    /// `next_sequence` must be greater than every sequence already in the log.
    pub fn new(backend: Box<dyn StorageBackend>, config: &Config, next_sequence: SequenceNumber) -> Self {
        Self {
            backend,
            sync_on_write: config.sync_on_write,
            sync_batch_size: config.sync_batch_size,
            next_sequence,
            unsynced: 0,
        }
    }

    /// Returns the sequence number the next record will get.
    #[must_use]
    pub fn next_sequence(&self) -> SequenceNumber {
        self.next_sequence
    }

    /// Returns the current log size.
    pub fn size(&self) -> CoreResult<u64> {
        Ok(self.backend.size()?)
    }

    /// Returns whether appended records are waiting for a sync.
    #[must_use]
    pub fn has_unsynced(&self) -> bool {
        self.unsynced > 0
    }

    /// Reads the whole log.
    pub fn read_all(&self) -> CoreResult<Vec<u8>> {
        Ok(self.backend.read_all()?)
    }

    /// Appends a record built by `build` from the next sequence number.
    ///
    /// If the write or its sync fails, the log is cut back to where it was
    /// and the sequence number is not consumed, so a failed append leaves
    /// no trace.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be encoded or the backend fails.
    pub fn append(&mut self, build: impl FnOnce(SequenceNumber) -> LogRecord) -> CoreResult<Appended> {
        let sequence = self.next_sequence;
        let bytes = build(sequence).encode()?;
        let start = self.backend.size()?;
        let unsynced = self.unsynced;

        if let Err(err) = self.write_and_sync(&bytes) {
            self.rollback(start);
            self.unsynced = unsynced;
            return Err(err);
        }

        let synced = self.unsynced == 0;
        self.next_sequence = sequence.next();
        Ok(Appended {
            sequence,
            offset: start,
            len: bytes.len() as u64,
            synced,
        })
    }

    fn write_and_sync(&mut self, bytes: &[u8]) -> CoreResult<()> {
        self.backend.append(bytes)?;
        self.unsynced += 1;

        let batch_full = self.sync_batch_size > 0 && self.unsynced >= self.sync_batch_size;
        if self.sync_on_write || batch_full {
            self.backend.flush()?;
            self.backend.sync()?;
            self.unsynced = 0;
        }
        Ok(())
    }

    /// Cuts the log back to `start`, even if the backend reports no growth:
    /// a failed write may have left bytes past its tracked size.
    fn rollback(&mut self, start: u64) {
        if let Err(e) = self.backend.truncate(start) {
            tracing::warn!(offset = start, error = %e, "failed to roll back partial append");
        }
    }

    /// Makes all appended records durable.
    ///
    /// Returns whether a sync was needed.
    pub fn sync(&mut self) -> CoreResult<bool> {
        if self.unsynced == 0 {
            return Ok(false);
        }
        self.backend.flush()?;
        self.backend.sync()?;
        self.unsynced = 0;
        Ok(true)
    }

    /// Returns whether the log outlives the process.
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        self.backend.is_persistent()
    }

    /// Replaces the log contents with `log`, keeping the sequence counter.
    ///
    /// Not crash safe: a failure between the truncate and the append loses
    /// the log.
    ///
    /// # Errors
    ///
    /// Refuses persistent backends with an `Unsupported` I/O error.
    pub fn rewrite(&mut self, log: &[u8]) -> CoreResult<()> {
        if self.is_persistent() {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "in-place rewrite of a persistent log is not crash safe",
            )
            .into());
        }
        self.backend.truncate(0)?;
        self.backend.append(log)?;
        self.backend.flush()?;
        self.backend.sync()?;
        self.unsynced = 0;
        Ok(())
    }

    /// Points the writer at a new backend holding an already synced log.
    pub fn replace_backend(&mut self, backend: Box<dyn StorageBackend>) {
        self.backend = backend;
        self.unsynced = 0;
    }
}
