//! Storage backend trait definition.

use crate::error::StorageResult;

/// An append-only byte store holding one MiniDB log.
///
/// Backends are **opaque**: they never interpret the bytes. The engine owns
/// the log format, framing and checksums.
///
/// # Invariants
///
/// - `append` writes at the current end and returns that offset
/// - `read_at` returns exactly the bytes previously appended there
/// - after `sync` returns, everything appended so far survives a crash
/// - `truncate` only ever shrinks the store
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::ReadPastEnd`] if the range is not fully
    /// inside the store, or an I/O error.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Reads the whole store.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined or the read fails.
    fn read_all(&self) -> StorageResult<Vec<u8>> {
        let size = self.size()?;
        let len = usize::try_from(size).map_err(|_| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, "store too large for memory")
        })?;
        self.read_at(0, len)
    }

    /// Appends data to the end of the store, returning its offset.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs. Part of `data` may already
    /// have been written when this fails, possibly past the reported
    /// [`size`](Self::size); `truncate` to the old size removes it.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Pushes buffered writes to the operating system.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    fn flush(&mut self) -> StorageResult<()>;

    /// Returns the current size in bytes, which is where the next append lands.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;

    /// Makes all appended data and the file length durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    fn sync(&mut self) -> StorageResult<()>;

    /// Returns whether the bytes outlive the process.
    ///
    /// The engine only rewrites a store in place when a crash halfway
    /// through cannot lose anything, that is, when it is not persistent.
    fn is_persistent(&self) -> bool {
        true
    }

    /// Shrinks the store to `new_size` bytes.
    ///
    /// Used to cut off a torn tail during recovery and to undo a failed
    /// append. Truncating to the current size still discards any bytes a
    /// failed write left beyond it.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::TruncatePastEnd`] if `new_size` is
    /// larger than the current size, or an I/O error.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;
}
