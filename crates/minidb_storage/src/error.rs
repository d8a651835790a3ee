//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Attempted to read beyond the end of storage.
    #[error("read beyond end of storage: offset {offset}, len {len}, size {size}")]
    ReadPastEnd {
        /// The requested read offset.
        offset: u64,
        /// The requested read length.
        len: usize,
        /// The current storage size.
        size: u64,
    },

    /// Truncation target lies past the current end.
    #[error("cannot truncate to {requested} bytes, storage holds {size}")]
    TruncatePastEnd {
        /// The requested new size.
        requested: u64,
        /// The current storage size.
        size: u64,
    },

    /// A fault injected by [`crate::FaultyBackend`].
    #[error("injected fault: {0}")]
    Injected(&'static str),
}

impl StorageError {
    /// Returns true if the error came from the operating system.
    #[must_use]
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Injected(_))
    }
}
