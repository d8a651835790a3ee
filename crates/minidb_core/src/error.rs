//! Error types for the MiniDB engine.

use minidb_codec::{CodecError, ValueKind};
use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in MiniDB core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] minidb_storage::StorageError),

    /// Record codec error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The log failed an integrity check while loading.
    #[error("corrupt store at offset {offset}: {message}")]
    CorruptStore {
        /// Byte offset of the first bad record.
        offset: u64,
        /// Description of the corruption.
        message: String,
    },

    /// Encoded value exceeds `Config::max_value_size`.
    #[error("value too large: {size} bytes exceeds limit of {max}")]
    ValueTooLarge {
        /// Encoded size of the rejected value.
        size: usize,
        /// Configured maximum.
        max: usize,
    },

    /// Key does not fit in a log record.
    #[error("key too long: {len} bytes exceeds limit of {max}")]
    KeyTooLong {
        /// Length of the rejected key in bytes.
        len: usize,
        /// Maximum key length.
        max: usize,
    },

    /// Operation attempted after `close`.
    #[error("database handle is closed")]
    HandleClosed,

    /// Scalar where a document was required, or the reverse.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// Kind the operation requires.
        expected: ValueKind,
        /// Kind actually present.
        found: ValueKind,
    },

    /// Another handle holds the database lock.
    #[error("database locked: another handle has exclusive access")]
    DatabaseLocked,
}

/// Coarse error categories surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Disk unavailable, permissions, or other OS failure.
    Io,
    /// The log failed an integrity check at load.
    CorruptStore,
    /// A stored value failed to decode.
    CorruptRecord,
    /// A value lies outside the encodable domain.
    EncodeError,
    /// A stored value uses a type this version does not know.
    UnsupportedType,
    /// A value exceeds the configured size bound.
    ValueTooLarge,
    /// The handle was closed.
    HandleClosed,
    /// Scalar/document confusion.
    TypeMismatch,
    /// The path is held by another handle.
    Locked,
}

impl CoreError {
    /// Creates a corrupt store error.
    pub fn corrupt_store(offset: u64, message: impl Into<String>) -> Self {
        Self::CorruptStore {
            offset,
            message: message.into(),
        }
    }

    /// Creates a type mismatch error for an operation that needs a document.
    #[must_use]
    pub fn expected_document() -> Self {
        Self::TypeMismatch {
            expected: ValueKind::Document,
            found: ValueKind::Scalar,
        }
    }

    /// Returns the category of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Storage(_) | Self::Io(_) => ErrorKind::Io,
            Self::Codec(CodecError::Encode { .. }) | Self::KeyTooLong { .. } => {
                ErrorKind::EncodeError
            }
            Self::Codec(CodecError::UnsupportedType { .. }) => ErrorKind::UnsupportedType,
            Self::Codec(_) => ErrorKind::CorruptRecord,
            Self::CorruptStore { .. } => ErrorKind::CorruptStore,
            Self::ValueTooLarge { .. } => ErrorKind::ValueTooLarge,
            Self::HandleClosed => ErrorKind::HandleClosed,
            Self::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            Self::DatabaseLocked => ErrorKind::Locked,
        }
    }
}
