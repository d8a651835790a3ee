//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur during encoding or decoding.
///
/// Encoding only ever produces [`CodecError::Encode`]. Decoding produces
/// [`CodecError::UnsupportedType`] for well-formed items this version does not
/// understand and one of the remaining variants for malformed input; see
/// [`CodecError::is_corrupt_record`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The value lies outside the encodable domain.
    #[error("encode error: {message}")]
    Encode {
        /// Description of the encoding error.
        message: String,
    },

    /// The bytes do not form a valid record encoding.
    #[error("corrupt record: {message}")]
    CorruptRecord {
        /// Description of the decoding error.
        message: String,
    },

    /// A decoded item is well-formed but not recognized by this version.
    #[error("unsupported type: {type_name}")]
    UnsupportedType {
        /// Name of the unsupported type.
        type_name: String,
    },

    /// Indefinite-length items are forbidden.
    #[error("indefinite-length items are forbidden")]
    IndefiniteLengthForbidden,

    /// Invalid UTF-8 string.
    #[error("invalid UTF-8 string")]
    InvalidUtf8,

    /// Unexpected end of input.
    #[error("unexpected end of input")]
    UnexpectedEof,

    /// A length prefix claims more elements or bytes than allowed.
    #[error("size limit exceeded: claimed {claimed}, max {max_allowed}")]
    SizeLimitExceeded {
        /// The size claimed by the input.
        claimed: u64,
        /// The maximum size accepted.
        max_allowed: u64,
    },

    /// Integer does not fit in an `i64`.
    #[error("integer overflow")]
    IntegerOverflow,
}

impl CodecError {
    /// Create an encode error.
    pub fn encode(message: impl Into<String>) -> Self {
        Self::Encode {
            message: message.into(),
        }
    }

    /// Create a corrupt record error.
    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::CorruptRecord {
            message: message.into(),
        }
    }

    /// Create an unsupported type error.
    pub fn unsupported_type(type_name: impl Into<String>) -> Self {
        Self::UnsupportedType {
            type_name: type_name.into(),
        }
    }

    /// Returns true if this error means the input bytes are malformed.
    #[must_use]
    pub fn is_corrupt_record(&self) -> bool {
        !matches!(self, Self::Encode { .. } | Self::UnsupportedType { .. })
    }
}
