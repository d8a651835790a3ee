//! # MiniDB Codec
//!
//! Record codec for MiniDB: converts between in-memory [`Value`]s and the
//! bytes stored in the log.
//!
//! The encoding is deterministic CBOR, so the same logical value always
//! produces the same bytes:
//!
//! - Map keys are sorted by encoded form (length-first, then bytewise)
//! - Integers use the shortest encoding
//! - Floats are always 8-byte doubles and must be finite
//! - Strings must be UTF-8
//! - No indefinite-length items
//!
//! The CBOR major type tells scalars from documents, so records need no
//! schema. Decoding rejects anything the encoder would not produce.
//!
//! ## Usage
//!
//! ```
//! use minidb_codec::{to_canonical_cbor, from_cbor, Value};
//!
//! let value = Value::object([("user", Value::from("Alice")), ("text", Value::from("hi"))]);
//! let bytes = to_canonical_cbor(&value).unwrap();
//!
//! let decoded = from_cbor(&bytes).unwrap();
//! assert_eq!(value, decoded);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decoder;
mod encoder;
mod error;
mod json;
mod value;

pub use decoder::{from_cbor, CanonicalDecoder, MAX_BYTES_LENGTH, MAX_CONTAINER_ELEMENTS, MAX_DEPTH};
pub use encoder::{to_canonical_cbor, CanonicalEncoder};
pub use error::{CodecError, CodecResult};
pub use value::{Value, ValueKind};

/// Trait for types that can be encoded to canonical CBOR.
pub trait Encode {
    /// Encode this value to canonical CBOR bytes.
    fn encode(&self) -> CodecResult<Vec<u8>>;
}

/// Trait for types that can be decoded from CBOR.
pub trait Decode: Sized {
    /// Decode this value from CBOR bytes.
    fn decode(bytes: &[u8]) -> CodecResult<Self>;
}

impl Encode for Value {
    fn encode(&self) -> CodecResult<Vec<u8>> {
        to_canonical_cbor(self)
    }
}

impl Decode for Value {
    fn decode(bytes: &[u8]) -> CodecResult<Self> {
        from_cbor(bytes)
    }
}
