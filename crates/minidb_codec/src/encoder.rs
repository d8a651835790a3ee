//! Deterministic CBOR encoder.

use crate::decoder::{MAX_BYTES_LENGTH, MAX_CONTAINER_ELEMENTS, MAX_DEPTH};
use crate::error::{CodecError, CodecResult};
use crate::value::{canonical_float_bits, Value};

/// Encode a value to canonical CBOR bytes.
///
/// The same logical value always produces the same bytes:
/// - Integers and lengths use the shortest head
/// - Map keys are written in encoded order (length-first, then bytewise)
/// - Floats are always 8-byte doubles, with `-0.0` written as `0.0`
/// - Only definite-length items are produced
///
/// # Errors
///
/// Returns [`CodecError::Encode`] for non-finite floats, for maps with
/// duplicate keys, and for values past the limits the decoder enforces
/// ([`MAX_DEPTH`], [`MAX_CONTAINER_ELEMENTS`], [`MAX_BYTES_LENGTH`]).
pub fn to_canonical_cbor(value: &Value) -> CodecResult<Vec<u8>> {
    let mut encoder = CanonicalEncoder::new();
    encoder.encode(value)?;
    Ok(encoder.into_bytes())
}

/// A canonical CBOR encoder writing into an owned buffer.
pub struct CanonicalEncoder {
    buffer: Vec<u8>,
    depth: usize,
}

impl CanonicalEncoder {
    /// Create a new encoder.
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create a new encoder with the specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
            depth: 0,
        }
    }

    /// Encode a value, appending to the buffer.
    ///
    /// Nothing the decoder would refuse is ever written: on error the buffer
    /// holds a partial item and should be discarded.
    pub fn encode(&mut self, value: &Value) -> CodecResult<()> {
        match value {
            Value::Null => self.buffer.push(0xf6),
            Value::Bool(false) => self.buffer.push(0xf4),
            Value::Bool(true) => self.buffer.push(0xf5),
            Value::Integer(n) => self.encode_integer(*n),
            Value::Float(f) => self.encode_float(*f)?,
            Value::Bytes(b) => {
                self.encode_head(2, check_length(b.len(), MAX_BYTES_LENGTH, "byte string")?);
                self.buffer.extend_from_slice(b);
            }
            Value::Text(s) => {
                self.encode_head(3, check_length(s.len(), MAX_BYTES_LENGTH, "text string")?);
                self.buffer.extend_from_slice(s.as_bytes());
            }
            Value::Array(items) => self.nested(|e| {
                e.encode_head(4, check_length(items.len(), MAX_CONTAINER_ELEMENTS, "array")?);
                for item in items {
                    e.encode(item)?;
                }
                Ok(())
            })?,
            Value::Map(pairs) => self.nested(|e| e.encode_map(pairs))?,
        }
        Ok(())
    }

    /// Consume this encoder and return the encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Get a reference to the encoded bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    fn nested(&mut self, f: impl FnOnce(&mut Self) -> CodecResult<()>) -> CodecResult<()> {
        if self.depth >= MAX_DEPTH {
            return Err(CodecError::encode(format!(
                "nesting deeper than {MAX_DEPTH} levels"
            )));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    #[allow(clippy::cast_sign_loss)]
    fn encode_integer(&mut self, n: i64) {
        if n >= 0 {
            self.encode_head(0, n as u64);
        } else {
            // Major type 1 carries -1 - n, which is in [0, 2^63 - 1].
            self.encode_head(1, (-1 - n) as u64);
        }
    }

    fn encode_float(&mut self, f: f64) -> CodecResult<()> {
        if !f.is_finite() {
            return Err(CodecError::encode(format!("non-finite float {f}")));
        }
        self.buffer.push(0xfb);
        self.buffer
            .extend_from_slice(&canonical_float_bits(f).to_be_bytes());
        Ok(())
    }

    #[allow(clippy::cast_possible_truncation)]
    fn encode_head(&mut self, major_type: u8, value: u64) {
        let mt = major_type << 5;

        if value < 24 {
            self.buffer.push(mt | (value as u8));
        } else if u8::try_from(value).is_ok() {
            self.buffer.push(mt | 24);
            self.buffer.push(value as u8);
        } else if u16::try_from(value).is_ok() {
            self.buffer.push(mt | 25);
            self.buffer.extend_from_slice(&(value as u16).to_be_bytes());
        } else if u32::try_from(value).is_ok() {
            self.buffer.push(mt | 26);
            self.buffer.extend_from_slice(&(value as u32).to_be_bytes());
        } else {
            self.buffer.push(mt | 27);
            self.buffer.extend_from_slice(&value.to_be_bytes());
        }
    }

    fn encode_map(&mut self, pairs: &[(Value, Value)]) -> CodecResult<()> {
        let len = check_length(pairs.len(), MAX_CONTAINER_ELEMENTS, "map")?;
        let mut encoded_pairs: Vec<(Vec<u8>, &Value)> = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            // Keys sit at the map's depth, the same as its values.
            let mut key_encoder = CanonicalEncoder {
                buffer: Vec::new(),
                depth: self.depth,
            };
            key_encoder.encode(key)?;
            encoded_pairs.push((key_encoder.into_bytes(), value));
        }

        encoded_pairs.sort_by(|a, b| a.0.len().cmp(&b.0.len()).then_with(|| a.0.cmp(&b.0)));

        if encoded_pairs.windows(2).any(|w| w[0].0 == w[1].0) {
            return Err(CodecError::encode("duplicate map key"));
        }

        self.encode_head(5, len);
        for (encoded_key, value) in encoded_pairs {
            self.buffer.extend_from_slice(&encoded_key);
            self.encode(value)?;
        }
        Ok(())
    }
}

fn check_length(len: usize, max: u64, what: &str) -> CodecResult<u64> {
    let len = len as u64;
    if len > max {
        return Err(CodecError::encode(format!(
            "{what} of {len} exceeds limit of {max}"
        )));
    }
    Ok(len)
}

impl Default for CanonicalEncoder {
    fn default() -> Self {
        Self::new()
    }
}
