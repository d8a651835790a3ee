//! Validating CBOR decoder.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;

/// Decode a value from canonical CBOR bytes.
///
/// The whole input must be consumed by exactly one item.
///
/// # Errors
///
/// Returns [`CodecError::UnsupportedType`] for tags and unknown simple values,
/// and a corrupt-record error (see [`CodecError::is_corrupt_record`]) for
/// anything that is not the canonical encoding of a [`Value`].
pub fn from_cbor(bytes: &[u8]) -> CodecResult<Value> {
    let mut decoder = CanonicalDecoder::new(bytes);
    let value = decoder.decode()?;
    if !decoder.is_empty() {
        return Err(CodecError::corrupt(format!(
            "{} trailing bytes after value",
            decoder.remaining().len()
        )));
    }
    Ok(value)
}

/// A canonical CBOR decoder.
///
/// Rejects every encoding the encoder would not have produced, so that a
/// decoded value re-encodes to the same bytes.
pub struct CanonicalDecoder<'a> {
    data: &'a [u8],
    pos: usize,
    depth: usize,
}

/// Maximum element count for arrays and maps.
pub const MAX_CONTAINER_ELEMENTS: u64 = 16 * 1024 * 1024;

/// Maximum byte/text string length.
pub const MAX_BYTES_LENGTH: u64 = 256 * 1024 * 1024;

/// Maximum nesting of arrays and maps.
pub const MAX_DEPTH: usize = 512;

const NON_SHORTEST: &str = "non-canonical: value could be encoded in fewer bytes";

impl<'a> CanonicalDecoder<'a> {
    /// Create a new decoder for the given bytes.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            depth: 0,
        }
    }

    /// Decode the next value.
    #[allow(clippy::cast_possible_wrap)]
    pub fn decode(&mut self) -> CodecResult<Value> {
        let initial_byte = self.read_byte()?;
        let major_type = initial_byte >> 5;
        let additional_info = initial_byte & 0x1f;

        match major_type {
            0 => {
                let n = self.decode_unsigned(additional_info)?;
                i64::try_from(n)
                    .map(Value::Integer)
                    .map_err(|_| CodecError::IntegerOverflow)
            }
            1 => {
                let n = self.decode_unsigned(additional_info)?;
                i64::try_from(n)
                    .map(|n| Value::Integer(-1 - n))
                    .map_err(|_| CodecError::IntegerOverflow)
            }
            2 => {
                let len = self.decode_length(additional_info, MAX_BYTES_LENGTH)?;
                Ok(Value::Bytes(self.read_bytes(len)?.to_vec()))
            }
            3 => {
                let len = self.decode_length(additional_info, MAX_BYTES_LENGTH)?;
                let bytes = self.read_bytes(len)?;
                let text = std::str::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8)?;
                Ok(Value::Text(text.to_string()))
            }
            4 => self.nested(|d| d.decode_array(additional_info)),
            5 => self.nested(|d| d.decode_map(additional_info)),
            6 => {
                let tag = self.decode_unsigned(additional_info)?;
                Err(CodecError::unsupported_type(format!("tag {tag}")))
            }
            _ => self.decode_simple(additional_info),
        }
    }

    /// Check if all bytes have been consumed.
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Get remaining bytes.
    pub fn remaining(&self) -> &[u8] {
        &self.data[self.pos..]
    }

    fn nested(
        &mut self,
        f: impl FnOnce(&mut Self) -> CodecResult<Value>,
    ) -> CodecResult<Value> {
        if self.depth >= MAX_DEPTH {
            return Err(CodecError::corrupt("nesting too deep"));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    #[inline]
    fn read_byte(&mut self) -> CodecResult<u8> {
        let byte = *self.data.get(self.pos).ok_or(CodecError::UnexpectedEof)?;
        self.pos += 1;
        Ok(byte)
    }

    #[inline]
    fn read_bytes(&mut self, len: usize) -> CodecResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or(CodecError::UnexpectedEof)?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn read_array<const N: usize>(&mut self) -> CodecResult<[u8; N]> {
        let bytes = self.read_bytes(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    fn decode_unsigned(&mut self, additional_info: u8) -> CodecResult<u64> {
        match additional_info {
            0..=23 => Ok(u64::from(additional_info)),
            24 => {
                let value = self.read_byte()?;
                if value < 24 {
                    return Err(CodecError::corrupt(NON_SHORTEST));
                }
                Ok(u64::from(value))
            }
            25 => {
                let value = u16::from_be_bytes(self.read_array()?);
                if u8::try_from(value).is_ok() {
                    return Err(CodecError::corrupt(NON_SHORTEST));
                }
                Ok(u64::from(value))
            }
            26 => {
                let value = u32::from_be_bytes(self.read_array()?);
                if u16::try_from(value).is_ok() {
                    return Err(CodecError::corrupt(NON_SHORTEST));
                }
                Ok(u64::from(value))
            }
            27 => {
                let value = u64::from_be_bytes(self.read_array()?);
                if u32::try_from(value).is_ok() {
                    return Err(CodecError::corrupt(NON_SHORTEST));
                }
                Ok(value)
            }
            31 => Err(CodecError::IndefiniteLengthForbidden),
            _ => Err(CodecError::corrupt("reserved additional info")),
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn decode_length(&mut self, additional_info: u8, max_allowed: u64) -> CodecResult<usize> {
        let claimed = self.decode_unsigned(additional_info)?;
        if claimed > max_allowed {
            return Err(CodecError::SizeLimitExceeded {
                claimed,
                max_allowed,
            });
        }
        Ok(claimed as usize)
    }

    fn decode_array(&mut self, additional_info: u8) -> CodecResult<Value> {
        let len = self.decode_length(additional_info, MAX_CONTAINER_ELEMENTS)?;
        // Every element takes at least one byte.
        let mut items = Vec::with_capacity(len.min(self.data.len() - self.pos));
        for _ in 0..len {
            items.push(self.decode()?);
        }
        Ok(Value::Array(items))
    }

    fn decode_map(&mut self, additional_info: u8) -> CodecResult<Value> {
        let len = self.decode_length(additional_info, MAX_CONTAINER_ELEMENTS)?;
        let mut pairs = Vec::with_capacity(len.min(self.data.len() - self.pos));
        let mut prev_key: Option<&'a [u8]> = None;

        for _ in 0..len {
            let key_start = self.pos;
            let key = self.decode()?;
            let key_bytes = &self.data[key_start..self.pos];

            // Strictly increasing also rules out duplicates.
            if let Some(prev) = prev_key {
                let ordering = prev.len().cmp(&key_bytes.len()).then_with(|| prev.cmp(key_bytes));
                if ordering != std::cmp::Ordering::Less {
                    return Err(CodecError::corrupt(
                        "non-canonical: map keys not in strictly increasing order",
                    ));
                }
            }
            prev_key = Some(key_bytes);

            let value = self.decode()?;
            pairs.push((key, value));
        }

        Ok(Value::Map(pairs))
    }

    fn decode_simple(&mut self, additional_info: u8) -> CodecResult<Value> {
        match additional_info {
            20 => Ok(Value::Bool(false)),
            21 => Ok(Value::Bool(true)),
            22 => Ok(Value::Null),
            25 | 26 => Err(CodecError::corrupt(
                "non-canonical: floats must be encoded as doubles",
            )),
            27 => {
                let bits = u64::from_be_bytes(self.read_array()?);
                let value = f64::from_bits(bits);
                if !value.is_finite() {
                    return Err(CodecError::corrupt("non-finite float"));
                }
                if value == 0.0 && bits != 0 {
                    return Err(CodecError::corrupt("non-canonical: negative zero"));
                }
                Ok(Value::Float(value))
            }
            24 => {
                let simple = self.read_byte()?;
                if simple < 32 {
                    return Err(CodecError::corrupt(
                        "non-canonical: simple value should use direct encoding",
                    ));
                }
                Err(CodecError::unsupported_type(format!("simple value {simple}")))
            }
            28..=30 => Err(CodecError::corrupt("reserved additional info")),
            31 => Err(CodecError::corrupt("break without indefinite-length item")),
            _ => Err(CodecError::unsupported_type(format!(
                "simple value {additional_info}"
            ))),
        }
    }
}
