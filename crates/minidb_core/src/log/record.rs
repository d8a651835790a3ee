//! Log record types and serialization.
//!
//! Record layout (all integers little-endian):
//!
//! ```text
//! | record_len u32 | flags u8 | sequence u64 | key_len u16 | key | payload | crc32 u32 |
//! ```
//!
//! `record_len` counts the whole record, itself and the checksum included.
//! The checksum covers every byte before it.

use crate::error::{CoreError, CoreResult};
use crate::types::SequenceNumber;

/// Bytes before the key: record_len (4) + flags (1) + sequence (8) + key_len (2).
pub const RECORD_HEADER_SIZE: usize = 15;

/// CRC size.
pub const CRC_SIZE: usize = 4;

/// Smallest possible record: empty key, empty payload.
pub const MIN_RECORD_SIZE: usize = RECORD_HEADER_SIZE + CRC_SIZE;

/// Longest key a record can carry.
pub const MAX_KEY_LEN: usize = u16::MAX as usize;

/// Per-record flag bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecordFlags(u8);

impl RecordFlags {
    /// The record deletes its key. Its payload is empty.
    pub const TOMBSTONE: Self = Self(0x01);

    /// No flags set: the record carries a value.
    pub const NONE: Self = Self(0);

    const KNOWN: u8 = 0x01;

    /// Parses a flags byte, rejecting unknown bits.
    #[must_use]
    pub const fn from_bits(bits: u8) -> Option<Self> {
        if bits & !Self::KNOWN == 0 {
            Some(Self(bits))
        } else {
            None
        }
    }

    /// Returns the raw flags byte.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Returns whether this is a tombstone.
    #[must_use]
    pub const fn is_tombstone(self) -> bool {
        self.0 & Self::TOMBSTONE.0 != 0
    }
}

/// One mutation in the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Record flags.
    pub flags: RecordFlags,
    /// Position of this mutation in the total order.
    pub sequence: SequenceNumber,
    /// The key written or deleted.
    pub key: String,
    /// Canonical CBOR of the value; empty for tombstones.
    pub payload: Vec<u8>,
}

/// Why bytes at some offset do not form a valid record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordDefect {
    /// The record runs past the end of the available bytes.
    Incomplete {
        /// Bytes the record claims or needs.
        needed: usize,
        /// Bytes actually available.
        available: usize,
    },
    /// The framing is intact but the checksum does not match.
    Checksum {
        /// Length the record claims.
        record_len: usize,
        /// Checksum stored in the record.
        stored: u32,
        /// Checksum computed over the record.
        computed: u32,
    },
    /// The checksum matches but the content is impossible.
    Malformed(String),
}

impl std::fmt::Display for RecordDefect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Incomplete { needed, available } => {
                write!(f, "incomplete record: needs {needed} bytes, {available} available")
            }
            Self::Checksum {
                stored, computed, ..
            } => write!(
                f,
                "checksum mismatch: expected {computed:#010x}, stored {stored:#010x}"
            ),
            Self::Malformed(message) => write!(f, "malformed record: {message}"),
        }
    }
}

impl LogRecord {
    /// Creates a record that sets `key` to the encoded value in `payload`.
    pub fn put(sequence: SequenceNumber, key: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            flags: RecordFlags::NONE,
            sequence,
            key: key.into(),
            payload,
        }
    }

    /// Creates a tombstone for `key`.
    pub fn tombstone(sequence: SequenceNumber, key: impl Into<String>) -> Self {
        Self {
            flags: RecordFlags::TOMBSTONE,
            sequence,
            key: key.into(),
            payload: Vec::new(),
        }
    }

    /// Returns whether this record deletes its key.
    #[must_use]
    pub fn is_tombstone(&self) -> bool {
        self.flags.is_tombstone()
    }

    /// Returns the encoded size of this record.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        MIN_RECORD_SIZE + self.key.len() + self.payload.len()
    }

    /// Serializes the record with its framing and checksum.
    ///
    /// # Errors
    ///
    /// Returns `KeyTooLong` if the key exceeds [`MAX_KEY_LEN`] bytes, or
    /// `ValueTooLarge` if the record would not fit its 4-byte length field.
    pub fn encode(&self) -> CoreResult<Vec<u8>> {
        let key_len = u16::try_from(self.key.len()).map_err(|_| CoreError::KeyTooLong {
            len: self.key.len(),
            max: MAX_KEY_LEN,
        })?;
        let total = self.encoded_len();
        let record_len = u32::try_from(total).map_err(|_| CoreError::ValueTooLarge {
            size: self.payload.len(),
            max: u32::MAX as usize - MIN_RECORD_SIZE - self.key.len(),
        })?;

        let mut buf = Vec::with_capacity(total);
        buf.extend_from_slice(&record_len.to_le_bytes());
        buf.push(self.flags.bits());
        buf.extend_from_slice(&self.sequence.as_u64().to_le_bytes());
        buf.extend_from_slice(&key_len.to_le_bytes());
        buf.extend_from_slice(self.key.as_bytes());
        buf.extend_from_slice(&self.payload);

        let crc = crc32fast::hash(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());
        Ok(buf)
    }

    /// Decodes the record at the start of `data`.
    ///
    /// Returns the record and the number of bytes it occupies. Bytes after
    /// the record are ignored.
    pub fn decode(data: &[u8]) -> Result<(Self, usize), RecordDefect> {
        if data.len() < 4 {
            return Err(RecordDefect::Incomplete {
                needed: 4,
                available: data.len(),
            });
        }

        let record_len = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
        if record_len < MIN_RECORD_SIZE {
            return Err(RecordDefect::Malformed(format!(
                "record length {record_len} below minimum {MIN_RECORD_SIZE}"
            )));
        }
        if record_len > data.len() {
            return Err(RecordDefect::Incomplete {
                needed: record_len,
                available: data.len(),
            });
        }

        let body = &data[..record_len - CRC_SIZE];
        let crc_bytes = &data[record_len - CRC_SIZE..record_len];
        let stored = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
        let computed = crc32fast::hash(body);
        if stored != computed {
            return Err(RecordDefect::Checksum {
                record_len,
                stored,
                computed,
            });
        }

        let flags = RecordFlags::from_bits(body[4]).ok_or_else(|| {
            RecordDefect::Malformed(format!("unknown flag bits {:#04x}", body[4]))
        })?;

        let mut seq_bytes = [0u8; 8];
        seq_bytes.copy_from_slice(&body[5..13]);
        let sequence = SequenceNumber::new(u64::from_le_bytes(seq_bytes));

        let key_len = u16::from_le_bytes([body[13], body[14]]) as usize;
        let key_end = RECORD_HEADER_SIZE + key_len;
        if key_end > body.len() {
            return Err(RecordDefect::Malformed(format!(
                "key length {key_len} exceeds record"
            )));
        }

        let key = std::str::from_utf8(&body[RECORD_HEADER_SIZE..key_end])
            .map_err(|_| RecordDefect::Malformed("key is not valid UTF-8".into()))?
            .to_owned();
        let payload = body[key_end..].to_vec();

        if flags.is_tombstone() && !payload.is_empty() {
            return Err(RecordDefect::Malformed(
                "tombstone carries a payload".into(),
            ));
        }

        Ok((
            Self {
                flags,
                sequence,
                key,
                payload,
            },
            record_len,
        ))
    }
}
