//! The fixed header at the start of every log.

/// Magic bytes identifying a MiniDB log.
pub const LOG_MAGIC: [u8; 8] = *b"MINIDBLG";

/// Current log format version.
pub const FORMAT_VERSION: u16 = 1;

/// Size of the encoded header.
/// magic (8) + version (2) + reserved (2) + crc (4) = 16 bytes
pub const LOG_HEADER_SIZE: usize = 16;

/// Outcome of checking the start of a log against the header format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderCheck {
    /// A complete, valid header is present.
    Valid,
    /// The log is shorter than a header and holds a prefix of a valid one.
    ///
    /// An empty log falls in this case too.
    Torn,
    /// The header is present but wrong.
    Invalid(String),
}

/// Encodes the header for a fresh log.
#[must_use]
pub fn encode_header() -> [u8; LOG_HEADER_SIZE] {
    let mut buf = [0u8; LOG_HEADER_SIZE];
    buf[0..8].copy_from_slice(&LOG_MAGIC);
    buf[8..10].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
    // bytes 10..12 are reserved and stay zero
    let crc = crc32fast::hash(&buf[0..12]);
    buf[12..16].copy_from_slice(&crc.to_le_bytes());
    buf
}

/// Checks the header at the start of `log`.
#[must_use]
pub fn check_header(log: &[u8]) -> HeaderCheck {
    let expected = encode_header();

    if log.len() < LOG_HEADER_SIZE {
        return if expected.starts_with(log) {
            HeaderCheck::Torn
        } else {
            HeaderCheck::Invalid("truncated header does not match log format".into())
        };
    }

    if log[0..8] != LOG_MAGIC {
        return HeaderCheck::Invalid("bad magic, not a MiniDB log".into());
    }

    let stored_crc = u32::from_le_bytes([log[12], log[13], log[14], log[15]]);
    let computed_crc = crc32fast::hash(&log[0..12]);
    if stored_crc != computed_crc {
        return HeaderCheck::Invalid(format!(
            "header checksum mismatch: expected {computed_crc:#010x}, stored {stored_crc:#010x}"
        ));
    }

    let version = u16::from_le_bytes([log[8], log[9]]);
    if version != FORMAT_VERSION {
        return HeaderCheck::Invalid(format!("unsupported format version {version}"));
    }

    HeaderCheck::Valid
}
