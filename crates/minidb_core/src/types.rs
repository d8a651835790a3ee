//! Core type definitions for MiniDB.

use minidb_codec::Value;
use std::fmt;

/// Position of a mutation in the total order the engine assigns.
///
/// Strictly increasing across the log. When two writers race on one key,
/// the mutation with the higher sequence number wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SequenceNumber(pub u64);

impl SequenceNumber {
    /// Creates a new sequence number.
    #[must_use]
    pub const fn new(seq: u64) -> Self {
        Self(seq)
    }

    /// Returns the raw sequence value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the next sequence number.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seq:{}", self.0)
    }
}

/// A committed key/value pair together with the mutation that wrote it.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    /// The key.
    pub key: String,
    /// The value last set for the key.
    pub value: Value,
    /// Sequence number of the `set` that produced `value`.
    pub sequence: SequenceNumber,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_ordering() {
        let a = SequenceNumber::new(1);
        assert!(a < a.next());
        assert_eq!(a.next().as_u64(), 2);
        assert_eq!(a.to_string(), "seq:1");
        assert_eq!(SequenceNumber::default().as_u64(), 0);
    }
}
