//! In-memory index of live keys.

use crate::types::SequenceNumber;
use minidb_codec::Value;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// A live value and the record that holds it.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StoredValue {
    pub value: Value,
    pub sequence: SequenceNumber,
    /// Encoded size of the record in the log.
    pub record_len: u64,
}

/// Maps every live key to its current value.
///
/// Values are held behind `Arc` so readers only hold the lock long enough
/// to clone a pointer. Mutations happen inside the database's writer lock,
/// after the record reaches the log, so readers never see a value that is
/// not in the log.
#[derive(Debug, Default)]
pub(crate) struct Keyspace {
    entries: RwLock<HashMap<String, Arc<StoredValue>>>,
}

impl Keyspace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Arc<StoredValue>> {
        self.entries.read().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Inserts or replaces `key`, returning the previous value.
    pub fn insert(&self, key: String, stored: StoredValue) -> Option<Arc<StoredValue>> {
        self.entries.write().insert(key, Arc::new(stored))
    }

    pub fn remove(&self, key: &str) -> Option<Arc<StoredValue>> {
        self.entries.write().remove(key)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns the keys present right now, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.read().keys().cloned().collect();
        keys.sort_unstable();
        keys
    }
}
