//! Database statistics.
//!
//! # Usage
//!
//! ```rust
//! use minidb_core::{Database, Value};
//!
//! let db = Database::open_in_memory().unwrap();
//! db.set("greeting", Value::from("hello")).unwrap();
//! db.get("greeting").unwrap();
//!
//! let stats = db.stats();
//! assert_eq!(stats.writes, 1);
//! assert_eq!(stats.reads, 1);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

/// Operation counters for one database handle.
///
/// All counters are atomic and can be read while operations are in progress.
#[derive(Debug, Default)]
pub struct DatabaseStats {
    reads: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
    bytes_written: AtomicU64,
    syncs: AtomicU64,
    compactions: AtomicU64,
    /// Bytes cut off torn tails during recovery.
    recovered_bytes: AtomicU64,
    errors: AtomicU64,
}

impl DatabaseStats {
    /// Creates a new stats instance.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_read(&self) {
        self.reads.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_write(&self, bytes: u64) {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_delete(&self, bytes: u64) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_sync(&self) {
        self.syncs.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_compaction(&self) {
        self.compactions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_recovered(&self, bytes: u64) {
        self.recovered_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a snapshot of the counters.
    ///
    /// Gauges describing the log are filled in by [`crate::Database::stats`].
    #[must_use]
    pub fn snapshot(&self) -> DatabaseStatsSnapshot {
        DatabaseStatsSnapshot {
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            syncs: self.syncs.load(Ordering::Relaxed),
            compactions: self.compactions.load(Ordering::Relaxed),
            recovered_bytes: self.recovered_bytes.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            ..DatabaseStatsSnapshot::default()
        }
    }
}

/// A point-in-time snapshot of database statistics.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DatabaseStatsSnapshot {
    /// Total number of `get` calls.
    pub reads: u64,
    /// Total number of committed `set` calls.
    pub writes: u64,
    /// Total number of `delete` calls that removed a key.
    pub deletes: u64,
    /// Total record bytes appended to the log.
    pub bytes_written: u64,
    /// Total number of log syncs.
    pub syncs: u64,
    /// Total number of compactions.
    pub compactions: u64,
    /// Bytes discarded from torn tails when the log was opened.
    pub recovered_bytes: u64,
    /// Total number of failed operations.
    pub errors: u64,
    /// Number of live keys.
    pub live_keys: u64,
    /// Current log size, header included.
    pub log_bytes: u64,
    /// Bytes of the log holding live values.
    pub live_bytes: u64,
    /// Bytes of the log compaction would reclaim.
    pub dead_bytes: u64,
}
