//! Database facade and recovery.

use crate::compaction::{CompactionResult, Compactor};
use crate::config::Config;
use crate::dir::DatabaseDir;
use crate::error::{CoreError, CoreResult};
use crate::keyspace::{Keyspace, StoredValue};
use crate::log::{encode_header, scan_log_with_limit, LogRecord, LogWriter, ScanStop, LOG_HEADER_SIZE};
use crate::stats::{DatabaseStats, DatabaseStatsSnapshot};
use crate::types::{Entry, SequenceNumber};
use minidb_codec::{from_cbor, to_canonical_cbor, Value};
use minidb_storage::{FileBackend, InMemoryBackend, StorageBackend};
use parking_lot::{Mutex, RwLock};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, trace, warn};

const HEADER_BYTES: u64 = LOG_HEADER_SIZE as u64;

/// State owned by whoever holds the writer lock.
struct WriterState {
    log: LogWriter,
    /// Database directory (holds the lock). None for detached backends.
    dir: Option<DatabaseDir>,
    /// Log size, header included.
    log_bytes: u64,
    /// Bytes of the log holding live values.
    live_bytes: u64,
    /// Set when the writer no longer points at the log on disk. Every later
    /// write fails instead of going to a file nobody will read.
    broken: Option<String>,
}

impl WriterState {
    fn check_usable(&self) -> CoreResult<()> {
        match &self.broken {
            None => Ok(()),
            Some(reason) => Err(io::Error::new(
                io::ErrorKind::Other,
                format!("log writer unusable: {reason}; reopen the database"),
            )
            .into()),
        }
    }

    /// Whether compaction can run without risking the log.
    fn can_compact(&self) -> bool {
        self.dir.is_some() || !self.log.is_persistent()
    }
}

/// The main database handle.
///
/// `Database` owns one keyspace: string keys mapped to [`Value`]s. It provides:
/// - Point reads served from memory
/// - Durable, serialized upserts and deletes
/// - Snapshot enumeration of keys
/// - Recovery from crashes
///
/// # Opening a Database
///
/// ```rust
/// use minidb_core::{Config, Database, Value};
///
/// let dir = tempfile::tempdir().unwrap();
/// let db = Database::open(dir.path().join("chat.db"), Config::default()).unwrap();
///
/// db.set("greeting", Value::from("hello")).unwrap();
/// assert_eq!(db.get("greeting").unwrap(), Some(Value::from("hello")));
///
/// db.close().unwrap();
/// ```
///
/// # Concurrency
///
/// A `Database` is shared by reference (usually behind an `Arc`). Mutations
/// take the writer lock, append one record and update the index before
/// releasing it, so the order in which they take the lock is the order they
/// commit in. Reads never take the writer lock.
pub struct Database {
    config: Config,
    path: Option<PathBuf>,
    writer: Mutex<Option<WriterState>>,
    keyspace: Keyspace,
    stats: DatabaseStats,
    is_open: RwLock<bool>,
}

impl Database {
    /// Opens the database stored in the directory `path`.
    ///
    /// The method:
    /// - Creates the directory if it doesn't exist (unless `create_if_missing` is false)
    /// - Acquires an exclusive lock to prevent concurrent access
    /// - Removes output of an interrupted compaction
    /// - Replays the log into memory, cutting off a torn tail
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Another handle has the database locked (`DatabaseLocked`)
    /// - The log fails its integrity checks (`CorruptStore`)
    /// - A stored value cannot be decoded (`Codec`)
    /// - I/O errors occur
    pub fn open(path: impl AsRef<Path>, config: Config) -> CoreResult<Self> {
        let path = path.as_ref();
        let dir = DatabaseDir::open(path, config.create_if_missing)?;

        if !config.create_if_missing && !dir.has_log() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no database log in {}", path.display()),
            )
            .into());
        }

        if dir.remove_stale_compaction()? {
            warn!(path = %path.display(), "removed output of interrupted compaction");
        }

        let backend = FileBackend::open(&dir.log_path())?;
        let db = Self::recover(Box::new(backend), config, Some(dir))?;
        info!(
            path = %path.display(),
            keys = db.keyspace.len(),
            "opened database"
        );
        Ok(db)
    }

    /// Opens a database over an arbitrary storage backend.
    ///
    /// There is no directory, so there is no lock and compaction rewrites the
    /// backend in place instead of swapping files.
    pub fn open_with_backend(backend: Box<dyn StorageBackend>, config: Config) -> CoreResult<Self> {
        Self::recover(backend, config, None)
    }

    /// Opens a fresh in-memory database for testing.
    ///
    /// Data is lost when the database is dropped.
    pub fn open_in_memory() -> CoreResult<Self> {
        Self::open_with_backend(Box::new(InMemoryBackend::new()), Config::default())
    }

    /// Rebuilds the keyspace by replaying the log.
    fn recover(
        mut backend: Box<dyn StorageBackend>,
        config: Config,
        dir: Option<DatabaseDir>,
    ) -> CoreResult<Self> {
        if config.max_value_size != config.value_size_limit() {
            warn!(
                requested = config.max_value_size,
                limit = config.value_size_limit(),
                "max_value_size exceeds what the codec can replay, capping it"
            );
        }

        let bytes = backend.read_all()?;
        let scan = scan_log_with_limit(&bytes, config.max_record_len());
        scan.check()?;

        let stats = DatabaseStats::new();
        let mut repaired = false;

        if let ScanStop::TornTail { offset, reason } = &scan.stop {
            warn!(
                offset,
                torn_bytes = scan.torn_bytes(),
                reason = %reason,
                "truncating torn log tail"
            );
            backend.truncate(scan.valid_len)?;
            stats.record_recovered(scan.torn_bytes());
            repaired = true;
        }

        if scan.needs_header() {
            backend.append(&encode_header())?;
            repaired = true;
        }

        if repaired {
            backend.flush()?;
            backend.sync()?;
            stats.record_sync();
        }

        let keyspace = Keyspace::new();
        let mut live_bytes = 0u64;
        let mut next_sequence = SequenceNumber::new(1);
        let record_count = scan.records.len();

        for scanned in scan.records {
            let record = scanned.record;
            next_sequence = record.sequence.next();

            let previous = if record.is_tombstone() {
                keyspace.remove(&record.key)
            } else {
                let value = from_cbor(&record.payload).map_err(|e| {
                    warn!(offset = scanned.offset, key = %record.key, error = %e, "undecodable value in log");
                    e
                })?;
                live_bytes += scanned.len;
                keyspace.insert(
                    record.key,
                    StoredValue {
                        value,
                        sequence: record.sequence,
                        record_len: scanned.len,
                    },
                )
            };
            if let Some(previous) = previous {
                live_bytes -= previous.record_len;
            }
        }

        let log_bytes = backend.size()?;
        debug!(records = record_count, log_bytes, live_bytes, %next_sequence, "replayed log");

        let path = dir.as_ref().map(|d| d.path().to_path_buf());
        let log = LogWriter::new(backend, &config, next_sequence);

        Ok(Self {
            config,
            path,
            writer: Mutex::new(Some(WriterState {
                log,
                dir,
                log_bytes,
                live_bytes,
                broken: None,
            })),
            keyspace,
            stats,
            is_open: RwLock::new(true),
        })
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Returns the value stored under `key`.
    pub fn get(&self, key: &str) -> CoreResult<Option<Value>> {
        self.ensure_open()?;
        self.stats.record_read();
        Ok(self.keyspace.get(key).map(|stored| stored.value.clone()))
    }

    /// Returns the value stored under `key` with the sequence that wrote it.
    pub fn get_entry(&self, key: &str) -> CoreResult<Option<Entry>> {
        self.ensure_open()?;
        self.stats.record_read();
        Ok(self.keyspace.get(key).map(|stored| Entry {
            key: key.to_owned(),
            value: stored.value.clone(),
            sequence: stored.sequence,
        }))
    }

    /// Returns the document stored under `key` as JSON.
    ///
    /// # Errors
    ///
    /// Returns `TypeMismatch` if the stored value is a scalar, or a codec
    /// error if the document holds values JSON cannot represent.
    pub fn get_json(&self, key: &str) -> CoreResult<Option<serde_json::Value>> {
        let Some(value) = self.get(key)? else {
            return Ok(None);
        };
        if !value.is_document() {
            return Err(CoreError::TypeMismatch {
                expected: minidb_codec::ValueKind::Document,
                found: value.kind(),
            });
        }
        Ok(Some(value.to_json()?))
    }

    /// Returns whether `key` is present.
    pub fn contains(&self, key: &str) -> CoreResult<bool> {
        self.ensure_open()?;
        Ok(self.keyspace.contains(key))
    }

    /// Returns the keys present at the time of the call, sorted.
    ///
    /// The result is a snapshot: later mutations do not affect it.
    pub fn keys(&self) -> CoreResult<Vec<String>> {
        self.ensure_open()?;
        Ok(self.keyspace.keys())
    }

    /// Returns the number of live keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keyspace.len()
    }

    /// Returns whether the keyspace is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Sets `key` to `value`, replacing any previous value.
    ///
    /// Returns the sequence number assigned to the write. When two writers
    /// race on one key, the one with the higher sequence number is the one
    /// that remains.
    ///
    /// With `sync_on_write` the value is durable when this returns.
    ///
    /// # Errors
    ///
    /// - `Codec(Encode)` if the value cannot be encoded (e.g. a NaN float)
    /// - `ValueTooLarge` if the encoded value exceeds `max_value_size`
    /// - `KeyTooLong` if the key exceeds 65535 bytes
    ///
    /// A failed `set` leaves the previous value in place.
    pub fn set(&self, key: &str, value: Value) -> CoreResult<SequenceNumber> {
        self.ensure_open()?;

        let payload = to_canonical_cbor(&value).inspect_err(|_| self.stats.record_error())?;
        let max = self.config.value_size_limit();
        if payload.len() > max {
            self.stats.record_error();
            return Err(CoreError::ValueTooLarge {
                size: payload.len(),
                max,
            });
        }
        // Hold the form replay will produce, so reads agree across a reopen.
        let value = value.canonicalize();

        self.mutate(|db, state| {
            let appended = state
                .log
                .append(|sequence| LogRecord::put(sequence, key, payload))?;

            let previous = db.keyspace.insert(
                key.to_owned(),
                StoredValue {
                    value,
                    sequence: appended.sequence,
                    record_len: appended.len,
                },
            );
            state.log_bytes = appended.offset + appended.len;
            state.live_bytes += appended.len;
            if let Some(previous) = previous {
                state.live_bytes -= previous.record_len;
            }

            db.stats.record_write(appended.len);
            if appended.synced {
                db.stats.record_sync();
            }
            trace!(key, sequence = %appended.sequence, "set");
            Ok(appended.sequence)
        })
    }

    /// Sets `key` to a JSON document.
    ///
    /// # Errors
    ///
    /// Returns `TypeMismatch` if `document` is not an object or array, and
    /// otherwise the errors of [`Database::set`].
    pub fn set_json(&self, key: &str, document: &serde_json::Value) -> CoreResult<SequenceNumber> {
        if !(document.is_object() || document.is_array()) {
            return Err(CoreError::expected_document());
        }
        self.set(key, Value::from_json(document))
    }

    /// Deletes `key`.
    ///
    /// Returns `false`, writing nothing, if the key was absent.
    pub fn delete(&self, key: &str) -> CoreResult<bool> {
        self.ensure_open()?;

        self.mutate(|db, state| {
            if !db.keyspace.contains(key) {
                return Ok(false);
            }

            let appended = state
                .log
                .append(|sequence| LogRecord::tombstone(sequence, key))?;

            if let Some(previous) = db.keyspace.remove(key) {
                state.live_bytes -= previous.record_len;
            }
            state.log_bytes = appended.offset + appended.len;

            db.stats.record_delete(appended.len);
            if appended.synced {
                db.stats.record_sync();
            }
            trace!(key, sequence = %appended.sequence, "delete");
            Ok(true)
        })
    }

    /// Runs a mutation under the writer lock, then compacts if the log has
    /// crossed the configured thresholds.
    fn mutate<T>(&self, f: impl FnOnce(&Self, &mut WriterState) -> CoreResult<T>) -> CoreResult<T> {
        let mut guard = self.writer.lock();
        let state = guard.as_mut().ok_or(CoreError::HandleClosed)?;

        let result = state.check_usable().and_then(|()| f(self, &mut *state));
        if result.is_err() {
            self.stats.record_error();
            return result;
        }

        if state.can_compact()
            && self
                .config
                .should_compact(state.log_bytes, state.live_bytes + HEADER_BYTES)
        {
            if let Err(e) = self.compact_locked(state) {
                warn!(error = %e, "automatic compaction failed");
            }
        }
        result
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Makes every committed mutation durable.
    pub fn flush(&self) -> CoreResult<()> {
        self.ensure_open()?;
        let mut guard = self.writer.lock();
        let state = guard.as_mut().ok_or(CoreError::HandleClosed)?;
        state.check_usable()?;
        if state.log.sync()? {
            self.stats.record_sync();
        }
        Ok(())
    }

    /// Rewrites the log keeping only live values.
    ///
    /// Writers wait while compaction runs; readers do not.
    ///
    /// # Errors
    ///
    /// A database opened over a persistent backend without a directory
    /// cannot swap logs atomically, so compacting it fails with an
    /// `Unsupported` I/O error and leaves the log untouched.
    pub fn compact(&self) -> CoreResult<CompactionResult> {
        self.ensure_open()?;
        let mut guard = self.writer.lock();
        let state = guard.as_mut().ok_or(CoreError::HandleClosed)?;
        state.check_usable()?;
        self.compact_locked(state)
    }

    fn compact_locked(&self, state: &mut WriterState) -> CoreResult<CompactionResult> {
        if !state.can_compact() {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "compacting a persistent log needs a database directory",
            )
            .into());
        }
        if state.log.sync()? {
            self.stats.record_sync();
        }

        let bytes = state.log.read_all()?;
        let scan = scan_log_with_limit(&bytes, self.config.max_record_len());
        scan.check()?;
        if let ScanStop::TornTail { offset, reason } = scan.stop {
            return Err(CoreError::corrupt_store(offset, reason));
        }

        let records = scan.records.into_iter().map(|s| s.record).collect();
        let (log, result) = Compactor::compact_log(records, bytes.len() as u64)?;

        match &state.dir {
            Some(dir) => {
                if let Err(e) = write_compacted(dir, &log).and_then(|()| dir.swap_in_compacted()) {
                    let _ = fs::remove_file(dir.compact_path());
                    return Err(e);
                }
                // The old log is gone from the directory from here on.
                let reopened = dir
                    .sync()
                    .and_then(|()| FileBackend::open(&dir.log_path()).map_err(CoreError::from));
                self.adopt_compacted(state, reopened)?;
            }
            None => state.log.rewrite(&log)?,
        }

        state.log_bytes = result.bytes_after;
        state.live_bytes = result.bytes_after - HEADER_BYTES;
        self.stats.record_compaction();
        self.stats.record_sync();

        info!(
            input_records = result.input_records,
            output_records = result.output_records,
            bytes_before = result.bytes_before,
            bytes_after = result.bytes_after,
            "compacted log"
        );
        Ok(result)
    }

    /// Points the writer at the log compaction just installed.
    ///
    /// If that log cannot be opened, the writer still holds the replaced
    /// file, so it is marked broken rather than left appending to it.
    fn adopt_compacted(&self, state: &mut WriterState, reopened: CoreResult<FileBackend>) -> CoreResult<()> {
        match reopened {
            Ok(backend) => {
                state.log.replace_backend(Box::new(backend));
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "lost the log after compaction, refusing further writes");
                state.broken = Some(format!("compacted log could not be reopened: {e}"));
                self.stats.record_error();
                Err(e)
            }
        }
    }

    /// Closes the database.
    ///
    /// Syncs the log and releases the file and the directory lock. Closing
    /// twice is a no-op. Every other operation fails with `HandleClosed`
    /// afterwards.
    pub fn close(&self) -> CoreResult<()> {
        let mut is_open = self.is_open.write();
        if !*is_open {
            return Ok(());
        }

        let mut guard = self.writer.lock();
        if let Some(state) = guard.as_mut() {
            if state.log.sync()? {
                self.stats.record_sync();
            }
        }
        guard.take();

        *is_open = false;
        if let Some(path) = &self.path {
            info!(path = %path.display(), "closed database");
        }
        Ok(())
    }

    /// Checks if the database is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        *self.is_open.read()
    }

    /// Ensures the database is open.
    fn ensure_open(&self) -> CoreResult<()> {
        if *self.is_open.read() {
            Ok(())
        } else {
            Err(CoreError::HandleClosed)
        }
    }

    /// Returns the database directory, or `None` for detached backends.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Returns database configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns counters and log gauges.
    #[must_use]
    pub fn stats(&self) -> DatabaseStatsSnapshot {
        let mut snapshot = self.stats.snapshot();
        snapshot.live_keys = self.keyspace.len() as u64;
        if let Some(state) = self.writer.lock().as_ref() {
            snapshot.log_bytes = state.log_bytes;
            snapshot.live_bytes = state.live_bytes;
            snapshot.dead_bytes = state
                .log_bytes
                .saturating_sub(state.live_bytes + HEADER_BYTES);
        }
        snapshot
    }
}

fn write_compacted(dir: &DatabaseDir, log: &[u8]) -> CoreResult<()> {
    let mut out = FileBackend::create_new(&dir.compact_path())?;
    out.append(log)?;
    out.flush()?;
    out.sync()?;
    Ok(())
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.path)
            .field("is_open", &self.is_open())
            .field("keys", &self.len())
            .finish_non_exhaustive()
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use minidb_storage::FaultyBackend;
    use std::sync::Arc;

    fn create_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn reopen(memory: &InMemoryBackend, config: Config) -> Database {
        Database::open_with_backend(Box::new(memory.shared()), config).unwrap()
    }

    #[test]
    fn open_in_memory() {
        let db = create_db();
        assert!(db.is_open());
        assert!(db.is_empty());
        assert!(db.path().is_none());
    }

    #[test]
    fn fresh_log_gets_header() {
        let memory = InMemoryBackend::new();
        let _db = reopen(&memory, Config::default());
        assert_eq!(memory.data(), encode_header().to_vec());
    }

    #[test]
    fn simple_set_get() {
        let db = create_db();
        db.set("k", Value::from(42)).unwrap();
        assert_eq!(db.get("k").unwrap(), Some(Value::Integer(42)));
        assert_eq!(db.get("missing").unwrap(), None);
        assert!(db.contains("k").unwrap());
    }

    #[test]
    fn set_overwrites() {
        let db = create_db();
        let first = db.set("k", Value::from("a")).unwrap();
        let second = db.set("k", Value::from("b")).unwrap();

        assert!(second > first);
        let entry = db.get_entry("k").unwrap().unwrap();
        assert_eq!(entry.value, Value::from("b"));
        assert_eq!(entry.sequence, second);
        assert_eq!(db.len(), 1);
    }

    #[test]
    fn delete_semantics() {
        let db = create_db();
        db.set("k", Value::Null).unwrap();

        assert!(db.delete("k").unwrap());
        assert_eq!(db.get("k").unwrap(), None);
        assert!(!db.delete("k").unwrap());
        assert!(!db.delete("never").unwrap());
        assert_eq!(db.stats().deletes, 1);
    }

    #[test]
    fn absent_delete_writes_nothing() {
        let memory = InMemoryBackend::new();
        let db = reopen(&memory, Config::default());
        let before = memory.data();
        assert!(!db.delete("nothing").unwrap());
        assert_eq!(memory.data(), before);
    }

    #[test]
    fn json_documents() {
        let db = create_db();
        let doc = serde_json::json!({"user": "ana", "text": "hi", "tags": [1, 2]});
        db.set_json("msg:1", &doc).unwrap();
        assert_eq!(db.get_json("msg:1").unwrap(), Some(doc));

        let err = db.set_json("n", &serde_json::json!(5)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);

        db.set("scalar", Value::from("plain")).unwrap();
        let err = db.get_json("scalar").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
        assert_eq!(db.get_json("absent").unwrap(), None);
    }

    #[test]
    fn get_json_rejects_bytes() {
        let db = create_db();
        db.set("blob", Value::Array(vec![Value::Bytes(vec![1, 2])])).unwrap();
        let err = db.get_json("blob").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedType);
    }

    #[test]
    fn value_too_large_keeps_prior_value() {
        let config = Config::new().max_value_size(16);
        let db = Database::open_with_backend(Box::new(InMemoryBackend::new()), config).unwrap();

        db.set("k", Value::from("small")).unwrap();
        let err = db.set("k", Value::from("x".repeat(64))).unwrap_err();

        assert!(matches!(err, CoreError::ValueTooLarge { max: 16, .. }));
        assert_eq!(db.get("k").unwrap(), Some(Value::from("small")));
        assert_eq!(db.stats().errors, 1);
    }

    #[test]
    fn unencodable_value_rejected() {
        let db = create_db();
        let err = db.set("f", Value::Float(f64::NAN)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EncodeError);
        assert_eq!(db.get("f").unwrap(), None);

        let err = db.set(&"k".repeat(70_000), Value::Null).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EncodeError);
    }

    #[test]
    fn replay_restores_state() {
        let memory = InMemoryBackend::new();
        {
            let db = reopen(&memory, Config::default());
            db.set("a", Value::from(1)).unwrap();
            db.set("b", Value::from(2)).unwrap();
            db.set("a", Value::from(3)).unwrap();
            db.delete("b").unwrap();
        }

        let db = reopen(&memory, Config::default());
        assert_eq!(db.keys().unwrap(), vec!["a"]);
        assert_eq!(db.get("a").unwrap(), Some(Value::from(3)));

        let next = db.set("c", Value::Null).unwrap();
        assert_eq!(next, SequenceNumber::new(5));
    }

    #[test]
    fn crash_without_close_keeps_synced_writes() {
        let memory = InMemoryBackend::new();
        let db = reopen(&memory, Config::default());
        db.set("k", Value::from("v")).unwrap();
        std::mem::forget(db);

        let db = reopen(&memory, Config::default());
        assert_eq!(db.get("k").unwrap(), Some(Value::from("v")));
    }

    #[test]
    fn torn_tail_truncated_on_open() {
        let memory = InMemoryBackend::new();
        {
            let db = reopen(&memory, Config::default());
            db.set("a", Value::from(1)).unwrap();
        }
        let clean_len = memory.data().len();

        let torn = LogRecord::put(SequenceNumber::new(2), "b", vec![0x02]).encode().unwrap();
        memory.shared().append(&torn[..torn.len() - 2]).unwrap();

        let db = reopen(&memory, Config::default());
        assert_eq!(db.keys().unwrap(), vec!["a"]);
        assert_eq!(memory.data().len(), clean_len);
        assert_eq!(db.stats().recovered_bytes, (torn.len() - 2) as u64);
    }

    #[test]
    fn mid_log_corruption_fails_open() {
        let memory = InMemoryBackend::new();
        {
            let db = reopen(&memory, Config::default());
            db.set("a", Value::from(1)).unwrap();
            db.set("b", Value::from(2)).unwrap();
        }
        memory.corrupt_byte(LOG_HEADER_SIZE + 16);

        let err = Database::open_with_backend(Box::new(memory.shared()), Config::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CorruptStore);
    }

    #[test]
    fn undecodable_payload_fails_open() {
        let memory = InMemoryBackend::new();
        let mut log = encode_header().to_vec();
        log.extend(LogRecord::put(SequenceNumber::new(1), "k", vec![0xc0, 0x00]).encode().unwrap());
        memory.shared().append(&log).unwrap();

        let err = Database::open_with_backend(Box::new(memory.shared()), Config::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedType);
    }

    #[test]
    fn failed_append_leaves_prior_value() {
        let memory = InMemoryBackend::new();
        let faulty = FaultyBackend::new(Box::new(memory.shared()));
        let faults = faulty.handle();
        let db = Database::open_with_backend(Box::new(faulty), Config::default()).unwrap();

        db.set("k", Value::from("before")).unwrap();
        faults.crash_after(4);
        assert_eq!(db.set("k", Value::from("after")).unwrap_err().kind(), ErrorKind::Io);
        assert_eq!(db.get("k").unwrap(), Some(Value::from("before")));

        faults.reset();
        faults.fail_syncs(true);
        assert!(db.delete("k").is_err());
        assert!(db.contains("k").unwrap());
        faults.reset();
        drop(db);

        let db = reopen(&memory, Config::default());
        assert_eq!(db.get("k").unwrap(), Some(Value::from("before")));
    }

    #[test]
    fn batched_sync_policy() {
        let config = Config::new().sync_on_write(false).sync_batch_size(4);
        let db = Database::open_with_backend(Box::new(InMemoryBackend::new()), config).unwrap();
        for i in 0..3 {
            db.set(&format!("k{i}"), Value::from(i)).unwrap();
        }
        assert_eq!(db.stats().syncs, 1); // header
        db.set("k3", Value::Null).unwrap();
        assert_eq!(db.stats().syncs, 2);

        db.set("k4", Value::Null).unwrap();
        db.flush().unwrap();
        assert_eq!(db.stats().syncs, 3);
        db.flush().unwrap();
        assert_eq!(db.stats().syncs, 3);
    }

    #[test]
    fn manual_compaction() {
        let memory = InMemoryBackend::new();
        let db = reopen(&memory, Config::default());
        for i in 0..10 {
            db.set("hot", Value::from(i)).unwrap();
        }
        db.set("gone", Value::from("x")).unwrap();
        db.delete("gone").unwrap();
        let before = db.stats();

        let result = db.compact().unwrap();
        assert_eq!(result.input_records, 12);
        assert_eq!(result.output_records, 1);
        assert_eq!(result.obsolete_versions_removed, 10);
        assert_eq!(result.tombstones_removed, 1);
        assert_eq!(result.bytes_before, before.log_bytes);
        assert_eq!(result.bytes_after, memory.data().len() as u64);

        let after = db.stats();
        assert_eq!(after.dead_bytes, 0);
        assert_eq!(after.compactions, 1);
        assert_eq!(db.get("hot").unwrap(), Some(Value::from(9)));

        let next = db.set("new", Value::Null).unwrap();
        assert_eq!(next, SequenceNumber::new(13));
        drop(db);

        let db = reopen(&memory, Config::default());
        assert_eq!(db.keys().unwrap(), vec!["hot", "new"]);
    }

    #[test]
    fn automatic_compaction() {
        let config = Config::new()
            .compaction_min_bytes(256)
            .compaction_garbage_ratio_percent(50);
        let db = Database::open_with_backend(Box::new(InMemoryBackend::new()), config).unwrap();

        for i in 0..100 {
            db.set("counter", Value::from(i)).unwrap();
        }
        let stats = db.stats();
        assert!(stats.compactions > 0);
        assert!(stats.log_bytes < 512);
        assert_eq!(db.get("counter").unwrap(), Some(Value::from(99)));
    }

    #[test]
    fn persistent_backend_without_directory_is_never_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("detached.mdb");
        let config = Config::new()
            .compaction_min_bytes(256)
            .compaction_garbage_ratio_percent(50);

        {
            let backend = FileBackend::open(&path).unwrap();
            let db = Database::open_with_backend(Box::new(backend), config.clone()).unwrap();
            for i in 0..100 {
                db.set("counter", Value::from(i)).unwrap();
            }
            assert_eq!(db.stats().compactions, 0);

            let before = std::fs::read(&path).unwrap();
            let err = db.compact().unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Io);
            assert_eq!(std::fs::read(&path).unwrap(), before);

            // Still writable after the refusal.
            db.set("after", Value::Null).unwrap();
        }

        let backend = FileBackend::open(&path).unwrap();
        let db = Database::open_with_backend(Box::new(backend), config).unwrap();
        assert_eq!(db.get("counter").unwrap(), Some(Value::from(99)));
        assert!(db.contains("after").unwrap());
    }

    #[test]
    fn lost_log_after_compaction_stops_writes() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path(), Config::default()).unwrap();
        db.set("kept", Value::from(1)).unwrap();

        {
            let mut guard = db.writer.lock();
            let state = guard.as_mut().unwrap();
            let lost = io::Error::new(io::ErrorKind::NotFound, "log vanished");
            assert!(db.adopt_compacted(state, Err(lost.into())).is_err());
        }

        for err in [
            db.set("k", Value::Null).unwrap_err(),
            db.delete("kept").unwrap_err(),
            db.flush().unwrap_err(),
            db.compact().unwrap_err(),
        ] {
            assert_eq!(err.kind(), ErrorKind::Io);
        }
        assert_eq!(db.get("kept").unwrap(), Some(Value::from(1)));
        assert!(!db.contains("k").unwrap());

        db.close().unwrap();
        let db = Database::open(dir.path(), Config::default()).unwrap();
        assert_eq!(db.keys().unwrap(), vec!["kept"]);
    }

    #[test]
    fn stored_maps_match_their_replayed_form() {
        let memory = InMemoryBackend::new();
        let unsorted = Value::Map(vec![
            (Value::from("b"), Value::Integer(1)),
            (Value::from("a"), Value::Integer(2)),
        ]);

        let db = reopen(&memory, Config::default());
        db.set("doc", unsorted.clone()).unwrap();
        let before = db.get("doc").unwrap().unwrap();
        drop(db);

        let db = reopen(&memory, Config::default());
        let after = db.get("doc").unwrap().unwrap();
        assert_eq!(before, after);
        assert_eq!(after, unsorted);
        assert_eq!(format!("{before:?}"), format!("{after:?}"));
    }

    #[test]
    fn close_is_idempotent() {
        let db = create_db();
        db.set("k", Value::Null).unwrap();
        db.close().unwrap();
        db.close().unwrap();
        assert!(!db.is_open());

        for err in [
            db.get("k").unwrap_err(),
            db.set("k", Value::Null).unwrap_err(),
            db.delete("k").unwrap_err(),
            db.keys().unwrap_err(),
            db.flush().unwrap_err(),
            db.compact().unwrap_err(),
        ] {
            assert_eq!(err.kind(), ErrorKind::HandleClosed);
        }
    }

    #[test]
    fn concurrent_writers_get_distinct_sequences() {
        let db = Arc::new(create_db());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let db = Arc::clone(&db);
                std::thread::spawn(move || {
                    (0..50)
                        .map(|i| db.set(&format!("t{t}-{i}"), Value::from(i)).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut sequences: Vec<SequenceNumber> =
            handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
        sequences.sort();
        sequences.dedup();
        assert_eq!(sequences.len(), 400);
        assert_eq!(db.len(), 400);
    }
}
