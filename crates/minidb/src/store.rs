//! Async handle over the storage engine.

use crate::error::AppResult;
use minidb_core::{
    CompactionResult, Config, CoreResult, Database, DatabaseStatsSnapshot, Entry, SequenceNumber, Value,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task;

/// A cloneable async handle to one [`Database`].
///
/// Reads are served from memory and complete without suspending. Every
/// operation that touches the log runs on the blocking thread pool, so a
/// waiting `fsync` suspends the calling task instead of stalling the
/// runtime.
#[derive(Debug, Clone)]
pub struct Store {
    db: Arc<Database>,
}

impl Store {
    /// Opens the database stored in `path`.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`Database::open`].
    pub async fn open(path: impl AsRef<Path>, config: Config) -> AppResult<Self> {
        let path: PathBuf = path.as_ref().to_path_buf();
        let db = task::spawn_blocking(move || Database::open(path, config)).await??;
        Ok(Self::from_database(db))
    }

    /// Opens a database that lives only in memory.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`Database::open_in_memory`].
    pub fn open_in_memory() -> AppResult<Self> {
        Ok(Self::from_database(Database::open_in_memory()?))
    }

    /// Wraps an already opened database.
    #[must_use]
    pub fn from_database(db: Database) -> Self {
        Self { db: Arc::new(db) }
    }

    /// Returns the underlying database.
    #[must_use]
    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    async fn blocking<T, F>(&self, op: F) -> AppResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> CoreResult<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        Ok(task::spawn_blocking(move || op(&db)).await??)
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Returns the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns `HandleClosed` if the store was closed.
    pub async fn get(&self, key: &str) -> AppResult<Option<Value>> {
        Ok(self.db.get(key)?)
    }

    /// Returns the value stored under `key` with its sequence number.
    ///
    /// # Errors
    ///
    /// Returns `HandleClosed` if the store was closed.
    pub async fn get_entry(&self, key: &str) -> AppResult<Option<Entry>> {
        Ok(self.db.get_entry(key)?)
    }

    /// Returns the document stored under `key` as JSON.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`Database::get_json`].
    pub async fn get_json(&self, key: &str) -> AppResult<Option<serde_json::Value>> {
        Ok(self.db.get_json(key)?)
    }

    /// Returns whether `key` is present.
    ///
    /// # Errors
    ///
    /// Returns `HandleClosed` if the store was closed.
    pub async fn contains(&self, key: &str) -> AppResult<bool> {
        Ok(self.db.contains(key)?)
    }

    /// Returns a sorted snapshot of the keys.
    ///
    /// # Errors
    ///
    /// Returns `HandleClosed` if the store was closed.
    pub async fn keys(&self) -> AppResult<Vec<String>> {
        Ok(self.db.keys()?)
    }

    /// Returns the number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.db.len()
    }

    /// Returns whether the store holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.db.is_empty()
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Sets `key` to `value`.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`Database::set`].
    pub async fn set(&self, key: &str, value: Value) -> AppResult<SequenceNumber> {
        let key = key.to_owned();
        self.blocking(move |db| db.set(&key, value)).await
    }

    /// Sets `key` to a JSON document.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`Database::set_json`].
    pub async fn set_json(&self, key: &str, document: serde_json::Value) -> AppResult<SequenceNumber> {
        let key = key.to_owned();
        self.blocking(move |db| db.set_json(&key, &document)).await
    }

    /// Deletes `key`, returning whether it was present.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`Database::delete`].
    pub async fn delete(&self, key: &str) -> AppResult<bool> {
        let key = key.to_owned();
        self.blocking(move |db| db.delete(&key)).await
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Syncs pending writes to disk.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`Database::flush`].
    pub async fn flush(&self) -> AppResult<()> {
        self.blocking(Database::flush).await
    }

    /// Compacts the log.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`Database::compact`].
    pub async fn compact(&self) -> AppResult<CompactionResult> {
        self.blocking(Database::compact).await
    }

    /// Closes the store. Clones of this handle see it closed too.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`Database::close`].
    pub async fn close(&self) -> AppResult<()> {
        self.blocking(Database::close).await
    }

    /// Returns whether the store is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.db.is_open()
    }

    /// Returns database statistics.
    #[must_use]
    pub fn stats(&self) -> DatabaseStatsSnapshot {
        self.db.stats()
    }
}
