//! Database directory management.
//!
//! This module handles the file system layout for MiniDB:
//!
//! ```text
//! <db_path>/
//! ├─ LOCK              # Advisory lock for single-writer
//! ├─ data.mdb          # Append-only record log
//! └─ data.mdb.compact  # Compaction output, only present mid-compaction
//! ```
//!
//! The LOCK file ensures only one handle can own the database at a time.

use crate::error::{CoreError, CoreResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// File names within the database directory.
const LOCK_FILE: &str = "LOCK";
/// Name of the record log inside a database directory.
pub const LOG_FILE: &str = "data.mdb";
const COMPACT_FILE: &str = "data.mdb.compact";

/// Manages the database directory structure and file locking.
///
/// # Thread Safety
///
/// The `DatabaseDir` holds an exclusive lock on the database directory.
/// Only one `DatabaseDir` instance can exist per directory at a time; the
/// lock is released when it is dropped.
#[derive(Debug)]
pub struct DatabaseDir {
    /// Root directory path.
    path: PathBuf,
    /// Lock file handle (held for exclusive access).
    _lock_file: File,
}

impl DatabaseDir {
    /// Opens or creates a database directory.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory doesn't exist and `create_if_missing` is false
    /// - The path exists but is not a directory
    /// - Another handle holds the lock (returns `DatabaseLocked`)
    /// - I/O errors occur
    pub fn open(path: &Path, create_if_missing: bool) -> CoreResult<Self> {
        if !path.exists() {
            if create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("database directory does not exist: {}", path.display()),
                )
                .into());
            }
        }

        if !path.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("path is not a directory: {}", path.display()),
            )
            .into());
        }

        let lock_path = path.join(LOCK_FILE);
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(CoreError::DatabaseLocked);
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Returns the path to the database directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the path to the record log.
    #[must_use]
    pub fn log_path(&self) -> PathBuf {
        self.path.join(LOG_FILE)
    }

    /// Returns the path compaction writes to before the rename.
    #[must_use]
    pub fn compact_path(&self) -> PathBuf {
        self.path.join(COMPACT_FILE)
    }

    /// Returns whether the record log exists yet.
    #[must_use]
    pub fn has_log(&self) -> bool {
        self.log_path().exists()
    }

    /// Deletes output left behind by a compaction that never reached its rename.
    ///
    /// Returns whether a stale file was found.
    pub fn remove_stale_compaction(&self) -> CoreResult<bool> {
        match fs::remove_file(self.compact_path()) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Atomically replaces the log with the compaction output.
    ///
    /// The compaction file must already be synced. Follow with
    /// [`DatabaseDir::sync`] so the swap itself survives a crash.
    pub fn swap_in_compacted(&self) -> CoreResult<()> {
        fs::rename(self.compact_path(), self.log_path())?;
        Ok(())
    }

    /// Fsyncs the directory, making renames inside it durable.
    pub fn sync(&self) -> CoreResult<()> {
        minidb_storage::sync_directory(&self.path)?;
        Ok(())
    }
}
