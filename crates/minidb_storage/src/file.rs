//! File-based storage backend.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::{Mutex, RwLock};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A log file on disk.
///
/// # Durability
///
/// - `flush()` hands buffered bytes to the OS
/// - `sync()` calls `File::sync_all()`, so data and length are on disk
///
/// # Example
///
/// ```no_run
/// use minidb_storage::{StorageBackend, FileBackend};
/// use std::path::Path;
///
/// let mut backend = FileBackend::open(Path::new("data.mdb")).unwrap();
/// backend.append(b"record").unwrap();
/// backend.sync().unwrap();
/// ```
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    file: Mutex<File>,
    size: RwLock<u64>,
}

impl FileBackend {
    /// Opens the file at `path`, creating it empty if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or created.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        Self::from_file(path, file)
    }

    /// Creates an empty file at `path`, replacing any existing content.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created.
    pub fn create_new(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Self::from_file(path, file)
    }

    fn from_file(path: &Path, file: File) -> StorageResult<Self> {
        let size = file.metadata()?.len();
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            size: RwLock::new(size),
        })
    }

    /// Returns the path to the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Fsyncs a directory so that file creations and renames inside it are durable.
///
/// # Errors
///
/// Returns an error if the directory cannot be opened or synced.
#[cfg(unix)]
pub fn sync_directory(dir: &Path) -> StorageResult<()> {
    File::open(dir)?.sync_all()?;
    Ok(())
}

/// Fsyncs a directory so that file creations and renames inside it are durable.
///
/// NTFS journals metadata and directories cannot be opened for sync, so
/// this is a no-op off Unix.
#[cfg(not(unix))]
pub fn sync_directory(_dir: &Path) -> StorageResult<()> {
    Ok(())
}

impl StorageBackend for FileBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let size = *self.size.read();
        let end = offset.saturating_add(len as u64);
        if end > size {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }
        if len == 0 {
            return Ok(Vec::new());
        }

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        let mut buffer = vec![0u8; len];
        file.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let mut size = self.size.write();
        let offset = *size;
        if data.is_empty() {
            return Ok(offset);
        }

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        if let Err(e) = file.write_all(data) {
            // Drop whatever part of `data` reached the file. If this fails
            // too, the caller's `truncate` gets another chance.
            let _ = file.set_len(offset);
            return Err(e.into());
        }
        *size += data.len() as u64;
        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.file.lock().flush()?;
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(*self.size.read())
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.file.lock().sync_all()?;
        Ok(())
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        let mut size = self.size.write();
        if new_size > *size {
            return Err(StorageError::TruncatePastEnd {
                requested: new_size,
                size: *size,
            });
        }

        let file = self.file.lock();
        file.set_len(new_size)?;
        file.sync_all()?;
        *size = new_size;
        Ok(())
    }
}
