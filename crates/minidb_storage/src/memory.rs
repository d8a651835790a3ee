//! In-memory storage backend.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::sync::Arc;

/// A log held in memory.
///
/// The buffer can be shared between instances with [`InMemoryBackend::shared`].
/// Tests use this to drop a database without closing it and reopen it over
/// the same bytes, which is what a process crash looks like to the engine.
///
/// # Example
///
/// ```rust
/// use minidb_storage::{StorageBackend, InMemoryBackend};
///
/// let mut backend = InMemoryBackend::new();
/// let observer = backend.shared();
/// backend.append(b"test data").unwrap();
/// assert_eq!(observer.size().unwrap(), 9);
/// ```
#[derive(Debug, Default, Clone)]
pub struct InMemoryBackend {
    data: Arc<RwLock<Vec<u8>>>,
}

impl InMemoryBackend {
    /// Creates a new empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend holding `data`.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(RwLock::new(data)),
        }
    }

    /// Returns another handle to the same buffer.
    #[must_use]
    pub fn shared(&self) -> Self {
        self.clone()
    }

    /// Returns a copy of the buffer.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.data.read().clone()
    }

    /// Overwrites one byte. Used to simulate media corruption.
    ///
    /// Does nothing if `offset` is out of range.
    pub fn corrupt_byte(&self, offset: usize) {
        if let Some(byte) = self.data.write().get_mut(offset) {
            *byte ^= 0xff;
        }
    }
}

impl StorageBackend for InMemoryBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let data = self.data.read();
        let size = data.len() as u64;
        let end = offset.saturating_add(len as u64);
        if end > size {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }
        #[allow(clippy::cast_possible_truncation)]
        let range = offset as usize..end as usize;
        Ok(data[range].to_vec())
    }

    fn append(&mut self, new_data: &[u8]) -> StorageResult<u64> {
        let mut data = self.data.write();
        let offset = data.len() as u64;
        data.extend_from_slice(new_data);
        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.data.read().len() as u64)
    }

    fn sync(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn is_persistent(&self) -> bool {
        false
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        let mut data = self.data.write();
        let size = data.len() as u64;
        if new_size > size {
            return Err(StorageError::TruncatePastEnd {
                requested: new_size,
                size,
            });
        }
        #[allow(clippy::cast_possible_truncation)]
        data.truncate(new_size as usize);
        Ok(())
    }
}
