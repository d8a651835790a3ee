//! Fault-injecting backend for crash tests.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug)]
struct FaultState {
    /// Bytes that may still be appended before the simulated crash.
    budget: AtomicU64,
    fail_sync: AtomicBool,
    crashed: AtomicBool,
}

/// Controls a [`FaultyBackend`] after it has been handed to a database.
#[derive(Debug, Clone)]
pub struct FaultHandle {
    state: Arc<FaultState>,
}

impl FaultHandle {
    /// Crash once `bytes` more bytes have been appended.
    ///
    /// The append that crosses the limit writes only the bytes that fit,
    /// leaving a torn record, and fails.
    pub fn crash_after(&self, bytes: u64) {
        self.state.budget.store(bytes, Ordering::SeqCst);
    }

    /// Make every `sync` fail.
    pub fn fail_syncs(&self, fail: bool) {
        self.state.fail_sync.store(fail, Ordering::SeqCst);
    }

    /// Clears all armed faults.
    pub fn reset(&self) {
        self.state.budget.store(u64::MAX, Ordering::SeqCst);
        self.state.fail_sync.store(false, Ordering::SeqCst);
        self.state.crashed.store(false, Ordering::SeqCst);
    }

    /// Returns whether a fault has fired.
    #[must_use]
    pub fn has_crashed(&self) -> bool {
        self.state.crashed.load(Ordering::SeqCst)
    }
}

/// Wraps another backend and fails on demand.
pub struct FaultyBackend {
    inner: Box<dyn StorageBackend>,
    state: Arc<FaultState>,
}

impl FaultyBackend {
    /// Wraps `inner` with no faults armed.
    pub fn new(inner: Box<dyn StorageBackend>) -> Self {
        Self {
            inner,
            state: Arc::new(FaultState {
                budget: AtomicU64::new(u64::MAX),
                fail_sync: AtomicBool::new(false),
                crashed: AtomicBool::new(false),
            }),
        }
    }

    /// Returns a handle for arming faults.
    #[must_use]
    pub fn handle(&self) -> FaultHandle {
        FaultHandle {
            state: Arc::clone(&self.state),
        }
    }
}

impl StorageBackend for FaultyBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.inner.read_at(offset, len)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let budget = self.state.budget.load(Ordering::SeqCst);
        let len = data.len() as u64;

        if len <= budget {
            if budget != u64::MAX {
                self.state.budget.store(budget - len, Ordering::SeqCst);
            }
            return self.inner.append(data);
        }

        self.state.crashed.store(true, Ordering::SeqCst);
        self.state.budget.store(0, Ordering::SeqCst);
        #[allow(clippy::cast_possible_truncation)]
        let partial = &data[..budget as usize];
        if !partial.is_empty() {
            self.inner.append(partial)?;
        }
        Err(StorageError::Injected("crash during append"))
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.inner.flush()
    }

    fn size(&self) -> StorageResult<u64> {
        self.inner.size()
    }

    fn sync(&mut self) -> StorageResult<()> {
        if self.state.fail_sync.load(Ordering::SeqCst) {
            self.state.crashed.store(true, Ordering::SeqCst);
            return Err(StorageError::Injected("crash during sync"));
        }
        self.inner.sync()
    }

    fn is_persistent(&self) -> bool {
        self.inner.is_persistent()
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        self.inner.truncate(new_size)
    }
}
