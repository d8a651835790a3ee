//! # MiniDB Storage
//!
//! Byte-level storage backends for the MiniDB log.
//!
//! Backends are **opaque append-only byte stores**. They know nothing about
//! records, keys or checksums; the engine in `minidb_core` owns the format.
//!
//! ## Available Backends
//!
//! - [`FileBackend`] - persistent log file
//! - [`InMemoryBackend`] - ephemeral databases and tests
//! - [`FaultyBackend`] - wraps another backend and injects crashes
//!
//! ## Example
//!
//! ```rust
//! use minidb_storage::{StorageBackend, InMemoryBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"hello world").unwrap();
//! let data = backend.read_at(offset, 11).unwrap();
//! assert_eq!(&data, b"hello world");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod faulty;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use faulty::{FaultHandle, FaultyBackend};
pub use file::{sync_directory, FileBackend};
pub use memory::InMemoryBackend;
