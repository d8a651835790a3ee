//! # MiniDB Core
//!
//! Storage engine for MiniDB: one durable keyspace of string keys mapped to
//! [`Value`]s.
//!
//! This crate provides:
//! - An append-only, checksummed record log with torn-tail recovery
//! - An in-memory index rebuilt from the log on open
//! - Serialized, durable mutations with a total order
//! - Log compaction
//!
//! ```rust
//! use minidb_core::{Database, Value};
//!
//! let db = Database::open_in_memory().unwrap();
//! db.set_json("user:1", &serde_json::json!({"name": "ana"})).unwrap();
//! assert_eq!(db.keys().unwrap(), vec!["user:1"]);
//! assert!(db.delete("user:1").unwrap());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod compaction;
mod config;
mod database;
mod dir;
mod error;
mod keyspace;
pub mod log;
mod stats;
mod types;

pub use compaction::{CompactionResult, Compactor};
pub use config::Config;
pub use database::Database;
pub use dir::LOG_FILE;
pub use error::{CoreError, CoreResult, ErrorKind};
pub use log::{LogRecord, RecordFlags};
pub use minidb_codec::{Value, ValueKind};
pub use stats::{DatabaseStats, DatabaseStatsSnapshot};
pub use types::{Entry, SequenceNumber};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
