//! CLI command implementations.

pub mod compact;
pub mod dump;
pub mod inspect;
pub mod verify;

use minidb_core::log::{scan_log, LogScan};
use minidb_storage::{FileBackend, StorageBackend};
use std::path::Path;

/// Reads and scans the log of the database at `path` without locking it.
pub(crate) fn read_log(path: &Path) -> Result<LogScan, Box<dyn std::error::Error>> {
    let log_path = path.join(minidb_core::LOG_FILE);
    if !log_path.is_file() {
        return Err(format!("No database found at {}", path.display()).into());
    }
    let backend = FileBackend::open(&log_path)?;
    let bytes = backend.read_all()?;
    Ok(scan_log(&bytes))
}

/// Output format shared by the reporting commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Format {
    /// Human-readable text.
    Text,
    /// Pretty-printed JSON.
    Json,
}
