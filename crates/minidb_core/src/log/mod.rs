//! The append-only record log.
//!
//! The log is the only durable state. It starts with a fixed header and is
//! followed by one CRC-guarded record per mutation. Recovery replays it into
//! the in-memory index.

mod header;
mod record;
mod scan;
mod writer;

pub use header::{check_header, encode_header, HeaderCheck, FORMAT_VERSION, LOG_HEADER_SIZE, LOG_MAGIC};
pub use record::{LogRecord, RecordDefect, RecordFlags, MAX_KEY_LEN, MIN_RECORD_SIZE};
pub use scan::{scan_log, scan_log_with_limit, LogScan, ScanStop, ScannedRecord};
pub use writer::{Appended, LogWriter};
