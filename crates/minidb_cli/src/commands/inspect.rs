//! Inspect command implementation.

use super::{read_log, Format};
use minidb_core::log::{LogScan, ScanStop, LOG_HEADER_SIZE};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;

/// Database inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Database path.
    pub path: String,
    /// Log size in bytes, header included.
    pub log_size: u64,
    /// Whether the log starts with a valid header.
    pub header_valid: bool,
    /// Number of valid records.
    pub record_count: usize,
    /// Number of tombstone records.
    pub tombstone_count: usize,
    /// Number of live keys.
    pub live_keys: usize,
    /// Bytes held by the live records.
    pub live_bytes: u64,
    /// Bytes compaction would reclaim.
    pub dead_bytes: u64,
    /// Bytes a recovery would cut off the end of the log.
    pub torn_bytes: u64,
    /// Highest sequence number in the log.
    pub last_sequence: u64,
    /// Corruption found, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corruption: Option<String>,
}

impl InspectResult {
    /// Summarizes a scanned log.
    pub fn from_scan(path: &Path, scan: &LogScan) -> Self {
        let mut latest: HashMap<&str, (bool, u64)> = HashMap::new();
        let mut tombstone_count = 0;
        for scanned in &scan.records {
            if scanned.record.is_tombstone() {
                tombstone_count += 1;
            }
            latest.insert(&scanned.record.key, (scanned.record.is_tombstone(), scanned.len));
        }
        let live: Vec<u64> = latest
            .values()
            .filter(|(tombstone, _)| !tombstone)
            .map(|(_, len)| *len)
            .collect();
        let live_bytes: u64 = live.iter().sum();
        let record_bytes = scan.valid_len.saturating_sub(LOG_HEADER_SIZE as u64);

        Self {
            path: path.display().to_string(),
            log_size: scan.total_len,
            header_valid: !scan.needs_header(),
            record_count: scan.records.len(),
            tombstone_count,
            live_keys: live.len(),
            live_bytes,
            dead_bytes: record_bytes.saturating_sub(live_bytes),
            torn_bytes: scan.torn_bytes(),
            last_sequence: scan.records.last().map_or(0, |r| r.record.sequence.as_u64()),
            corruption: match &scan.stop {
                ScanStop::Corrupt { offset, reason } => Some(format!("offset {offset}: {reason}")),
                _ => None,
            },
        }
    }
}

/// Runs the inspect command.
pub fn run(path: &Path, format: Format) -> Result<(), Box<dyn std::error::Error>> {
    let scan = read_log(path)?;
    let result = InspectResult::from_scan(path, &scan);

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        Format::Text => print_text_output(&result),
    }
    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("MiniDB Database: {}", result.path);
    println!();
    println!("Log:");
    println!("  Size:          {}", format_bytes(result.log_size));
    println!("  Header:        {}", if result.header_valid { "valid" } else { "missing" });
    println!("  Records:       {}", result.record_count);
    println!("  Tombstones:    {}", result.tombstone_count);
    println!("  Last sequence: {}", result.last_sequence);
    println!();
    println!("Keys:");
    println!("  Live:          {}", result.live_keys);
    println!("  Live bytes:    {}", format_bytes(result.live_bytes));
    println!("  Dead bytes:    {}", format_bytes(result.dead_bytes));
    if result.torn_bytes > 0 {
        println!();
        println!("Torn tail: {} (removed on next open)", format_bytes(result.torn_bytes));
    }
    if let Some(corruption) = &result.corruption {
        println!();
        println!("Corruption: {corruption}");
    }
}

fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} bytes")
    }
}
