//! Verify command implementation.
//!
//! Walks the log exactly as recovery does, then decodes every payload.

use super::read_log;
use minidb_codec::from_cbor;
use minidb_core::log::{LogScan, ScanStop};
use std::path::Path;

/// Verification result.
#[derive(Debug, Default)]
pub struct VerifyResult {
    /// Number of records checked.
    pub records_checked: usize,
    /// Number of valid records.
    pub valid_records: usize,
    /// Bytes recovery would cut off.
    pub torn_bytes: u64,
    /// List of errors found.
    pub errors: Vec<String>,
}

impl VerifyResult {
    /// Returns whether the log would open cleanly.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Runs the verify command.
pub fn run(path: &Path, verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    println!("Verifying database at {}", path.display());
    println!();

    let scan = read_log(path)?;
    let result = verify(&scan, |line| {
        if verbose {
            println!("{line}");
        }
    });

    println!(
        "Records: {} checked, {} valid",
        result.records_checked, result.valid_records
    );
    if result.torn_bytes > 0 {
        println!(
            "Torn tail: {} bytes (recoverable, removed on next open)",
            result.torn_bytes
        );
    }
    for error in &result.errors {
        println!("  ✗ {error}");
    }

    println!();
    if result.is_ok() {
        println!("✓ Database verification passed");
        Ok(())
    } else {
        println!("✗ Database verification failed");
        Err("Verification failed".into())
    }
}

/// Checks a scanned log, reporting one line per record to `report`.
pub fn verify(scan: &LogScan, mut report: impl FnMut(String)) -> VerifyResult {
    let mut result = VerifyResult::default();

    for scanned in &scan.records {
        result.records_checked += 1;
        let record = &scanned.record;
        if record.is_tombstone() {
            result.valid_records += 1;
            report(format!("  ✓ {} delete {:?} @{}", record.sequence, record.key, scanned.offset));
            continue;
        }
        match from_cbor(&record.payload) {
            Ok(value) => {
                result.valid_records += 1;
                report(format!(
                    "  ✓ {} set {:?} ({}) @{}",
                    record.sequence,
                    record.key,
                    value.type_name(),
                    scanned.offset
                ));
            }
            Err(err) => {
                report(format!("  ✗ {} set {:?} @{}: {err}", record.sequence, record.key, scanned.offset));
                result.errors.push(format!(
                    "Undecodable value for {:?} at offset {}: {err}",
                    record.key, scanned.offset
                ));
            }
        }
    }

    match &scan.stop {
        ScanStop::End => {}
        ScanStop::TornTail { offset, reason } => {
            result.torn_bytes = scan.torn_bytes();
            report(format!("  ~ torn tail @{offset}: {reason}"));
        }
        ScanStop::Corrupt { offset, reason } => {
            result.records_checked += 1;
            report(format!("  ✗ corrupt @{offset}: {reason}"));
            result.errors.push(format!("Corruption at offset {offset}: {reason}"));
        }
    }
    result
}
