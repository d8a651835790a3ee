//! Compact command implementation.

use super::read_log;
use minidb_core::{CompactionResult, Compactor, Config, Database};
use std::path::Path;

/// Runs the compact command.
///
/// A dry run only analyzes the log; otherwise the database is opened and
/// compacted through the engine, which takes the directory lock.
pub fn run(path: &Path, dry_run: bool) -> Result<(), Box<dyn std::error::Error>> {
    println!("Compacting database at {}", path.display());
    if dry_run {
        println!("(dry run - no changes will be made)");
    }
    println!();

    let result = if dry_run {
        analyze(path)?
    } else {
        let db = Database::open(path, Config::new().create_if_missing(false).auto_compact(false))?;
        let result = db.compact()?;
        db.close()?;
        result
    };

    print_result(&result);
    if !dry_run {
        println!();
        println!("✓ Compaction complete");
    }
    Ok(())
}

/// Computes what compaction would do without writing anything.
pub fn analyze(path: &Path) -> Result<CompactionResult, Box<dyn std::error::Error>> {
    let scan = read_log(path)?;
    scan.check()?;
    let records = scan.records.into_iter().map(|scanned| scanned.record).collect();
    let (_, result) = Compactor::compact_log(records, scan.valid_len)?;
    Ok(result)
}

fn print_result(result: &CompactionResult) {
    println!("Compaction Analysis:");
    println!("  Input records:     {}", result.input_records);
    println!("  Output records:    {}", result.output_records);
    println!("  Tombstones:        {}", result.tombstones_removed);
    println!("  Obsolete versions: {}", result.obsolete_versions_removed);
    println!();
    println!("  Size before: {} bytes", result.bytes_before);
    println!("  Size after:  {} bytes", result.bytes_after);
    println!(
        "  Space saved: {} bytes ({:.1}%)",
        result.bytes_saved(),
        if result.bytes_before > 0 {
            (result.bytes_saved() as f64 / result.bytes_before as f64) * 100.0
        } else {
            0.0
        }
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use minidb_core::Value;
    use std::fs;
    use tempfile::tempdir;

    fn write_db(path: &Path) {
        let db = Database::open(path, Config::default()).unwrap();
        for i in 0..10 {
            db.set("counter", Value::from(i)).unwrap();
        }
        db.set("gone", Value::from("x")).unwrap();
        db.delete("gone").unwrap();
        db.close().unwrap();
    }

    #[test]
    fn dry_run_leaves_the_log_alone() {
        let dir = tempdir().unwrap();
        write_db(dir.path());
        let log_path = dir.path().join(minidb_core::LOG_FILE);
        let before = fs::read(&log_path).unwrap();

        let result = analyze(dir.path()).unwrap();
        assert_eq!(result.input_records, 12);
        assert_eq!(result.output_records, 1);
        assert_eq!(result.tombstones_removed, 1);
        assert!(result.bytes_saved() > 0);

        run(dir.path(), true).unwrap();
        assert_eq!(fs::read(&log_path).unwrap(), before);
    }

    #[test]
    fn compaction_matches_analysis() {
        let dir = tempdir().unwrap();
        write_db(dir.path());
        let predicted = analyze(dir.path()).unwrap();

        run(dir.path(), false).unwrap();
        let size = fs::metadata(dir.path().join(minidb_core::LOG_FILE)).unwrap().len();
        assert_eq!(size, predicted.bytes_after);

        let db = Database::open(dir.path(), Config::default()).unwrap();
        assert_eq!(db.keys().unwrap(), vec!["counter"]);
        assert_eq!(db.get("counter").unwrap(), Some(Value::from(9)));
    }
}
