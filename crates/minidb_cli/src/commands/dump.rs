//! Dump command implementation.

use super::{read_log, Format};
use minidb_codec::from_cbor;
use minidb_core::log::ScannedRecord;
use serde::Serialize;
use std::path::Path;

/// One dumped record.
#[derive(Debug, Serialize)]
pub struct DumpedRecord {
    /// Sequence number.
    pub sequence: u64,
    /// Offset in the log.
    pub offset: u64,
    /// Encoded length.
    pub len: u64,
    /// `set` or `delete`.
    pub kind: &'static str,
    /// Key.
    pub key: String,
    /// Value as JSON, when it has a JSON form.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    /// Description of a value JSON cannot carry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl DumpedRecord {
    /// Describes a scanned record.
    pub fn from_scanned(scanned: &ScannedRecord) -> Self {
        let record = &scanned.record;
        let (kind, value, note) = if record.is_tombstone() {
            ("delete", None, None)
        } else {
            match from_cbor(&record.payload) {
                Ok(decoded) => match decoded.to_json() {
                    Ok(json) => ("set", Some(json), None),
                    Err(_) => ("set", None, Some(format!("<{}>", decoded.type_name()))),
                },
                Err(err) => ("set", None, Some(format!("<undecodable: {err}>"))),
            }
        };
        Self {
            sequence: record.sequence.as_u64(),
            offset: scanned.offset,
            len: scanned.len,
            kind,
            key: record.key.clone(),
            value,
            note,
        }
    }
}

/// Runs the dump command.
pub fn run(path: &Path, limit: Option<usize>, format: Format) -> Result<(), Box<dyn std::error::Error>> {
    let scan = read_log(path)?;
    let limit = limit.unwrap_or(usize::MAX);
    let records: Vec<DumpedRecord> = scan
        .records
        .iter()
        .take(limit)
        .map(DumpedRecord::from_scanned)
        .collect();

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&records)?),
        Format::Text => {
            println!("Log records in {}", path.display());
            println!();
            for record in &records {
                let shown = match (&record.value, &record.note) {
                    (Some(value), _) => value.to_string(),
                    (None, Some(note)) => note.clone(),
                    (None, None) => String::new(),
                };
                println!(
                    "[{:>6}] @{:<8} {:<6} {:?} {}",
                    record.sequence, record.offset, record.kind, record.key, shown
                );
            }
            println!();
            println!("Total: {} records", records.len());
        }
    }

    scan.check()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use minidb_core::{Config, Database, Value};
    use tempfile::tempdir;

    #[test]
    fn records_render_as_json() {
        let dir = tempdir().unwrap();
        {
            let db = Database::open(dir.path(), Config::default()).unwrap();
            db.set_json("doc", &serde_json::json!({"user": "Alice"})).unwrap();
            db.set("raw", Value::from(vec![1u8, 2])).unwrap();
            db.delete("doc").unwrap();
            db.close().unwrap();
        }

        let scan = read_log(dir.path()).unwrap();
        let dumped: Vec<DumpedRecord> = scan.records.iter().map(DumpedRecord::from_scanned).collect();
        assert_eq!(dumped.len(), 3);

        assert_eq!(dumped[0].kind, "set");
        assert_eq!(dumped[0].value, Some(serde_json::json!({"user": "Alice"})));
        assert_eq!(dumped[1].value, None);
        assert_eq!(dumped[1].note.as_deref(), Some("<bytes>"));
        assert_eq!(dumped[2].kind, "delete");
        assert_eq!(dumped[2].sequence, 3);

        assert!(run(dir.path(), Some(1), Format::Json).is_ok());
        assert!(run(dir.path(), None, Format::Text).is_ok());
    }
}
