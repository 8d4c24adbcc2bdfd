//! Output and persistence of import results.
//!
//! The report goes to the log as a per-table summary and optionally to stdout
//! as JSON; each run can also be appended to a CSV history file.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use anyhow::Result;
use csv::WriterBuilder;
use tracing::{debug, info};

use crate::report::{ImportRecord, ImportReport};

/// Logs one line per loaded table.
pub fn print_pretty(report: &ImportReport) {
    for load in &report.loads {
        info!(
            table = %load.entity,
            staged = load.staged_rows,
            loaded = load.loaded_rows,
            elapsed_ms = load.elapsed_ms,
            "Loaded"
        );
    }
    debug!("{:#?}", report);
}

/// Writes the report to stdout as pretty-printed JSON.
pub fn print_json(report: &ImportReport) -> Result<()> {
    write_json(std::io::stdout().lock(), report)
}

pub fn write_json<W: Write>(mut writer: W, report: &ImportReport) -> Result<()> {
    serde_json::to_writer_pretty(&mut writer, report)?;
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}

/// Appends an [`ImportRecord`] as a row to the CSV history file.
///
/// Creates the file (and its parent directory) with headers if it does not
/// already exist.
pub fn append_record(path: &Path, record: &ImportRecord) -> Result<()> {
    let file_exists = path.exists();
    debug!(path = %path.display(), file_exists, "Appending import record");

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().append(true).create(true).open(path)?;

    let mut writer = WriterBuilder::new()
        .has_headers(!file_exists)
        .from_writer(file);

    writer.serialize(record)?;
    writer.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use std::fs;

    fn report() -> ImportReport {
        ImportReport {
            started_at: Utc::now(),
            service_date: NaiveDate::from_ymd_opt(2024, 6, 10).unwrap(),
            active_services: 3,
            loads: vec![],
            elapsed_ms: 42,
        }
    }

    #[test]
    fn test_print_pretty_does_not_panic() {
        print_pretty(&report());
    }

    #[test]
    fn test_write_json() {
        let mut out = Vec::new();
        write_json(&mut out, &report()).unwrap();

        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["service_date"], "2024-06-10");
        assert_eq!(value["active_services"], 3);
        assert!(out.ends_with(b"\n"));
    }

    #[test]
    fn test_append_record_creates_file_and_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history").join("imports.csv");

        append_record(&path, &ImportRecord::from_report(&report())).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("timestamp,status,"));
        assert!(content.contains("2024-06-10"));
    }

    #[test]
    fn test_append_record_writes_header_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("imports.csv");

        let record = ImportRecord::from_report(&report());
        append_record(&path, &record).unwrap();
        append_record(&path, &record).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let header_count = content.lines().filter(|l| l.contains("timestamp")).count();
        assert_eq!(header_count, 1);
        // 1 header + 2 data rows
        assert_eq!(content.lines().count(), 3);
    }
}
