//! Durable local record store
//!
//! Append-only cache of output records, grouped into one CSV container per
//! (batch, calendar day). Each container starts with a fixed header row;
//! every data row carries a trailing `is_uploaded` acknowledgment column
//! (`0` pending, `1` confirmed). The session appends, the reconciler lists
//! pending rows and marks them confirmed; all mutations are serialized
//! through one mutex so a concurrent append and a list/mark cycle never
//! observe a torn container.
//!
//! A zero-length container is invalid (a writer crashed mid-creation) and
//! is deleted on sight, never parsed. A header-only container is valid and
//! simply has nothing pending. Rows with the wrong field count are skipped
//! on read rather than indexed blindly.

use chrono::NaiveDateTime;
use packline_common::record::{format_scan_time, parse_scan_time, OutputRecord, Remark};
use packline_common::{Error, Result};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

/// Fixed container column order; `is_uploaded` is always last
pub const HEADER: [&str; 13] = [
    "muf_no",
    "line",
    "fg_no",
    "pack_per_ctn",
    "pack_per_hr",
    "actual_pack",
    "ctn_count",
    "scanned_code",
    "scanned_count",
    "scanned_at",
    "scanned_by",
    "remarks",
    "is_uploaded",
];

/// One unconfirmed row: data-row position within its container plus the record
#[derive(Debug, Clone)]
pub struct PendingRow {
    pub index: usize,
    pub record: OutputRecord,
}

/// Local container store rooted at one directory
pub struct RecordStore {
    root: PathBuf,
    writable: bool,
    lock: Mutex<()>,
}

impl RecordStore {
    /// Open the store, creating the directory and probing writability.
    ///
    /// Never fails: an unwritable store is still returned so the session
    /// can keep running, but `append` will report `Error::Store`. Callers
    /// check `is_writable` at startup and surface the diagnostic loudly.
    pub fn open(root: impl Into<PathBuf>) -> RecordStore {
        let root = root.into();
        let writable = probe_writable(&root);
        RecordStore {
            root,
            writable,
            lock: Mutex::new(()),
        }
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Append one record, tagged confirmed (`uploaded`) or pending.
    pub fn append(&self, record: &OutputRecord, uploaded: bool) -> Result<()> {
        if !self.writable {
            return Err(Error::Store(format!(
                "record store not writable: {}",
                self.root.display()
            )));
        }

        let _guard = self.lock.lock().unwrap();
        let path = self.container_path(&record.muf_no, record.scanned_at);
        let is_new = !path.exists();

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if is_new {
            writer.write_record(HEADER).map_err(csv_err)?;
        }
        writer
            .write_record(encode_row(record, uploaded))
            .map_err(csv_err)?;
        writer.flush()?;

        debug!(
            container = %path.display(),
            uploaded,
            remarks = %record.remarks,
            "record appended"
        );
        Ok(())
    }

    /// List container files, deleting zero-length ones on sight.
    pub fn containers(&self) -> Result<Vec<PathBuf>> {
        let _guard = self.lock.lock().unwrap();
        let mut out = Vec::new();
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                return Err(Error::Store(format!(
                    "cannot list {}: {}",
                    self.root.display(),
                    e
                )))
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("csv") {
                continue;
            }
            match entry.metadata() {
                Ok(meta) if meta.len() == 0 => {
                    debug!(container = %path.display(), "removing zero-length container");
                    if let Err(e) = std::fs::remove_file(&path) {
                        warn!(container = %path.display(), "failed to remove: {}", e);
                    }
                }
                Ok(_) => out.push(path),
                Err(_) => continue,
            }
        }
        out.sort();
        Ok(out)
    }

    /// Collect all rows still flagged pending in one container.
    pub fn pending_rows(&self, path: &Path) -> Result<Vec<PendingRow>> {
        let _guard = self.lock.lock().unwrap();
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)
            .map_err(|e| Error::Store(format!("{}: {}", path.display(), e)))?;

        let mut pending = Vec::new();
        for (index, row) in reader.records().enumerate() {
            let row = match row {
                Ok(row) => row,
                Err(e) => {
                    warn!(container = %path.display(), row = index, "skipping unreadable row: {}", e);
                    continue;
                }
            };
            match parse_row(&row) {
                Some((record, false)) => pending.push(PendingRow { index, record }),
                Some((_, true)) => {}
                None => {
                    warn!(container = %path.display(), row = index, "skipping malformed row");
                }
            }
        }
        Ok(pending)
    }

    /// Flag the given data rows confirmed and rewrite the container.
    pub fn mark_confirmed(&self, path: &Path, rows: &[usize]) -> Result<()> {
        let _guard = self.lock.lock().unwrap();
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)
            .map_err(|e| Error::Store(format!("{}: {}", path.display(), e)))?;

        let mut records: Vec<csv::StringRecord> = Vec::new();
        for row in reader.records() {
            records.push(row.map_err(|e| Error::Store(format!("{}: {}", path.display(), e)))?);
        }

        let flag_col = HEADER.len() - 1;
        for &index in rows {
            if let Some(record) = records.get_mut(index) {
                if record.len() == HEADER.len() {
                    let mut fields: Vec<&str> = record.iter().collect();
                    fields[flag_col] = "1";
                    *record = csv::StringRecord::from(fields);
                }
            }
        }

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(path)
            .map_err(|e| Error::Store(format!("{}: {}", path.display(), e)))?;
        writer.write_record(HEADER).map_err(csv_err)?;
        for record in &records {
            writer.write_record(record).map_err(csv_err)?;
        }
        writer.flush()?;
        Ok(())
    }

    fn container_path(&self, muf_no: &str, at: NaiveDateTime) -> PathBuf {
        self.root
            .join(format!("{}_{}.csv", muf_no, at.format("%Y%m%d")))
    }
}

fn csv_err(e: csv::Error) -> Error {
    Error::Store(e.to_string())
}

fn probe_writable(root: &Path) -> bool {
    if let Err(e) = std::fs::create_dir_all(root) {
        warn!(dir = %root.display(), "cannot create record directory: {}", e);
        return false;
    }
    let probe = root.join(".write_test");
    match std::fs::write(&probe, "ok") {
        Ok(()) => {
            let _ = std::fs::remove_file(&probe);
            true
        }
        Err(e) => {
            warn!(dir = %root.display(), "record directory not writable: {}", e);
            false
        }
    }
}

fn encode_row(record: &OutputRecord, uploaded: bool) -> Vec<String> {
    vec![
        record.muf_no.clone(),
        record.line.clone(),
        record.fg_no.clone(),
        opt_field(record.pack_per_ctn),
        opt_field(record.pack_per_hr),
        opt_field(record.actual_pack),
        record.ctn_count.to_string(),
        record.scanned_code.clone(),
        record.scanned_count.to_string(),
        format_scan_time(record.scanned_at),
        record.scanned_by.clone(),
        record.remarks.to_string(),
        if uploaded { "1" } else { "0" }.to_string(),
    ]
}

fn opt_field(v: Option<i64>) -> String {
    v.map(|x| x.to_string()).unwrap_or_default()
}

/// Parse one data row; None for any row that does not match the layout.
fn parse_row(row: &csv::StringRecord) -> Option<(OutputRecord, bool)> {
    if row.len() != HEADER.len() {
        return None;
    }
    let uploaded = match &row[12] {
        "0" => false,
        "1" => true,
        _ => return None,
    };
    let record = OutputRecord {
        muf_no: row[0].to_string(),
        line: row[1].to_string(),
        fg_no: row[2].to_string(),
        pack_per_ctn: parse_opt(&row[3])?,
        pack_per_hr: parse_opt(&row[4])?,
        actual_pack: parse_opt(&row[5])?,
        ctn_count: row[6].parse().ok()?,
        scanned_code: row[7].to_string(),
        scanned_count: row[8].parse().ok()?,
        scanned_at: parse_scan_time(&row[9])?,
        scanned_by: row[10].to_string(),
        remarks: row[11].parse::<Remark>().ok()?,
    };
    Some((record, uploaded))
}

fn parse_opt(field: &str) -> Option<Option<i64>> {
    if field.is_empty() {
        Some(None)
    } else {
        field.parse().ok().map(Some)
    }
}
