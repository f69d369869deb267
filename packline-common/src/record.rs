//! Output record and batch reference data model
//!
//! One `OutputRecord` is created per accepted carton scan. Records are
//! inserted into the central `output_log` table when the database is
//! reachable and always appended to the local container store; the store
//! tracks a trailing acknowledgment flag per row (see packline-station).

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Timestamp format used in container rows and remote inserts
pub const SCAN_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Format a scan timestamp for persistence
pub fn format_scan_time(t: NaiveDateTime) -> String {
    t.format(SCAN_TIME_FORMAT).to_string()
}

/// Parse a persisted scan timestamp
pub fn parse_scan_time(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, SCAN_TIME_FORMAT).ok()
}

/// Batch (MUF) metadata from the central reference table.
///
/// Immutable once fetched for a session; cleared on RESET.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReference {
    /// Batch code (unique key in the reference table)
    pub muf_no: String,
    /// Finished-goods product code
    pub fg_no: String,
    /// Units packed per carton
    pub pack_per_ctn: Option<i64>,
    /// Units-per-hour production target
    pub pack_per_hr: Option<i64>,
    /// Total units required for the batch
    pub qty_done: i64,
}

/// Record remark tag: first accepted carton vs. repeat scans
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Remark {
    #[serde(rename = "TEMPLATE")]
    Template,
    #[serde(rename = "SCAN")]
    Scan,
}

impl Remark {
    pub fn as_str(&self) -> &'static str {
        match self {
            Remark::Template => "TEMPLATE",
            Remark::Scan => "SCAN",
        }
    }
}

impl fmt::Display for Remark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Remark {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, ()> {
        match s {
            "TEMPLATE" => Ok(Remark::Template),
            "SCAN" => Ok(Remark::Scan),
            _ => Err(()),
        }
    }
}

/// One confirmed or pending carton scan.
///
/// Field order matches the `output_log` insert and the container row
/// layout. `ctn_count` and `scanned_count` are fixed at 1 per physical
/// scan event; `actual_pack` is `pack_per_ctn * ctn_count`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRecord {
    pub muf_no: String,
    pub line: String,
    pub fg_no: String,
    pub pack_per_ctn: Option<i64>,
    pub pack_per_hr: Option<i64>,
    pub actual_pack: Option<i64>,
    pub ctn_count: i64,
    pub scanned_code: String,
    pub scanned_count: i64,
    pub scanned_at: NaiveDateTime,
    pub scanned_by: String,
    pub remarks: Remark,
}

impl OutputRecord {
    /// Build a record for one accepted scan of `code` under `reference`.
    pub fn for_scan(
        reference: &BatchReference,
        line: &str,
        code: &str,
        scanned_by: &str,
        scanned_at: NaiveDateTime,
        remarks: Remark,
    ) -> Self {
        let ctn_count = 1;
        OutputRecord {
            muf_no: reference.muf_no.clone(),
            line: line.to_string(),
            fg_no: reference.fg_no.clone(),
            pack_per_ctn: reference.pack_per_ctn,
            pack_per_hr: reference.pack_per_hr,
            actual_pack: reference.pack_per_ctn.map(|p| p * ctn_count),
            ctn_count,
            scanned_code: code.to_string(),
            scanned_count: 1,
            scanned_at,
            scanned_by: scanned_by.to_string(),
            remarks,
        }
    }
}
