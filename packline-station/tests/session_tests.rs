//! Scan-session integration tests with in-memory collaborators

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use packline_common::config::StationConfig;
use packline_common::record::{BatchReference, OutputRecord, Remark};
use packline_station::indicator::IndicatorHandle;
use packline_station::session::{Rejection, ScanOutcome, Station};
use packline_station::staff::{StaffDirectory, StaffProfile, StaffStatus};
use packline_station::store::RecordStore;
use packline_station::uplink::{RecordWriter, ReferenceLookup, UplinkError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

struct FakeLookup {
    batches: HashMap<String, BatchReference>,
    unreachable: AtomicBool,
}

impl FakeLookup {
    fn with_batch(muf_no: &str) -> FakeLookup {
        let mut batches = HashMap::new();
        batches.insert(
            muf_no.to_string(),
            BatchReference {
                muf_no: muf_no.to_string(),
                fg_no: "FG-77".to_string(),
                pack_per_ctn: Some(10),
                pack_per_hr: Some(600),
                qty_done: 1000,
            },
        );
        FakeLookup {
            batches,
            unreachable: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl ReferenceLookup for FakeLookup {
    async fn lookup_batch(&self, code: &str) -> Result<Option<BatchReference>, UplinkError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(UplinkError::Timeout);
        }
        Ok(self.batches.get(code).cloned())
    }
}

#[derive(Default)]
struct FakeWriter {
    fail: AtomicBool,
    written: Mutex<Vec<OutputRecord>>,
}

#[async_trait]
impl RecordWriter for FakeWriter {
    async fn write_record(&self, record: &OutputRecord) -> Result<(), UplinkError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(UplinkError::Connection("refused".to_string()));
        }
        self.written.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn write_batch(&self, records: &[OutputRecord]) -> Result<(), UplinkError> {
        for record in records {
            self.write_record(record).await?;
        }
        Ok(())
    }
}

struct FakeStaff {
    known: Vec<String>,
    unreachable: AtomicBool,
    clocked_in: Mutex<HashMap<String, bool>>,
}

impl FakeStaff {
    fn with_ids(ids: &[&str]) -> FakeStaff {
        FakeStaff {
            known: ids.iter().map(|s| s.to_string()).collect(),
            unreachable: AtomicBool::new(false),
            clocked_in: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl StaffDirectory for FakeStaff {
    async fn validate(&self, staff_id: &str) -> Result<Option<StaffProfile>, UplinkError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(UplinkError::Timeout);
        }
        Ok(self
            .known
            .iter()
            .find(|id| id.as_str() == staff_id)
            .map(|id| StaffProfile {
                staff_id: id.clone(),
                name: "Operator".to_string(),
                position: "packer".to_string(),
                department: "packing".to_string(),
                factory: "m3".to_string(),
            }))
    }

    async fn toggle(
        &self,
        profile: &StaffProfile,
        _line: &str,
    ) -> Result<StaffStatus, UplinkError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(UplinkError::Timeout);
        }
        let mut state = self.clocked_in.lock().unwrap();
        let entry = state.entry(profile.staff_id.clone()).or_insert(false);
        *entry = !*entry;
        Ok(if *entry { StaffStatus::In } else { StaffStatus::Out })
    }
}

struct Rig {
    station: Station,
    writer: Arc<FakeWriter>,
    lookup: Arc<FakeLookup>,
    staff: Arc<FakeStaff>,
    store: Arc<RecordStore>,
    indicator: IndicatorHandle,
    _dir: tempfile::TempDir,
}

fn rig() -> Rig {
    let dir = tempfile::tempdir().unwrap();
    let lookup = Arc::new(FakeLookup::with_batch("100200300"));
    let writer = Arc::new(FakeWriter::default());
    let staff = Arc::new(FakeStaff::with_ids(&["OP-7"]));
    let store = Arc::new(RecordStore::open(dir.path()));
    let indicator = IndicatorHandle::detached();
    let cfg = StationConfig::default();
    let station = Station::new(
        cfg,
        lookup.clone(),
        writer.clone(),
        staff.clone(),
        store.clone(),
        indicator.clone(),
    );
    Rig {
        station,
        writer,
        lookup,
        staff,
        store,
        indicator,
        _dir: dir,
    }
}

fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 8, 30)
        .unwrap()
        .and_hms_opt(h, m, s)
        .unwrap()
}

#[tokio::test]
async fn happy_path_reset_muf_template_scans() {
    let mut r = rig();

    assert_eq!(r.station.handle_scan_at("123456789", at(8, 0, 0)).await, ScanOutcome::Reset);
    assert_eq!(
        r.station.handle_scan_at("100200300", at(8, 0, 5)).await,
        ScanOutcome::BatchOpened("100200300".to_string())
    );
    assert_eq!(
        r.station.handle_scan_at("555000111", at(8, 0, 10)).await,
        ScanOutcome::TemplateSet("555000111".to_string())
    );
    assert_eq!(r.station.handle_scan_at("555000111", at(8, 0, 20)).await, ScanOutcome::Recorded);
    assert_eq!(r.station.handle_scan_at("555000111", at(8, 0, 30)).await, ScanOutcome::Recorded);

    let written = r.writer.written.lock().unwrap();
    assert_eq!(written.len(), 3);
    assert_eq!(written[0].remarks, Remark::Template);
    assert_eq!(written[1].remarks, Remark::Scan);
    assert_eq!(written[0].muf_no, "100200300");
    assert_eq!(written[0].scanned_code, "555000111");
    assert!(!r.indicator.alert_active());
}

#[tokio::test]
async fn mismatched_carton_is_rejected_and_raises_alert() {
    let mut r = rig();
    r.station.handle_scan_at("123456789", at(8, 0, 0)).await;
    r.station.handle_scan_at("100200300", at(8, 0, 5)).await;
    r.station.handle_scan_at("555000111", at(8, 0, 10)).await;

    let outcome = r.station.handle_scan_at("999999999", at(8, 0, 20)).await;
    assert_eq!(outcome, ScanOutcome::Rejected(Rejection::TemplateMismatch));
    assert!(r.indicator.alert_active());

    // mismatches are never recorded anywhere; only the TEMPLATE row exists
    assert_eq!(r.writer.written.lock().unwrap().len(), 1);
    assert_eq!(r.writer.written.lock().unwrap()[0].remarks, Remark::Template);
    let containers = r.store.containers().unwrap();
    let pending = r.store.pending_rows(&containers[0]).unwrap();
    assert!(pending.is_empty());
}

#[tokio::test]
async fn template_is_forward_only_until_reset() {
    let mut r = rig();
    r.station.handle_scan_at("123456789", at(8, 0, 0)).await;
    r.station.handle_scan_at("100200300", at(8, 0, 5)).await;
    r.station.handle_scan_at("555000111", at(8, 0, 10)).await;

    // rejection does not replace the template
    r.station.handle_scan_at("999999999", at(8, 0, 20)).await;
    assert_eq!(r.station.session().template_code(), Some("555000111"));
    assert_eq!(r.station.handle_scan_at("555000111", at(8, 0, 30)).await, ScanOutcome::Recorded);

    // only RESET clears it
    assert_eq!(r.station.handle_scan_at("123456789", at(8, 1, 0)).await, ScanOutcome::Reset);
    assert_eq!(r.station.session().template_code(), None);
    assert_eq!(r.station.session().muf_no(), None);
}

#[tokio::test]
async fn scan_before_reset_is_rejected() {
    let mut r = rig();
    let outcome = r.station.handle_scan_at("100200300", at(8, 0, 0)).await;
    assert_eq!(outcome, ScanOutcome::Rejected(Rejection::NoBatchOpen));
    assert!(r.indicator.alert_active());
}

#[tokio::test]
async fn unknown_batch_keeps_muf_stage_open() {
    let mut r = rig();
    r.station.handle_scan_at("123456789", at(8, 0, 0)).await;

    let outcome = r.station.handle_scan_at("444444444", at(8, 0, 5)).await;
    assert_eq!(outcome, ScanOutcome::Rejected(Rejection::UnknownBatch));
    assert_eq!(r.station.session().muf_no(), None);

    // a known code still opens the batch afterwards
    assert_eq!(
        r.station.handle_scan_at("100200300", at(8, 0, 10)).await,
        ScanOutcome::BatchOpened("100200300".to_string())
    );
}

#[tokio::test]
async fn unreachable_lookup_is_a_distinct_rejection() {
    let r = rig();
    r.lookup.unreachable.store(true, Ordering::SeqCst);
    let mut station = r.station;
    station.handle_scan_at("123456789", at(8, 0, 0)).await;
    let outcome = station.handle_scan_at("100200300", at(8, 0, 5)).await;
    assert_eq!(outcome, ScanOutcome::Rejected(Rejection::LookupFailed));
}

#[tokio::test]
async fn batch_code_rescanned_as_template_is_rejected() {
    let mut r = rig();
    r.station.handle_scan_at("123456789", at(8, 0, 0)).await;
    r.station.handle_scan_at("100200300", at(8, 0, 5)).await;

    let outcome = r.station.handle_scan_at("100200300", at(8, 0, 10)).await;
    assert_eq!(outcome, ScanOutcome::Rejected(Rejection::DuplicateTemplate));
    assert_eq!(r.station.session().template_code(), None);
}

#[tokio::test]
async fn dash_variants_match_the_template() {
    let mut r = rig();
    r.station.handle_scan_at("123456789", at(8, 0, 0)).await;
    r.station.handle_scan_at("100200300", at(8, 0, 5)).await;
    // template captured with an underscore, matched with a unicode hyphen
    r.station.handle_scan_at("555_000", at(8, 0, 10)).await;
    assert_eq!(
        r.station.handle_scan_at("555\u{2013}000", at(8, 0, 20)).await,
        ScanOutcome::Recorded
    );
}

#[tokio::test]
async fn remote_failure_still_appends_locally_as_pending() {
    let mut r = rig();
    r.station.handle_scan_at("123456789", at(8, 0, 0)).await;
    r.station.handle_scan_at("100200300", at(8, 0, 5)).await;
    r.station.handle_scan_at("555000111", at(8, 0, 10)).await;

    r.writer.fail.store(true, Ordering::SeqCst);
    assert_eq!(r.station.handle_scan_at("555000111", at(8, 0, 20)).await, ScanOutcome::Recorded);
    assert_eq!(r.station.handle_scan_at("555000111", at(8, 0, 30)).await, ScanOutcome::Recorded);

    // the template row was uploaded; the two offline scans are pending
    let containers = r.store.containers().unwrap();
    assert_eq!(containers.len(), 1);
    let pending = r.store.pending_rows(&containers[0]).unwrap();
    assert_eq!(pending.len(), 2);
    assert!(pending.iter().all(|p| p.record.remarks == Remark::Scan));
    assert_eq!(r.writer.written.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn staff_badge_toggles_operator_and_tags_records() {
    let mut r = rig();
    r.station.handle_scan_at("123456789", at(8, 0, 0)).await;

    assert_eq!(
        r.station.handle_scan_at("OP-7", at(8, 0, 2)).await,
        ScanOutcome::StaffIn("OP-7".to_string())
    );
    assert_eq!(r.station.session().operator(), Some("OP-7"));

    r.station.handle_scan_at("100200300", at(8, 0, 5)).await;
    r.station.handle_scan_at("555000111", at(8, 0, 10)).await;
    assert_eq!(
        r.writer.written.lock().unwrap()[0].scanned_by,
        "OP-7".to_string()
    );

    assert_eq!(
        r.station.handle_scan_at("OP-7", at(9, 0, 0)).await,
        ScanOutcome::StaffOut("OP-7".to_string())
    );
    assert_eq!(r.station.session().operator(), None);

    // with nobody clocked in, records fall back to the device id
    r.station.handle_scan_at("555000111", at(9, 0, 10)).await;
    assert_eq!(
        r.writer.written.lock().unwrap()[1].scanned_by,
        StationConfig::default().device_id
    );
}

#[tokio::test]
async fn staff_badge_does_not_disturb_batch_state() {
    let mut r = rig();
    r.station.handle_scan_at("123456789", at(8, 0, 0)).await;
    r.station.handle_scan_at("100200300", at(8, 0, 5)).await;
    r.station.handle_scan_at("555000111", at(8, 0, 10)).await;

    r.station.handle_scan_at("OP-7", at(8, 0, 15)).await;
    assert_eq!(r.station.session().muf_no(), Some("100200300"));
    assert_eq!(r.station.session().template_code(), Some("555000111"));
    assert_eq!(r.station.handle_scan_at("555000111", at(8, 0, 20)).await, ScanOutcome::Recorded);
}

#[tokio::test]
async fn operator_survives_session_reset() {
    let mut r = rig();
    r.station.handle_scan_at("123456789", at(8, 0, 0)).await;
    r.station.handle_scan_at("OP-7", at(8, 0, 2)).await;

    r.station.handle_scan_at("123456789", at(8, 30, 0)).await;
    assert_eq!(r.station.session().operator(), Some("OP-7"));
}

#[tokio::test]
async fn unknown_badge_is_rejected() {
    let mut r = rig();
    let outcome = r.station.handle_scan_at("OP-99", at(8, 0, 0)).await;
    assert_eq!(outcome, ScanOutcome::Rejected(Rejection::InvalidStaff));
    assert!(r.indicator.alert_active());
    assert_eq!(r.station.session().operator(), None);
}

#[tokio::test]
async fn unreachable_staff_directory_is_rejected() {
    let r = rig();
    r.staff.unreachable.store(true, Ordering::SeqCst);
    let mut station = r.station;
    let outcome = station.handle_scan_at("OP-7", at(8, 0, 0)).await;
    assert_eq!(outcome, ScanOutcome::Rejected(Rejection::StaffUnavailable));
}
