//! Reconciler sweep tests over a real on-disk store

use async_trait::async_trait;
use chrono::NaiveDate;
use packline_common::record::{BatchReference, OutputRecord, Remark};
use packline_station::reconciler;
use packline_station::store::RecordStore;
use packline_station::uplink::{RecordWriter, UplinkError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

#[derive(Default)]
struct FlakyWriter {
    fail: AtomicBool,
    written: Mutex<Vec<OutputRecord>>,
}

#[async_trait]
impl RecordWriter for FlakyWriter {
    async fn write_record(&self, record: &OutputRecord) -> Result<(), UplinkError> {
        self.write_batch(std::slice::from_ref(record)).await
    }

    async fn write_batch(&self, records: &[OutputRecord]) -> Result<(), UplinkError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(UplinkError::Connection("refused".to_string()));
        }
        self.written.lock().unwrap().extend(records.iter().cloned());
        Ok(())
    }
}

fn record(muf_no: &str, code: &str) -> OutputRecord {
    let reference = BatchReference {
        muf_no: muf_no.to_string(),
        fg_no: "FG-77".to_string(),
        pack_per_ctn: Some(10),
        pack_per_hr: Some(600),
        qty_done: 1000,
    };
    let at = NaiveDate::from_ymd_opt(2026, 8, 30)
        .unwrap()
        .and_hms_opt(10, 0, 0)
        .unwrap();
    OutputRecord::for_scan(&reference, "HF6", code, "STN-01", at, Remark::Scan)
}

#[tokio::test]
async fn sweep_confirms_all_pending_rows() {
    let dir = tempfile::tempdir().unwrap();
    let store = RecordStore::open(dir.path());
    for _ in 0..3 {
        store.append(&record("MUF-1", "CTN-A"), false).unwrap();
    }
    store.append(&record("MUF-1", "CTN-A"), true).unwrap();

    let writer = FlakyWriter::default();
    let confirmed = reconciler::cycle(&store, &writer).await.unwrap();
    assert_eq!(confirmed, 3);
    assert_eq!(writer.written.lock().unwrap().len(), 3);

    // everything is confirmed now; a second sweep replays nothing
    let confirmed = reconciler::cycle(&store, &writer).await.unwrap();
    assert_eq!(confirmed, 0);
    assert_eq!(writer.written.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn failed_sweep_leaves_rows_pending() {
    let dir = tempfile::tempdir().unwrap();
    let store = RecordStore::open(dir.path());
    store.append(&record("MUF-1", "CTN-A"), false).unwrap();
    store.append(&record("MUF-1", "CTN-A"), false).unwrap();

    let writer = FlakyWriter::default();
    writer.fail.store(true, Ordering::SeqCst);
    let confirmed = reconciler::cycle(&store, &writer).await.unwrap();
    assert_eq!(confirmed, 0);

    // next sweep after recovery confirms both, no rows lost
    writer.fail.store(false, Ordering::SeqCst);
    let confirmed = reconciler::cycle(&store, &writer).await.unwrap();
    assert_eq!(confirmed, 2);
    assert_eq!(writer.written.lock().unwrap().len(), 2);

    let containers = store.containers().unwrap();
    assert!(store.pending_rows(&containers[0]).unwrap().is_empty());
}

#[tokio::test]
async fn sweep_walks_every_container() {
    let dir = tempfile::tempdir().unwrap();
    let store = RecordStore::open(dir.path());
    store.append(&record("MUF-1", "CTN-A"), false).unwrap();
    store.append(&record("MUF-2", "CTN-B"), false).unwrap();

    let writer = FlakyWriter::default();
    let confirmed = reconciler::cycle(&store, &writer).await.unwrap();
    assert_eq!(confirmed, 2);

    let mufs: Vec<String> = writer
        .written
        .lock()
        .unwrap()
        .iter()
        .map(|r| r.muf_no.clone())
        .collect();
    assert!(mufs.contains(&"MUF-1".to_string()));
    assert!(mufs.contains(&"MUF-2".to_string()));
}

#[tokio::test]
async fn bad_container_does_not_abort_sweep() {
    let dir = tempfile::tempdir().unwrap();
    let store = RecordStore::open(dir.path());
    // sorts before the good container and cannot be read as a container
    std::fs::create_dir(dir.path().join("AAA.csv")).unwrap();
    store.append(&record("MUF-1", "CTN-A"), false).unwrap();

    let writer = FlakyWriter::default();
    let confirmed = reconciler::cycle(&store, &writer).await.unwrap();
    assert_eq!(confirmed, 1);
    assert_eq!(writer.written.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn new_appends_between_sweeps_are_picked_up() {
    let dir = tempfile::tempdir().unwrap();
    let store = RecordStore::open(dir.path());
    store.append(&record("MUF-1", "CTN-A"), false).unwrap();

    let writer = FlakyWriter::default();
    assert_eq!(reconciler::cycle(&store, &writer).await.unwrap(), 1);

    store.append(&record("MUF-1", "CTN-A"), false).unwrap();
    assert_eq!(reconciler::cycle(&store, &writer).await.unwrap(), 1);
    assert_eq!(writer.written.lock().unwrap().len(), 2);
}
