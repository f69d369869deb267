//! Scan-session state machine
//!
//! The session moves strictly forward: RESET opens a fresh batch window,
//! the first resolvable code becomes the batch (MUF) code, the next
//! distinct code becomes the template, and from then on only scans
//! matching the template are recorded. Codes containing a letter are staff
//! badges and are delegated to the staff directory without touching batch
//! state. RESET is the only way back.
//!
//! Every accepted TEMPLATE/SCAN event is written twice: one synchronous
//! attempt against the central database, then an unconditional append to
//! the local store tagged with the attempt's outcome. The operator-facing
//! feedback is identical either way; only validation failures raise the
//! error pattern.

use chrono::{Local, NaiveDateTime};
use packline_common::config::StationConfig;
use packline_common::record::{BatchReference, OutputRecord, Remark};
use packline_common::{is_reset_code, normalize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::indicator::IndicatorHandle;
use crate::staff::{StaffDirectory, StaffStatus};
use crate::store::RecordStore;
use crate::uplink::{RecordWriter, ReferenceLookup};

/// Why a scan was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Scan arrived before any RESET
    NoBatchOpen,
    /// Batch code not present in the reference table
    UnknownBatch,
    /// Reference lookup could not reach the database
    LookupFailed,
    /// The batch code was scanned again where the template belongs
    DuplicateTemplate,
    /// Carton does not match the template
    TemplateMismatch,
    /// Badge not in the staff directory
    InvalidStaff,
    /// Staff directory unreachable
    StaffUnavailable,
}

/// Result of processing one admitted scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    Reset,
    BatchOpened(String),
    TemplateSet(String),
    Recorded,
    StaffIn(String),
    StaffOut(String),
    Rejected(Rejection),
}

/// Mutable state of one scanning station
#[derive(Debug, Default)]
pub struct ScanSession {
    batch_started: bool,
    muf_no: Option<String>,
    reference: Option<BatchReference>,
    template_code: Option<String>,
    /// Clocked-in operator; independent lifecycle, survives RESET
    operator: Option<String>,
}

impl ScanSession {
    pub fn batch_started(&self) -> bool {
        self.batch_started
    }

    pub fn muf_no(&self) -> Option<&str> {
        self.muf_no.as_deref()
    }

    pub fn template_code(&self) -> Option<&str> {
        self.template_code.as_deref()
    }

    pub fn operator(&self) -> Option<&str> {
        self.operator.as_deref()
    }

    fn reset(&mut self) {
        self.batch_started = true;
        self.muf_no = None;
        self.reference = None;
        self.template_code = None;
    }
}

/// One scanning station: session state plus its collaborators
pub struct Station {
    cfg: StationConfig,
    session: ScanSession,
    lookup: Arc<dyn ReferenceLookup>,
    writer: Arc<dyn RecordWriter>,
    staff: Arc<dyn StaffDirectory>,
    store: Arc<RecordStore>,
    indicator: IndicatorHandle,
}

impl Station {
    pub fn new(
        cfg: StationConfig,
        lookup: Arc<dyn ReferenceLookup>,
        writer: Arc<dyn RecordWriter>,
        staff: Arc<dyn StaffDirectory>,
        store: Arc<RecordStore>,
        indicator: IndicatorHandle,
    ) -> Station {
        Station {
            cfg,
            session: ScanSession::default(),
            lookup,
            writer,
            staff,
            store,
            indicator,
        }
    }

    pub fn session(&self) -> &ScanSession {
        &self.session
    }

    /// Process one admitted scan at the current wall-clock time.
    pub async fn handle_scan(&mut self, raw: &str) -> ScanOutcome {
        self.handle_scan_at(raw, Local::now().naive_local()).await
    }

    /// Process one admitted scan with an explicit timestamp.
    pub async fn handle_scan_at(&mut self, raw: &str, now: NaiveDateTime) -> ScanOutcome {
        let code = normalize(raw);
        debug!(raw, code = %code, "scan admitted");

        if is_reset_code(raw, &self.cfg.reset_codes) {
            self.session.reset();
            self.indicator.session_reset();
            info!("session reset: new batch window open");
            return ScanOutcome::Reset;
        }

        // badges contain letters; batch and carton codes never do
        if code.chars().any(|c| c.is_alphabetic()) {
            return self.handle_staff(&code).await;
        }

        if !self.session.batch_started {
            warn!(code = %code, "scan before reset rejected");
            self.indicator.raise_alert();
            return ScanOutcome::Rejected(Rejection::NoBatchOpen);
        }

        if self.session.muf_no.is_none() {
            return match self.lookup.lookup_batch(&code).await {
                Ok(Some(reference)) => {
                    info!(muf_no = %code, "batch acquired");
                    self.session.muf_no = Some(code.clone());
                    self.session.reference = Some(reference);
                    // ready lamp keeps blinking until the template is set
                    ScanOutcome::BatchOpened(code)
                }
                Ok(None) => {
                    warn!(muf_no = %code, "batch code not found");
                    self.indicator.raise_alert();
                    ScanOutcome::Rejected(Rejection::UnknownBatch)
                }
                Err(e) => {
                    warn!(muf_no = %code, "batch lookup failed: {}", e);
                    self.indicator.raise_alert();
                    ScanOutcome::Rejected(Rejection::LookupFailed)
                }
            };
        }

        if self.session.template_code.is_none() {
            if Some(code.as_str()) == self.session.muf_no.as_deref() {
                warn!(code = %code, "batch code scanned where template belongs");
                self.indicator.raise_alert();
                return ScanOutcome::Rejected(Rejection::DuplicateTemplate);
            }
            self.session.template_code = Some(code.clone());
            info!(template = %code, "template set");
            // record first, then hold the ready lamp solid
            self.record(&code, Remark::Template, now).await;
            self.indicator.template_set();
            return ScanOutcome::TemplateSet(code);
        }

        if Some(code.as_str()) != self.session.template_code.as_deref() {
            warn!(
                code = %code,
                template = self.session.template_code.as_deref().unwrap_or(""),
                "carton mismatch"
            );
            self.indicator.raise_alert();
            return ScanOutcome::Rejected(Rejection::TemplateMismatch);
        }

        let template = self.session.template_code.clone().unwrap_or(code);
        self.record(&template, Remark::Scan, now).await;
        ScanOutcome::Recorded
    }

    /// Dual-write one accepted scan: remote attempt first, local append
    /// always, tagged with the attempt's outcome.
    async fn record(&mut self, code: &str, remarks: Remark, now: NaiveDateTime) {
        let Some(reference) = self.session.reference.as_ref() else {
            // template can only be set after a batch is open
            warn!("record requested without batch reference");
            return;
        };
        let scanned_by = self
            .session
            .operator
            .as_deref()
            .unwrap_or(&self.cfg.device_id);
        let record =
            OutputRecord::for_scan(reference, &self.cfg.line, code, scanned_by, now, remarks);

        let uploaded = match self.writer.write_record(&record).await {
            Ok(()) => {
                debug!(remarks = %remarks, "record inserted remotely");
                true
            }
            Err(e) => {
                debug!(remarks = %remarks, "remote insert failed, caching locally: {}", e);
                false
            }
        };

        if let Err(e) = self.store.append(&record, uploaded) {
            // durability fallback is gone: loud, and distinct from rejections
            warn!("LOCAL CACHE UNAVAILABLE, record not persisted locally: {}", e);
        }
    }

    /// Staff badge side-channel: validate, then toggle IN/OUT. Never
    /// touches batch state beyond the operator field.
    async fn handle_staff(&mut self, code: &str) -> ScanOutcome {
        let profile = match self.staff.validate(code).await {
            Ok(Some(profile)) => profile,
            Ok(None) => {
                warn!(staff_id = %code, "unknown or ambiguous staff id");
                self.indicator.raise_alert();
                return ScanOutcome::Rejected(Rejection::InvalidStaff);
            }
            Err(e) => {
                warn!(staff_id = %code, "staff validation failed: {}", e);
                self.indicator.raise_alert();
                return ScanOutcome::Rejected(Rejection::StaffUnavailable);
            }
        };

        match self.staff.toggle(&profile, &self.cfg.line).await {
            Ok(StaffStatus::In) => {
                info!(staff_id = %code, name = %profile.name, "operator clocked IN");
                self.session.operator = Some(code.to_string());
                self.indicator.identity_ok();
                ScanOutcome::StaffIn(code.to_string())
            }
            Ok(StaffStatus::Out) => {
                info!(staff_id = %code, name = %profile.name, "operator clocked OUT");
                if self.session.operator.as_deref() == Some(code) {
                    self.session.operator = None;
                }
                self.indicator.identity_ok();
                ScanOutcome::StaffOut(code.to_string())
            }
            Err(e) => {
                warn!(staff_id = %code, "staff toggle failed: {}", e);
                self.indicator.raise_alert();
                ScanOutcome::Rejected(Rejection::StaffUnavailable)
            }
        }
    }
}
