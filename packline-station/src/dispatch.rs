//! Duplicate-scan suppression
//!
//! Barcode scanners can emit duplicate trigger pulses, so the dispatcher
//! drops repeats before they reach the session state machine: a suppressed
//! scan never transitions state and never toggles a lamp.
//!
//! Two windows apply. Carton and batch codes are suppressed when the exact
//! same raw text repeats within a short window (default 2s). Staff badge
//! codes (anything containing a letter) get a much longer per-identity
//! window (default 60s) keyed by the normalized code, so one operator
//! cannot clock IN and straight back OUT off a double pulse.

use packline_common::normalize;
use std::collections::HashMap;
use std::time::{Duration, Instant};

pub struct Dispatcher {
    scan_window: Duration,
    staff_window: Duration,
    last_raw: Option<String>,
    last_at: Option<Instant>,
    staff_last: HashMap<String, Instant>,
}

impl Dispatcher {
    pub fn new(scan_window: Duration, staff_window: Duration) -> Dispatcher {
        Dispatcher {
            scan_window,
            staff_window,
            last_raw: None,
            last_at: None,
            staff_last: HashMap::new(),
        }
    }

    /// True when the scan should be processed; false drops it unconditionally.
    pub fn admit(&mut self, raw: &str) -> bool {
        self.admit_at(raw, Instant::now())
    }

    pub fn admit_at(&mut self, raw: &str, now: Instant) -> bool {
        let code = normalize(raw);
        if code.chars().any(|c| c.is_alphabetic()) {
            if let Some(&prev) = self.staff_last.get(&code) {
                if now.duration_since(prev) < self.staff_window {
                    return false;
                }
            }
            self.staff_last.insert(code, now);
            return true;
        }

        if let (Some(last_raw), Some(last_at)) = (self.last_raw.as_deref(), self.last_at) {
            if last_raw == raw && now.duration_since(last_at) < self.scan_window {
                return false;
            }
        }
        self.last_raw = Some(raw.to_string());
        self.last_at = Some(now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(Duration::from_secs(2), Duration::from_secs(60))
    }

    // carton codes are purely numeric; anything with a letter takes the
    // staff window instead
    #[test]
    fn repeat_within_window_is_dropped() {
        let mut d = dispatcher();
        let t0 = Instant::now();
        assert!(d.admit_at("555000111", t0));
        assert!(!d.admit_at("555000111", t0 + Duration::from_millis(500)));
        assert!(d.admit_at("555000111", t0 + Duration::from_millis(2500)));
    }

    #[test]
    fn different_raw_text_is_never_suppressed() {
        let mut d = dispatcher();
        let t0 = Instant::now();
        assert!(d.admit_at("555000111", t0));
        assert!(d.admit_at("555000222", t0 + Duration::from_millis(100)));
    }

    #[test]
    fn window_measured_from_last_admitted_scan() {
        let mut d = dispatcher();
        let t0 = Instant::now();
        assert!(d.admit_at("555000111", t0));
        // dropped scans do not slide the window forward
        assert!(!d.admit_at("555000111", t0 + Duration::from_millis(1500)));
        assert!(d.admit_at("555000111", t0 + Duration::from_millis(2100)));
    }

    #[test]
    fn lettered_code_takes_the_staff_window_not_the_scan_window() {
        let mut d = dispatcher();
        let t0 = Instant::now();
        assert!(d.admit_at("CTN-1", t0));
        // past the 2s carton window but inside the 60s identity window
        assert!(!d.admit_at("CTN-1", t0 + Duration::from_millis(2500)));
    }

    #[test]
    fn staff_codes_use_per_identity_window() {
        let mut d = dispatcher();
        let t0 = Instant::now();
        assert!(d.admit_at("OP-AA", t0));
        assert!(!d.admit_at("OP-AA", t0 + Duration::from_secs(10)));
        // a different operator is unaffected
        assert!(d.admit_at("OP-BB", t0 + Duration::from_secs(10)));
        assert!(d.admit_at("OP-AA", t0 + Duration::from_secs(61)));
    }

    #[test]
    fn staff_window_keys_on_normalized_code() {
        let mut d = dispatcher();
        let t0 = Instant::now();
        assert!(d.admit_at("op_aa", t0));
        assert!(!d.admit_at("OP-AA", t0 + Duration::from_secs(5)));
    }
}
