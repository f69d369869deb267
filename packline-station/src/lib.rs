//! # Packline Station
//!
//! Scanning-station service for the Packline production tracker: reads
//! barcode scans from a wedge scanner, drives the scan-session state
//! machine, records accepted scans both centrally and locally, and runs
//! the indicator stack and the upload reconciler.

pub mod dispatch;
pub mod indicator;
pub mod input;
pub mod reconciler;
pub mod session;
pub mod staff;
pub mod store;
pub mod supervise;
pub mod uplink;
