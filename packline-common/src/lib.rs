//! # Packline Common Library
//!
//! Shared code for the Packline modules including:
//! - Barcode normalization
//! - Output record and batch reference data model
//! - Configuration loading
//! - Common error types

pub mod config;
pub mod error;
pub mod normalize;
pub mod record;

pub use error::{Error, Result};
pub use normalize::{is_reset_code, normalize};
