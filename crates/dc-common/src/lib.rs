//! Drive cycles common types, IDs, and errors.
//!
//! This crate provides foundational types shared across the dc-* crates:
//! - Telemetry samples and attribute values
//! - Time epochs and duration conversion
//! - Run and series identifiers
//! - CLI output formats
//! - The unified error type with stable codes

pub mod epoch;
pub mod error;
pub mod id;
pub mod output;
pub mod sample;

pub use epoch::TimeEpoch;
pub use error::{format_error_human, Error, ErrorCategory, Result, StructuredError};
pub use id::{RunId, SeriesKey};
pub use output::OutputFormat;
pub use sample::{FieldValue, Sample, INVALID_READING};

/// Schema version of emitted cycle points and diagnostics.
pub const SCHEMA_VERSION: &str = "1.0.0";
