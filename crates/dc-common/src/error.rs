//! Error types for drive-cycle detection.
//!
//! Every error carries:
//! - a stable numeric code for machine parsing
//! - a category for grouping
//! - a recoverability hint for automation
//! - a remediation hint for humans
//!
//! # Agent-Facing Output
//!
//! Errors serialize to structured JSON:
//! ```json
//! {
//!   "code": 20,
//!   "category": "segmentation",
//!   "message": "sample at 90 arrived after sample at 120 in series 5",
//!   "recoverable": false,
//!   "context": { "series": "5", "previous_time": 120, "time": 90 }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::sample::Sample;

/// Result type alias for drive-cycle operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Detector configuration errors.
    Config,
    /// Errors raised while folding a sample stream.
    Segmentation,
    /// Sample source and sink failures.
    Io,
    /// Run control (cancellation).
    Control,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Config => write!(f, "config"),
            ErrorCategory::Segmentation => write!(f, "segmentation"),
            ErrorCategory::Io => write!(f, "io"),
            ErrorCategory::Control => write!(f, "control"),
        }
    }
}

/// Unified error type.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (10-19)
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid detector '{name}': {message}")]
    InvalidDetector { name: String, message: String },

    #[error("sample at {time} has no numeric '{field}' attribute")]
    MissingAttribute { field: String, time: i64 },

    // Segmentation errors (20-29)
    #[error(
        "sample at {} arrived after sample at {} in series {series}",
        .current.time,
        .previous.time
    )]
    OutOfOrderSample {
        series: String,
        previous: Box<Sample>,
        current: Box<Sample>,
    },

    #[error("negative duration: {later} precedes {earlier}")]
    NegativeDuration { earlier: i64, later: i64 },

    // Source / sink errors (30-39)
    #[error("sample source failed: {0}")]
    Source(String),

    #[error("cycle sink failed: {0}")]
    Sink(String),

    #[error("processing of series {series} was cancelled")]
    Cancelled { series: String },

    // I/O errors (60-69)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    // Internal errors (70-79)
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns the error code for this error type.
    ///
    /// Error codes are stable and grouped by category:
    /// - 10-19: Configuration errors
    /// - 20-29: Segmentation errors
    /// - 30-39: Source/sink/control errors
    /// - 60-69: I/O errors
    /// - 70-79: Internal errors
    pub fn code(&self) -> u32 {
        match self {
            Error::Config(_) => 10,
            Error::InvalidDetector { .. } => 11,
            Error::MissingAttribute { .. } => 12,
            Error::OutOfOrderSample { .. } => 20,
            Error::NegativeDuration { .. } => 21,
            Error::Source(_) => 30,
            Error::Sink(_) => 31,
            Error::Cancelled { .. } => 32,
            Error::Io(_) => 60,
            Error::Json(_) => 61,
            Error::Toml(_) => 62,
            Error::Internal(_) => 70,
        }
    }

    /// Returns the error category for grouping and filtering.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Config(_) | Error::InvalidDetector { .. } | Error::MissingAttribute { .. } => {
                ErrorCategory::Config
            }
            Error::OutOfOrderSample { .. } | Error::NegativeDuration { .. } => {
                ErrorCategory::Segmentation
            }
            Error::Cancelled { .. } | Error::Internal(_) => ErrorCategory::Control,
            Error::Source(_) | Error::Sink(_) | Error::Io(_) | Error::Json(_) | Error::Toml(_) => {
                ErrorCategory::Io
            }
        }
    }

    /// Returns whether retrying the same series could succeed.
    pub fn is_recoverable(&self) -> bool {
        match self {
            // Same config and same data fail the same way
            Error::Config(_) | Error::InvalidDetector { .. } | Error::MissingAttribute { .. } => {
                false
            }
            Error::OutOfOrderSample { .. } | Error::NegativeDuration { .. } => false,

            Error::Source(_) | Error::Sink(_) | Error::Io(_) => true,
            Error::Cancelled { .. } => true,
            Error::Json(_) | Error::Toml(_) | Error::Internal(_) => false,
        }
    }

    /// Returns a human-readable remediation hint.
    pub fn remediation(&self) -> &'static str {
        match self {
            Error::Config(_) | Error::InvalidDetector { .. } => {
                "Run 'dc-core config validate' to check the detector configuration."
            }
            Error::MissingAttribute { .. } => {
                "Include the attribute in the queried fields, or pick a preset whose predicates match the data."
            }
            Error::OutOfOrderSample { .. } | Error::NegativeDuration { .. } => {
                "Series must be sorted by time. Re-export the series ordered by time ascending."
            }
            Error::Source(_) => "Check that the input files exist and contain one JSON sample per line.",
            Error::Sink(_) | Error::Io(_) => {
                "Check disk space and permissions of the output location, then retry."
            }
            Error::Cancelled { .. } => "The series was cancelled; rerun it to produce cycles.",
            Error::Json(_) => "Invalid JSON. Check the offending line with 'jq .'.",
            Error::Toml(_) => "Invalid TOML in the detector configuration file.",
            Error::Internal(_) => "This is a bug. Please report it together with the failing input.",
        }
    }

    /// Returns a short headline for human-readable output.
    pub fn headline(&self) -> &'static str {
        match self {
            Error::Config(_) => "Configuration Error",
            Error::InvalidDetector { .. } => "Invalid Detector",
            Error::MissingAttribute { .. } => "Missing Attribute",
            Error::OutOfOrderSample { .. } => "Out-of-Order Sample",
            Error::NegativeDuration { .. } => "Negative Duration",
            Error::Source(_) => "Sample Source Error",
            Error::Sink(_) => "Cycle Sink Error",
            Error::Cancelled { .. } => "Cancelled",
            Error::Io(_) => "I/O Error",
            Error::Json(_) => "JSON Parse Error",
            Error::Toml(_) => "TOML Parse Error",
            Error::Internal(_) => "Internal Error",
        }
    }
}

/// Structured error response for JSON output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    /// Stable error code.
    pub code: u32,

    /// Error category for grouping.
    pub category: ErrorCategory,

    /// Human-readable error message.
    pub message: String,

    /// Whether the error is potentially recoverable.
    pub recoverable: bool,

    /// Additional structured context (series, times, field names).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,
}

impl From<&Error> for StructuredError {
    fn from(err: &Error) -> Self {
        let mut context = HashMap::new();

        match err {
            Error::OutOfOrderSample {
                series,
                previous,
                current,
            } => {
                context.insert("series".to_string(), serde_json::json!(series));
                context.insert("previous_time".to_string(), serde_json::json!(previous.time));
                context.insert("time".to_string(), serde_json::json!(current.time));
            }
            Error::MissingAttribute { field, time } => {
                context.insert("field".to_string(), serde_json::json!(field));
                context.insert("time".to_string(), serde_json::json!(time));
            }
            Error::InvalidDetector { name, .. } => {
                context.insert("detector".to_string(), serde_json::json!(name));
            }
            Error::Cancelled { series } => {
                context.insert("series".to_string(), serde_json::json!(series));
            }
            _ => {}
        }

        StructuredError {
            code: err.code(),
            category: err.category(),
            message: err.to_string(),
            recoverable: err.is_recoverable(),
            context,
        }
    }
}

impl StructuredError {
    /// Add additional context to the error.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(r#"{{"code":{},"error":"serialization_failed"}}"#, self.code)
        })
    }
}

/// Format an error for human-readable stderr output.
///
/// ```text
/// ✗ [Headline]
///   Reason: [Error message]
///   Fix: [Remediation hint]
/// ```
pub fn format_error_human(err: &Error, use_color: bool) -> String {
    let (red, cyan, reset) = if use_color {
        ("\x1b[31m", "\x1b[36m", "\x1b[0m")
    } else {
        ("", "", "")
    };

    format!(
        "{red}✗{reset} {headline}\n  Reason: {message}\n  {cyan}Fix:{reset} {remediation}",
        red = red,
        cyan = cyan,
        reset = reset,
        headline = err.headline(),
        message = err,
        remediation = err.remediation()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn out_of_order() -> Error {
        Error::OutOfOrderSample {
            series: "5".to_string(),
            previous: Box::new(Sample::new(120, "5")),
            current: Box::new(Sample::new(90, "5")),
        }
    }

    #[test]
    fn test_error_code() {
        assert_eq!(Error::Config("x".into()).code(), 10);
        assert_eq!(out_of_order().code(), 20);
        assert_eq!(Error::Cancelled { series: "1".into() }.code(), 32);
    }

    #[test]
    fn test_error_category() {
        assert_eq!(out_of_order().category(), ErrorCategory::Segmentation);
        assert_eq!(
            Error::MissingAttribute { field: "veh_speed".into(), time: 0 }.category(),
            ErrorCategory::Config
        );
        assert_eq!(Error::Sink("disk full".into()).category(), ErrorCategory::Io);
    }

    #[test]
    fn test_out_of_order_message_names_both_samples() {
        let msg = out_of_order().to_string();
        assert!(msg.contains("90"));
        assert!(msg.contains("120"));
        assert!(msg.contains("series 5"));
        assert!(!out_of_order().is_recoverable());
    }

    #[test]
    fn test_structured_error_context() {
        let structured = StructuredError::from(&out_of_order());
        assert_eq!(structured.code, 20);
        assert_eq!(structured.context.get("previous_time"), Some(&serde_json::json!(120)));
        assert_eq!(structured.context.get("time"), Some(&serde_json::json!(90)));

        let json = structured.to_json();
        assert!(json.contains(r#""category":"segmentation""#));
    }

    #[test]
    fn test_format_error_human() {
        let err = Error::MissingAttribute {
            field: "charger_accurrent".into(),
            time: 7,
        };
        let formatted = format_error_human(&err, false);
        assert!(formatted.contains("Missing Attribute"));
        assert!(formatted.contains("charger_accurrent"));
        assert!(formatted.contains("Fix:"));
    }
}
