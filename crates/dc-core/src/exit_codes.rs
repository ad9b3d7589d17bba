//! Exit codes for the dc-core CLI.
//!
//! Exit code ranges:
//! - 0-6: Operational outcomes (parse the outcome from the code, not output)
//! - 10-19: User/environment errors (recoverable by user action)
//! - 20-29: Internal errors

use dc_common::{Error, ErrorCategory};

/// Exit codes for dc-core operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Run completed, no accepted cycles.
    Clean = 0,

    /// Run completed and at least one cycle was accepted.
    CyclesFound = 1,

    /// Some series failed; the others were written.
    PartialFail = 3,

    /// Run interrupted by cancellation.
    Interrupted = 6,

    /// Invalid arguments.
    ArgsError = 10,

    /// Detector configuration missing or invalid.
    ConfigError = 11,

    /// Input data unusable (missing attribute, unordered series).
    InputError = 12,

    /// Internal error.
    InternalError = 20,

    /// I/O error reading sources or writing sinks.
    IoError = 21,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Codes 0 and 1.
    pub fn is_success(self) -> bool {
        matches!(self, ExitCode::Clean | ExitCode::CyclesFound)
    }

    pub fn is_operational(self) -> bool {
        (self as i32) < 10
    }

    pub fn is_user_error(self) -> bool {
        (10..20).contains(&(self as i32))
    }

    pub fn is_internal_error(self) -> bool {
        (self as i32) >= 20
    }

    pub fn is_error(self) -> bool {
        (self as i32) >= 10
    }

    /// Stable name for JSON output.
    pub fn code_name(&self) -> &'static str {
        match self {
            ExitCode::Clean => "OK_CLEAN",
            ExitCode::CyclesFound => "OK_CYCLES",
            ExitCode::PartialFail => "ERR_PARTIAL",
            ExitCode::Interrupted => "ERR_INTERRUPTED",
            ExitCode::ArgsError => "ERR_ARGS",
            ExitCode::ConfigError => "ERR_CONFIG",
            ExitCode::InputError => "ERR_INPUT",
            ExitCode::InternalError => "ERR_INTERNAL",
            ExitCode::IoError => "ERR_IO",
        }
    }

    /// Exit code for a run-level failure.
    pub fn from_error(err: &Error) -> Self {
        match (err, err.category()) {
            (Error::Cancelled { .. }, _) => ExitCode::Interrupted,
            (Error::MissingAttribute { .. }, _) => ExitCode::InputError,
            (_, ErrorCategory::Config) => ExitCode::ConfigError,
            (_, ErrorCategory::Segmentation) => ExitCode::InputError,
            (_, ErrorCategory::Io) => ExitCode::IoError,
            (_, ErrorCategory::Control) => ExitCode::InternalError,
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code_name(), self.as_i32())
    }
}
