//! Structured logging for dc-core.
//!
//! Provides dual-mode logging:
//! - Human-readable console output for interactive use
//! - Machine-parseable JSONL for batch jobs
//!
//! # Usage
//!
//! ```ignore
//! use dc_core::logging::{init_logging, LogConfig, LogContext, Stage, event_names};
//!
//! let config = LogConfig::from_env(None, None);
//! init_logging(&config);
//!
//! let ctx = LogContext::new(RunId::new()).with_series("veh-7");
//! log_event!(ctx, INFO, event_names::SERIES_STARTED, Stage::Load, "series started");
//! ```
//!
//! stdout is reserved for command payloads; all log output goes to stderr.

pub mod config;
pub mod events;

pub use config::{LogConfig, LogFormat, LogLevel};
pub use events::{event_names, Stage};

use dc_common::RunId;
use std::io::IsTerminal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the logging subsystem.
///
/// Call once at startup. A second call leaves the first subscriber in place.
/// The filter comes from the resolved [`LogConfig`] only, so `RUST_LOG`
/// never overrides `--log-level` or `DC_LOG`.
pub fn init_logging(config: &LogConfig) {
    let filter = EnvFilter::new(config.filter_directive());

    let result = match config.format {
        LogFormat::Human => {
            let use_ansi = std::io::stderr().is_terminal();
            let fmt_layer = fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_ansi(use_ansi);

            if config.timestamps {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt_layer)
                    .try_init()
            } else {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt_layer.without_time())
                    .try_init()
            }
        }
        LogFormat::Jsonl => {
            let jsonl_layer = fmt::layer()
                .json()
                .flatten_event(true)
                .with_current_span(false)
                .with_writer(std::io::stderr);
            tracing_subscriber::registry()
                .with(filter)
                .with(jsonl_layer)
                .try_init()
        }
    };

    if result.is_err() {
        tracing::debug!("logging already initialized");
    }
}

/// Correlation ids stamped on every structured event.
#[derive(Debug, Clone)]
pub struct LogContext {
    pub run_id: RunId,
    pub series: Option<String>,
}

impl LogContext {
    pub fn new(run_id: RunId) -> Self {
        LogContext {
            run_id,
            series: None,
        }
    }

    pub fn with_series(&self, series: impl Into<String>) -> Self {
        LogContext {
            run_id: self.run_id.clone(),
            series: Some(series.into()),
        }
    }
}

/// Structured event logging with context.
///
/// ```ignore
/// log_event!(ctx, INFO, event_names::SERIES_FINISHED, Stage::Classify,
///     "series finished", accepted = 3, discarded = 1);
/// ```
#[macro_export]
macro_rules! log_event {
    ($ctx:expr, INFO, $event:expr, $stage:expr, $msg:expr $(, $key:ident = $val:expr)*) => {
        tracing::info!(
            event = $event,
            run_id = %$ctx.run_id,
            series = ?$ctx.series,
            stage = %$stage,
            $($key = $val,)*
            "{}", $msg
        )
    };
    ($ctx:expr, DEBUG, $event:expr, $stage:expr, $msg:expr $(, $key:ident = $val:expr)*) => {
        tracing::debug!(
            event = $event,
            run_id = %$ctx.run_id,
            series = ?$ctx.series,
            stage = %$stage,
            $($key = $val,)*
            "{}", $msg
        )
    };
    ($ctx:expr, WARN, $event:expr, $stage:expr, $msg:expr $(, $key:ident = $val:expr)*) => {
        tracing::warn!(
            event = $event,
            run_id = %$ctx.run_id,
            series = ?$ctx.series,
            stage = %$stage,
            $($key = $val,)*
            "{}", $msg
        )
    };
    ($ctx:expr, ERROR, $event:expr, $stage:expr, $msg:expr $(, $key:ident = $val:expr)*) => {
        tracing::error!(
            event = $event,
            run_id = %$ctx.run_id,
            series = ?$ctx.series,
            stage = %$stage,
            $($key = $val,)*
            "{}", $msg
        )
    };
}
