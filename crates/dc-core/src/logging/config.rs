//! Log level and format resolution.
//!
//! Precedence, highest first:
//! 1. `--log-level` / `--log-format`
//! 2. `DC_LOG` / `DC_LOG_FORMAT`
//! 3. the `dc_core` directive of `RUST_LOG`, or a bare level in it
//! 4. info, human
//!
//! `DC_LOG_TIMESTAMPS=0` drops timestamps from human output.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

pub const ENV_LOG: &str = "DC_LOG";
pub const ENV_LOG_FORMAT: &str = "DC_LOG_FORMAT";
pub const ENV_LOG_TIMESTAMPS: &str = "DC_LOG_TIMESTAMPS";
pub const ENV_RUST_LOG: &str = "RUST_LOG";

/// Target every engine event is emitted under.
const LOG_TARGET: &str = "dc_core";

/// Log output format on stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    #[value(alias = "console")]
    Human,
    /// One JSON object per event.
    #[value(alias = "json")]
    Jsonl,
}

/// Verbosity of the engine's events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Merge decisions and dropped samples.
    Trace,
    Debug,
    #[default]
    Info,
    #[value(alias = "warning")]
    Warn,
    Error,
    #[value(alias = "quiet")]
    Off,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Off => "off",
        }
    }

    fn parse(value: &str) -> Option<LogLevel> {
        <LogLevel as ValueEnum>::from_str(value.trim(), true).ok()
    }
}

/// Resolved logging settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub format: LogFormat,
    pub level: LogLevel,
    pub timestamps: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            format: LogFormat::Human,
            level: LogLevel::Info,
            timestamps: true,
        }
    }
}

impl LogConfig {
    /// Resolve from the process environment and CLI flags.
    pub fn from_env(cli_level: Option<LogLevel>, cli_format: Option<LogFormat>) -> Self {
        LogConfig::resolve(|name| std::env::var(name).ok(), cli_level, cli_format)
    }

    /// Resolve against an arbitrary variable lookup.
    ///
    /// Unparseable values are skipped, so the next source in line applies.
    pub fn resolve(
        lookup: impl Fn(&str) -> Option<String>,
        cli_level: Option<LogLevel>,
        cli_format: Option<LogFormat>,
    ) -> Self {
        let defaults = LogConfig::default();

        let level = cli_level
            .or_else(|| lookup(ENV_LOG).and_then(|v| LogLevel::parse(&v)))
            .or_else(|| lookup(ENV_RUST_LOG).and_then(|v| rust_log_level(&v)))
            .unwrap_or(defaults.level);

        let format = cli_format
            .or_else(|| {
                lookup(ENV_LOG_FORMAT)
                    .and_then(|v| <LogFormat as ValueEnum>::from_str(v.trim(), true).ok())
            })
            .unwrap_or(defaults.format);

        let timestamps = lookup(ENV_LOG_TIMESTAMPS)
            .map(|v| !matches!(v.trim().to_lowercase().as_str(), "0" | "false" | "off" | "no"))
            .unwrap_or(defaults.timestamps);

        LogConfig {
            format,
            level,
            timestamps,
        }
    }

    /// `EnvFilter` directive for the resolved level.
    pub fn filter_directive(&self) -> String {
        format!("{}={}", LOG_TARGET, self.level.as_str())
    }
}

/// Level `RUST_LOG` grants the engine: its `dc_core` directive if present,
/// otherwise its bare default level.
fn rust_log_level(spec: &str) -> Option<LogLevel> {
    let mut bare = None;
    for directive in spec.split(',').map(str::trim) {
        match directive.split_once('=') {
            Some((target, level)) => {
                let ours = target == LOG_TARGET || target.starts_with("dc_core::");
                if ours {
                    if let Some(level) = LogLevel::parse(level) {
                        return Some(level);
                    }
                }
            }
            None => bare = bare.or_else(|| LogLevel::parse(directive)),
        }
    }
    bare
}
