//! Drive cycles detector configuration.
//!
//! This crate provides:
//! - Typed Rust structs for detector configuration files (TOML or JSON)
//! - Built-in presets for trips and charge cycles
//! - Config resolution (CLI → env → XDG → /etc → preset)
//! - Semantic validation
//! - Config snapshots for run telemetry

pub mod detector;
pub mod preset;
pub mod resolve;
pub mod snapshot;
pub mod validate;

use std::path::PathBuf;
use thiserror::Error;

use dc_common::TimeEpoch;

pub use detector::DetectorConfig;
pub use preset::{get_preset, list_presets, PresetError, PresetInfo, PresetName};
pub use resolve::{resolve_config, ConfigPath, ConfigSource};
pub use snapshot::ConfigSnapshot;
pub use validate::{validate_detector, ValidationError, ValidationResult};

/// Schema version for configuration files.
pub const CONFIG_SCHEMA_VERSION: &str = "1.0.0";

/// Errors raised while loading a detector configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {}", .path.display())]
    NotFound { path: PathBuf },

    #[error("Failed to read {}: {source}", .path.display())]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {}: {message}", .path.display())]
    ParseError { path: PathBuf, message: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Preset(#[from] PresetError),

    #[error("Failed to render config: {0}")]
    Serialize(String),
}

impl From<ConfigError> for dc_common::Error {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation(inner) => dc_common::Error::InvalidDetector {
                name: "config".to_string(),
                message: inner.to_string(),
            },
            other => dc_common::Error::Config(other.to_string()),
        }
    }
}

/// A validated configuration plus where it came from.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub config: DetectorConfig,
    pub source: ConfigSource,
    pub path: Option<PathBuf>,
}

impl ResolvedConfig {
    pub fn snapshot(&self) -> ConfigSnapshot {
        ConfigSnapshot::new(&self.config, &self.source, self.path.as_deref())
    }
}

/// Load the effective detector configuration.
///
/// An explicit `cli_path` that does not exist is an error; otherwise the
/// first file found by [`resolve_config`] wins and `preset` is the fallback.
/// The epoch override, when given, replaces the file's epoch.
pub fn load_detector(
    cli_path: Option<&std::path::Path>,
    preset: PresetName,
    epoch: Option<TimeEpoch>,
) -> Result<ResolvedConfig, ConfigError> {
    if let Some(path) = cli_path {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }
    }

    let resolved = resolve_config(cli_path);
    let mut config = match &resolved.path {
        Some(path) => DetectorConfig::from_file(path)?,
        None => get_preset(preset, epoch.unwrap_or_default()),
    };
    if let Some(epoch) = epoch {
        config.epoch = epoch;
    }

    validate_detector(&config)?;

    Ok(ResolvedConfig {
        config,
        source: resolved.source,
        path: resolved.path,
    })
}
