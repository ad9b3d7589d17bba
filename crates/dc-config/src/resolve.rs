//! Configuration resolution and path discovery.
//!
//! Resolution order: CLI argument → environment variables → XDG paths →
//! system config → built-in preset.

use std::path::{Path, PathBuf};

/// Where a configuration file was found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConfigSource {
    /// Explicitly provided via CLI argument.
    CliArgument,

    /// Set via environment variable.
    Environment,

    /// Found in XDG config directory.
    XdgConfig,

    /// Found in /etc/drive-cycles/.
    SystemConfig,

    /// Using a built-in preset.
    #[default]
    BuiltinPreset,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::CliArgument => write!(f, "CLI argument"),
            ConfigSource::Environment => write!(f, "environment variable"),
            ConfigSource::XdgConfig => write!(f, "XDG config"),
            ConfigSource::SystemConfig => write!(f, "system config"),
            ConfigSource::BuiltinPreset => write!(f, "builtin preset"),
        }
    }
}

/// Environment variable names.
pub const ENV_DETECTOR_CONFIG: &str = "DC_DETECTOR_CONFIG";
pub const ENV_CONFIG_DIR: &str = "DC_CONFIG_DIR";

/// Standard config file names, in lookup order.
const DETECTOR_FILENAMES: &[&str] = &["detector.toml", "detector.json"];

/// Application name for XDG directories.
const APP_NAME: &str = "drive-cycles";

/// Resolved detector configuration path.
#[derive(Debug, Clone, Default)]
pub struct ConfigPath {
    /// Path to the detector file (None means built-in preset).
    pub path: Option<PathBuf>,

    /// Source of the config (for diagnostics).
    pub source: ConfigSource,
}

/// Resolve the detector configuration path.
///
/// Resolution order:
/// 1. Explicit CLI path (if it exists)
/// 2. `DC_DETECTOR_CONFIG` environment variable
/// 3. `DC_CONFIG_DIR` environment variable + filename
/// 4. XDG config directory (~/.config/drive-cycles/)
/// 5. System config (/etc/drive-cycles/)
/// 6. Built-in preset (None)
pub fn resolve_config(cli_path: Option<&Path>) -> ConfigPath {
    resolve_in(cli_path, dirs::config_dir().as_deref(), Path::new("/etc"))
}

/// Resolution with injectable base directories.
pub fn resolve_in(cli_path: Option<&Path>, xdg_base: Option<&Path>, system_base: &Path) -> ConfigPath {
    if let Some(path) = cli_path {
        if path.exists() {
            return found(path.to_path_buf(), ConfigSource::CliArgument);
        }
    }

    if let Ok(env_path) = std::env::var(ENV_DETECTOR_CONFIG) {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return found(path, ConfigSource::Environment);
        }
    }

    if let Ok(config_dir) = std::env::var(ENV_CONFIG_DIR) {
        if let Some(path) = first_existing(&PathBuf::from(config_dir)) {
            return found(path, ConfigSource::Environment);
        }
    }

    if let Some(xdg) = xdg_base {
        if let Some(path) = first_existing(&xdg.join(APP_NAME)) {
            return found(path, ConfigSource::XdgConfig);
        }
    }

    if let Some(path) = first_existing(&system_base.join(APP_NAME)) {
        return found(path, ConfigSource::SystemConfig);
    }

    ConfigPath::default()
}

fn found(path: PathBuf, source: ConfigSource) -> ConfigPath {
    ConfigPath {
        path: Some(path),
        source,
    }
}

fn first_existing(dir: &Path) -> Option<PathBuf> {
    DETECTOR_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.exists())
}
