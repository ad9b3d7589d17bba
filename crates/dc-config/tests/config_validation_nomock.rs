//! No-mock detector configuration tests.
//!
//! Covers:
//! - Resolution order (CLI > env file > env dir > XDG > /etc > preset)
//! - Loading TOML and JSON detector files from disk
//! - Validation failures surfaced through `load_detector`

use dc_common::TimeEpoch;
use dc_config::preset::{get_preset, PresetName};
use dc_config::resolve::{resolve_in, ConfigSource, ENV_CONFIG_DIR, ENV_DETECTOR_CONFIG};
use dc_config::{load_detector, ConfigError, DetectorConfig, ValidationError};
use std::env;
use std::fs;
use std::path::Path;
use std::sync::{Mutex, OnceLock};
use tempfile::TempDir;

static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

struct EnvGuard {
    keys: Vec<String>,
    saved: Vec<Option<String>>,
}

impl EnvGuard {
    fn new(keys: &[&str]) -> Self {
        let saved = keys.iter().map(|key| env::var(key).ok()).collect();
        Self {
            keys: keys.iter().map(|k| k.to_string()).collect(),
            saved,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in self.keys.iter().zip(&self.saved) {
            match value {
                Some(val) => env::set_var(key, val),
                None => env::remove_var(key),
            }
        }
    }
}

fn with_env_lock<T>(f: impl FnOnce() -> T) -> T {
    let _guard = ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|e| e.into_inner());
    let _env = EnvGuard::new(&[ENV_DETECTOR_CONFIG, ENV_CONFIG_DIR]);
    env::remove_var(ENV_DETECTOR_CONFIG);
    env::remove_var(ENV_CONFIG_DIR);
    f()
}

fn write_config(path: &Path, config: &DetectorConfig) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create config parent");
    }
    fs::write(path, config.to_toml().expect("render toml")).expect("write config");
}

#[test]
fn resolution_prefers_cli_over_environment() {
    with_env_lock(|| {
        let tmp = TempDir::new().unwrap();
        let cli = tmp.path().join("cli.toml");
        let envfile = tmp.path().join("env.toml");
        fs::write(&cli, "").unwrap();
        fs::write(&envfile, "").unwrap();
        env::set_var(ENV_DETECTOR_CONFIG, &envfile);

        let resolved = resolve_in(Some(&cli), None, tmp.path());
        assert_eq!(resolved.source, ConfigSource::CliArgument);

        let resolved = resolve_in(None, None, tmp.path());
        assert_eq!(resolved.source, ConfigSource::Environment);
        assert_eq!(resolved.path.as_deref(), Some(envfile.as_path()));
    });
}

#[test]
fn resolution_config_dir_then_xdg_then_system() {
    with_env_lock(|| {
        let tmp = TempDir::new().unwrap();
        let xdg = tmp.path().join("xdg");
        let system = tmp.path().join("etc");
        fs::create_dir_all(xdg.join("drive-cycles")).unwrap();
        fs::create_dir_all(system.join("drive-cycles")).unwrap();
        fs::write(system.join("drive-cycles").join("detector.toml"), "").unwrap();

        let resolved = resolve_in(None, Some(&xdg), &system);
        assert_eq!(resolved.source, ConfigSource::SystemConfig);

        fs::write(xdg.join("drive-cycles").join("detector.json"), "{}").unwrap();
        let resolved = resolve_in(None, Some(&xdg), &system);
        assert_eq!(resolved.source, ConfigSource::XdgConfig);

        let dir = tmp.path().join("custom");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("detector.toml"), "").unwrap();
        env::set_var(ENV_CONFIG_DIR, &dir);
        let resolved = resolve_in(None, Some(&xdg), &system);
        assert_eq!(resolved.source, ConfigSource::Environment);
        assert!(resolved.path.unwrap().starts_with(&dir));
    });
}

#[test]
fn resolution_falls_back_to_preset() {
    with_env_lock(|| {
        let tmp = TempDir::new().unwrap();
        let resolved = resolve_in(None, Some(&tmp.path().join("none")), &tmp.path().join("etc"));
        assert_eq!(resolved.source, ConfigSource::BuiltinPreset);
        assert!(resolved.path.is_none());
    });
}

#[test]
fn load_detector_reads_cli_file_and_applies_epoch_override() {
    with_env_lock(|| {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("charge.toml");
        let config = get_preset(PresetName::ChargeCurrent, TimeEpoch::Nanoseconds);
        write_config(&path, &config);

        let resolved = load_detector(Some(&path), PresetName::Trip, Some(TimeEpoch::Seconds))
            .expect("load config");
        assert_eq!(resolved.source, ConfigSource::CliArgument);
        assert_eq!(resolved.config.attr, "charger_accurrent");
        assert_eq!(resolved.config.epoch, TimeEpoch::Seconds);
        assert_eq!(resolved.snapshot().summary.detector, "charger_accurrent");
    });
}

#[test]
fn load_detector_missing_cli_file_is_not_found() {
    with_env_lock(|| {
        let tmp = TempDir::new().unwrap();
        let err = load_detector(Some(&tmp.path().join("nope.toml")), PresetName::Trip, None)
            .unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
    });
}

#[test]
fn load_detector_rejects_invalid_file() {
    with_env_lock(|| {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bad.json");
        fs::write(
            &path,
            r#"{"name":"x","measurement":"m","attr":"a",
                "max_merge_gap_secs": -5.0,
                "start":{"above":1.0},"end":{"below":1.0}}"#,
        )
        .unwrap();

        let err = load_detector(Some(&path), PresetName::Trip, None).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Validation(ValidationError::InvalidValue { .. })
        ));
        let common: dc_common::Error = err.into();
        assert_eq!(common.code(), 11);
    });
}

#[test]
fn load_detector_uses_preset_when_nothing_found() {
    with_env_lock(|| {
        let tmp = TempDir::new().unwrap();
        // Point the config dir at an empty directory so XDG/system lookups are
        // the only remaining candidates.
        env::set_var(ENV_CONFIG_DIR, tmp.path());
        let resolved = load_detector(None, PresetName::ChargeSocDeriv, Some(TimeEpoch::Milliseconds))
            .expect("preset load");
        if resolved.source == ConfigSource::BuiltinPreset {
            assert_eq!(resolved.config.attr, "soc_diff");
            assert_eq!(resolved.config.epoch, TimeEpoch::Milliseconds);
        }
    });
}

#[test]
fn env_lock_recovers_after_a_panicking_test() {
    let failed = std::panic::catch_unwind(|| with_env_lock(|| panic!("config test failed")));
    assert!(failed.is_err());
    assert_eq!(with_env_lock(|| env::var(ENV_CONFIG_DIR).ok()), None);
}
