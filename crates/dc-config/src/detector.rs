//! Typed detector configuration.
//!
//! One [`DetectorConfig`] fully describes a detector instance: the primary
//! attribute and its start/end thresholds, the accept/reject floors, the merge
//! window, the statistics tracked per cycle and optional preprocessing of the
//! raw sample stream. Durations are plain seconds so that TOML and JSON files
//! stay readable; they are scaled through the configured [`TimeEpoch`] when
//! compared against sample timestamps.

use dc_common::TimeEpoch;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::ConfigError;

/// Complete configuration of one detector instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Schema version of the configuration file.
    #[serde(default = "default_schema_version")]
    pub schema_version: String,

    /// Detector name, written as the `detector` tag of every point.
    pub name: String,

    /// Measurement the cycle points are written to.
    pub measurement: String,

    /// Primary attribute: drives the start/end rules and the running average.
    pub attr: String,

    /// Unit of the sample `time` attribute.
    #[serde(default)]
    pub epoch: TimeEpoch,

    /// Cycles with fewer samples are discarded as `count<N`.
    #[serde(default = "default_min_sample_count")]
    pub min_sample_count: u64,

    /// Cycles shorter than this are discarded as `duration<Ns`.
    #[serde(default = "default_min_cycle_duration_secs")]
    pub min_cycle_duration_secs: f64,

    /// Adjacent cycles separated by less than this gap are merged.
    #[serde(default = "default_max_merge_gap_secs")]
    pub max_merge_gap_secs: f64,

    pub start: StartRule,

    pub end: EndRule,

    #[serde(default)]
    pub merge_guards: MergeGuards,

    #[serde(default)]
    pub reject: RejectRules,

    #[serde(default)]
    pub trackers: Trackers,

    #[serde(default)]
    pub preprocess: Preprocess,
}

fn default_schema_version() -> String {
    crate::CONFIG_SCHEMA_VERSION.to_string()
}

fn default_min_sample_count() -> u64 {
    100
}

fn default_min_cycle_duration_secs() -> f64 {
    5.0 * 60.0
}

fn default_max_merge_gap_secs() -> f64 {
    10.0 * 60.0
}

/// A cycle starts when the primary attribute rises above `above`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartRule {
    pub above: f64,
}

/// A cycle ends on the first sample matching any of these conditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndRule {
    /// Primary attribute falls below this value.
    pub below: f64,

    /// Primary attribute exceeds this value (implausible reading).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub above: Option<f64>,

    /// Time since the previous sample exceeds this many seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_sample_gap_secs: Option<f64>,
}

/// Domain predicates that can veto a merge the time gap would allow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeGuards {
    /// Refuse merging when state of charge dropped by more than this many
    /// percentage points between the two cycles.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_soc_drop: Option<f64>,

    /// Attribute holding the state of charge.
    #[serde(default = "default_soc_attr")]
    pub soc_attr: String,

    /// Attribute holding the timestamp of the last observed movement. A merge
    /// is refused when the next cycle's marker lies past the current cycle's end.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub movement_marker: Option<String>,
}

impl Default for MergeGuards {
    fn default() -> Self {
        MergeGuards {
            max_soc_drop: None,
            soc_attr: default_soc_attr(),
            movement_marker: None,
        }
    }
}

fn default_soc_attr() -> String {
    "hvbatt_soc".to_string()
}

/// Domain reject checks applied after the count and duration floors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectRules {
    /// Minimum rise of state of charge over the cycle, in percentage points.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_soc_delta: Option<f64>,

    #[serde(default = "default_soc_attr")]
    pub soc_attr: String,
}

impl Default for RejectRules {
    fn default() -> Self {
        RejectRules {
            min_soc_delta: None,
            soc_attr: default_soc_attr(),
        }
    }
}

/// Per-cycle statistics beyond the primary running average.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Trackers {
    /// First/last valid value memories.
    #[serde(default)]
    pub memories: Vec<MemoryTracker>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<DistanceTracker>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub energy: Option<EnergyTracker>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fuel: Option<FuelTracker>,
}

/// How a memory is rendered into point fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryExport {
    /// `<label>_start` and `<label>_end`.
    #[default]
    Bounds,
    /// `<label>` holding the last value only.
    Last,
}

/// Remember the first and last valid value of one attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryTracker {
    pub attr: String,

    /// Prefix of the exported field names.
    pub label: String,

    #[serde(default)]
    pub export: MemoryExport,
}

/// Integrate speed (km/h) over time into a distance estimate (km).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistanceTracker {
    pub speed_attr: String,

    /// Label of an odometer memory to compare the estimate against in
    /// diagnostics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub odometer_memory: Option<String>,
}

/// Integrate current × voltage over time into energy (Wh).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyTracker {
    pub current_attr: String,
    pub voltage_attr: String,
}

/// Integrate fuel rate (L/h) over time into consumed fuel (L).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuelTracker {
    pub rate_attr: String,
}

/// Transformations applied to the sample stream before segmentation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Preprocess {
    /// Drop samples whose attribute is at or above a limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drop_at_or_above: Option<FieldLimit>,

    /// Derive a smoothed rate-of-change attribute.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derivative: Option<DerivativeConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldLimit {
    pub attr: String,
    pub limit: f64,
}

/// Smooth `source`, differentiate it per `per_secs`, smooth the derivative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivativeConfig {
    pub source: String,
    pub smoothed: String,
    pub raw_diff: String,
    pub diff: String,
    /// Exponential smoothing weight of the previous value.
    pub alpha: f64,
    /// Derivative unit in seconds (3600 = per hour).
    pub per_secs: f64,
}

impl DetectorConfig {
    /// Minimal configuration with defaults for everything but the rules.
    pub fn new(
        name: impl Into<String>,
        measurement: impl Into<String>,
        attr: impl Into<String>,
        start_above: f64,
        end_below: f64,
    ) -> Self {
        DetectorConfig {
            schema_version: default_schema_version(),
            name: name.into(),
            measurement: measurement.into(),
            attr: attr.into(),
            epoch: TimeEpoch::default(),
            min_sample_count: default_min_sample_count(),
            min_cycle_duration_secs: default_min_cycle_duration_secs(),
            max_merge_gap_secs: default_max_merge_gap_secs(),
            start: StartRule { above: start_above },
            end: EndRule {
                below: end_below,
                above: None,
                max_sample_gap_secs: None,
            },
            merge_guards: MergeGuards::default(),
            reject: RejectRules::default(),
            trackers: Trackers::default(),
            preprocess: Preprocess::default(),
        }
    }

    pub fn with_epoch(mut self, epoch: TimeEpoch) -> Self {
        self.epoch = epoch;
        self
    }

    pub fn with_min_sample_count(mut self, count: u64) -> Self {
        self.min_sample_count = count;
        self
    }

    pub fn with_min_cycle_duration_secs(mut self, secs: f64) -> Self {
        self.min_cycle_duration_secs = secs;
        self
    }

    pub fn with_max_merge_gap_secs(mut self, secs: f64) -> Self {
        self.max_merge_gap_secs = secs;
        self
    }

    /// Load from a `.json` or `.toml` file, chosen by extension.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::IoError {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, &content)
    }

    /// Parse file content; `path` selects the format and labels errors.
    pub fn parse(path: &Path, content: &str) -> Result<Self, ConfigError> {
        let is_json = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        if is_json {
            serde_json::from_str(content).map_err(|e| ConfigError::ParseError {
                path: path.to_path_buf(),
                message: e.to_string(),
            })
        } else {
            toml::from_str(content).map_err(|e| ConfigError::ParseError {
                path: path.to_path_buf(),
                message: e.to_string(),
            })
        }
    }

    /// Render as TOML (used by `config show`).
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = DetectorConfig::new("trip", "trips", "veh_speed", 0.1, 0.1);
        assert_eq!(config.min_sample_count, 100);
        assert_eq!(config.min_cycle_duration_secs, 300.0);
        assert_eq!(config.max_merge_gap_secs, 600.0);
        assert_eq!(config.epoch, TimeEpoch::Nanoseconds);
        assert_eq!(config.schema_version, crate::CONFIG_SCHEMA_VERSION);
    }

    #[test]
    fn test_code_built_sections_name_soc_attr() {
        let config = DetectorConfig::new("charge", "charge_cycles", "charger_accurrent", 4.0, 4.0);
        assert_eq!(config.merge_guards.soc_attr, "hvbatt_soc");
        assert_eq!(config.reject.soc_attr, "hvbatt_soc");
        assert_eq!(MergeGuards::default().soc_attr, RejectRules::default().soc_attr);
    }

    #[test]
    fn test_minimal_toml_fills_defaults() {
        let content = r#"
name = "speed"
measurement = "trips"
attr = "veh_speed"
epoch = "s"

[start]
above = 1.0

[end]
below = 1.0
max_sample_gap_secs = 600.0
"#;
        let config = DetectorConfig::parse(Path::new("detector.toml"), content).unwrap();
        assert_eq!(config.epoch, TimeEpoch::Seconds);
        assert_eq!(config.min_sample_count, 100);
        assert_eq!(config.end.max_sample_gap_secs, Some(600.0));
        assert!(config.trackers.memories.is_empty());
        assert_eq!(config.merge_guards.soc_attr, "hvbatt_soc");
    }

    #[test]
    fn test_json_is_selected_by_extension() {
        let content = r#"{
            "name": "charge",
            "measurement": "charge_cycles",
            "attr": "charger_accurrent",
            "start": {"above": 4.0},
            "end": {"below": 4.0}
        }"#;
        let config = DetectorConfig::parse(Path::new("detector.JSON"), content).unwrap();
        assert_eq!(config.attr, "charger_accurrent");
    }

    #[test]
    fn test_parse_error_names_file() {
        let err = DetectorConfig::parse(Path::new("broken.toml"), "name = ").unwrap_err();
        assert!(err.to_string().contains("broken.toml"));
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = DetectorConfig::new("trip", "trips", "veh_speed", 0.1, 0.1)
            .with_min_sample_count(10);
        let rendered = config.to_toml().unwrap();
        let parsed = DetectorConfig::parse(Path::new("x.toml"), &rendered).unwrap();
        assert_eq!(parsed, config);
    }
}
