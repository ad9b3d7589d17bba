//! Configuration snapshots for run telemetry and reproducibility.
//!
//! A snapshot captures the exact detector configuration at the start of a
//! run so that cycle output can be traced back to the thresholds that
//! produced it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::detector::DetectorConfig;
use crate::resolve::ConfigSource;

/// A frozen snapshot of the effective detector configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    /// When this snapshot was taken.
    pub timestamp: DateTime<Utc>,

    pub schema_version: String,

    /// Path the configuration was loaded from.
    #[serde(default)]
    pub path: Option<String>,

    /// Source of the configuration.
    pub source: String,

    /// SHA-256 of the canonical JSON rendering of the effective config.
    pub config_hash: String,

    pub summary: ConfigSummary,
}

/// Key configuration values for quick reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigSummary {
    pub detector: String,
    pub attr: String,
    pub measurement: String,
    pub start_above: f64,
    pub end_below: f64,
    pub min_sample_count: u64,
    pub min_cycle_duration_secs: f64,
    pub max_merge_gap_secs: f64,
}

impl ConfigSnapshot {
    /// Create a snapshot of an effective configuration.
    pub fn new(config: &DetectorConfig, source: &ConfigSource, path: Option<&std::path::Path>) -> Self {
        // serde_json output is deterministic for a given struct value.
        let canonical = serde_json::to_string(config).unwrap_or_default();

        ConfigSnapshot {
            timestamp: Utc::now(),
            schema_version: config.schema_version.clone(),
            path: path.map(|p| p.display().to_string()),
            source: source.to_string(),
            config_hash: hash_content(&canonical),
            summary: ConfigSummary {
                detector: config.name.clone(),
                attr: config.attr.clone(),
                measurement: config.measurement.clone(),
                start_above: config.start.above,
                end_below: config.end.below,
                min_sample_count: config.min_sample_count,
                min_cycle_duration_secs: config.min_cycle_duration_secs,
                max_merge_gap_secs: config.max_merge_gap_secs,
            },
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Check if this snapshot matches another (same effective config).
    pub fn matches(&self, other: &ConfigSnapshot) -> bool {
        self.config_hash == other.config_hash
    }

    /// Get a short identifier for this snapshot (first 12 chars of hash).
    pub fn short_id(&self) -> &str {
        &self.config_hash[..12.min(self.config_hash.len())]
    }
}

/// Hash content with SHA-256 and return hex string.
fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}
