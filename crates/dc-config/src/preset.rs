//! Built-in detector presets.
//!
//! - Trip: vehicle speed above idle, with distance/energy/fuel integration
//! - ChargeCurrent: AC charger current above trickle level
//! - ChargeSocDeriv: smoothed state-of-charge derivative rising

use crate::detector::{
    DerivativeConfig, DetectorConfig, DistanceTracker, EnergyTracker, FieldLimit, FuelTracker,
    MemoryExport, MemoryTracker,
};
use dc_common::TimeEpoch;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Available detector presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PresetName {
    /// Driving trips detected from vehicle speed
    Trip,
    /// Charging sessions detected from charger current
    ChargeCurrent,
    /// Charging sessions detected from the state-of-charge slope
    ChargeSocDeriv,
}

impl PresetName {
    /// All available preset names.
    pub const ALL: &'static [PresetName] = &[
        PresetName::Trip,
        PresetName::ChargeCurrent,
        PresetName::ChargeSocDeriv,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PresetName::Trip => "trip",
            PresetName::ChargeCurrent => "charge-current",
            PresetName::ChargeSocDeriv => "charge-soc-deriv",
        }
    }

    pub fn parse(s: &str) -> Option<PresetName> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "trip" | "trips" | "drive" => Some(PresetName::Trip),
            "charge-current" | "charge" | "charging" => Some(PresetName::ChargeCurrent),
            "charge-soc-deriv" | "charge-deriv" | "soc-deriv" => Some(PresetName::ChargeSocDeriv),
            _ => None,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            PresetName::Trip => "Trips from veh_speed > 0.1 km/h, split on 10 min sample gaps",
            PresetName::ChargeCurrent => {
                "Charge cycles from charger_accurrent > 4 A, rejecting < 10% SoC gain"
            }
            PresetName::ChargeSocDeriv => {
                "Charge cycles from the smoothed hvbatt_soc slope > 5 %/h"
            }
        }
    }
}

impl fmt::Display for PresetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PresetName {
    type Err = PresetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PresetName::parse(s).ok_or_else(|| PresetError::UnknownPreset(s.to_string()))
    }
}

/// Errors related to preset lookup.
#[derive(Debug, Clone, Error)]
pub enum PresetError {
    #[error("Unknown preset '{0}'. Available: {available}", available = available_presets())]
    UnknownPreset(String),
}

fn available_presets() -> String {
    PresetName::ALL
        .iter()
        .map(|p| p.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Summary of a preset for listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresetInfo {
    pub name: PresetName,
    pub description: String,
    pub attr: String,
    pub measurement: String,
}

/// List all presets.
pub fn list_presets() -> Vec<PresetInfo> {
    PresetName::ALL
        .iter()
        .map(|name| {
            let config = get_preset(*name, TimeEpoch::default());
            PresetInfo {
                name: *name,
                description: name.description().to_string(),
                attr: config.attr,
                measurement: config.measurement,
            }
        })
        .collect()
}

/// Build the configuration for a preset in the given time epoch.
pub fn get_preset(name: PresetName, epoch: TimeEpoch) -> DetectorConfig {
    match name {
        PresetName::Trip => trip_preset(epoch),
        PresetName::ChargeCurrent => charge_current_preset(epoch),
        PresetName::ChargeSocDeriv => charge_soc_deriv_preset(epoch),
    }
}

fn trip_preset(epoch: TimeEpoch) -> DetectorConfig {
    let mut config = DetectorConfig::new("veh_speed", "trips", "veh_speed", 0.1, 0.1)
        .with_epoch(epoch);
    config.end.max_sample_gap_secs = Some(10.0 * 60.0);
    config.trackers.memories = vec![
        MemoryTracker {
            attr: "veh_odometer".to_string(),
            label: "odo".to_string(),
            export: MemoryExport::Bounds,
        },
        MemoryTracker {
            attr: "hvbatt_soc".to_string(),
            label: "soc".to_string(),
            export: MemoryExport::Bounds,
        },
        MemoryTracker {
            attr: "outside_air_temp".to_string(),
            label: "outside_air_temp".to_string(),
            export: MemoryExport::Last,
        },
    ];
    config.trackers.distance = Some(DistanceTracker {
        speed_attr: "veh_speed".to_string(),
        odometer_memory: Some("odo".to_string()),
    });
    config.trackers.energy = Some(EnergyTracker {
        current_attr: "hvbatt_current".to_string(),
        voltage_attr: "hvbatt_voltage".to_string(),
    });
    config.trackers.fuel = Some(FuelTracker {
        rate_attr: "fuel_rate".to_string(),
    });
    config
}

fn soc_memory() -> MemoryTracker {
    MemoryTracker {
        attr: "hvbatt_soc".to_string(),
        label: "soc".to_string(),
        export: MemoryExport::Bounds,
    }
}

fn charge_current_preset(epoch: TimeEpoch) -> DetectorConfig {
    let mut config = DetectorConfig::new(
        "charger_accurrent",
        "charge_cycles",
        "charger_accurrent",
        4.0,
        4.0,
    )
    .with_epoch(epoch)
    .with_max_merge_gap_secs(30.0 * 60.0)
    .with_min_cycle_duration_secs(10.0 * 60.0);
    config.end.max_sample_gap_secs = Some(60.0 * 60.0);
    config.merge_guards.max_soc_drop = Some(2.0);
    config.reject.min_soc_delta = Some(10.0);
    config.trackers.memories = vec![soc_memory()];
    config
}

fn charge_soc_deriv_preset(epoch: TimeEpoch) -> DetectorConfig {
    let mut config = DetectorConfig::new("soc_diff", "charge_cycles", "soc_diff", 5.0, -0.1)
        .with_epoch(epoch)
        .with_max_merge_gap_secs(2.0 * 60.0 * 60.0);
    config.end.above = Some(97.0);
    config.end.max_sample_gap_secs = Some(10.0 * 60.0);
    config.trackers.memories = vec![soc_memory()];
    config.preprocess.drop_at_or_above = Some(FieldLimit {
        attr: "hvbatt_soc".to_string(),
        limit: 200.0,
    });
    config.preprocess.derivative = Some(DerivativeConfig {
        source: "hvbatt_soc".to_string(),
        smoothed: "soc".to_string(),
        raw_diff: "soc_diff_raw".to_string(),
        diff: "soc_diff".to_string(),
        alpha: 0.999,
        per_secs: 60.0 * 60.0,
    });
    config
}
