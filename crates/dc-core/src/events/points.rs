//! Cycles rendered as time-series points.

use dc_common::FieldValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::accumulate::{FieldMap, StatPlugin};
use crate::classify::Detection;
use crate::cycle::Cycle;

/// One time-series point: a cycle start or end event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CyclePoint {
    pub measurement: String,
    /// Timestamp in the detector's epoch.
    pub time: i64,
    pub tags: BTreeMap<String, String>,
    pub fields: FieldMap,
}

impl CyclePoint {
    pub fn is_start(&self) -> bool {
        self.tags.get("started").map(String::as_str) == Some("true")
    }

    pub fn field_f64(&self, name: &str) -> Option<f64> {
        self.fields.get(name).and_then(FieldValue::as_f64)
    }
}

/// Start and end point of one cycle.
///
/// Tags: `participant`, `detector`, `started`, and `discarded` (the reject
/// reason) on discarded cycles only. Fields: `duration` in epoch units,
/// `sample_count`, plus whatever the plugins export.
pub fn cycle_to_points(
    cycle: &Cycle,
    measurement: &str,
    detector: &str,
    plugins: &[Box<dyn StatPlugin>],
) -> [CyclePoint; 2] {
    let mut tags = BTreeMap::new();
    tags.insert("participant".to_string(), cycle.participant().to_string());
    tags.insert("detector".to_string(), detector.to_string());
    if let Some(reason) = &cycle.reject_reason {
        tags.insert("discarded".to_string(), reason.clone());
    }

    let mut fields = FieldMap::new();
    fields.insert(
        "duration".to_string(),
        FieldValue::Int(cycle.duration_units()),
    );
    fields.insert(
        "sample_count".to_string(),
        FieldValue::Int(i64::try_from(cycle.stats.count).unwrap_or(i64::MAX)),
    );
    cycle.stats.export(plugins, &mut fields);

    let point = |time: i64, started: bool| {
        let mut tags = tags.clone();
        tags.insert("started".to_string(), started.to_string());
        CyclePoint {
            measurement: measurement.to_string(),
            time,
            tags,
            fields: fields.clone(),
        }
    };

    [point(cycle.start.time, true), point(cycle.end.time, false)]
}

/// Points of every cycle of a detection, accepted cycles first.
pub fn detection_to_points(
    detection: &Detection,
    measurement: &str,
    detector: &str,
    plugins: &[Box<dyn StatPlugin>],
) -> Vec<CyclePoint> {
    detection
        .iter()
        .flat_map(|cycle| cycle_to_points(cycle, measurement, detector, plugins))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulate::{AveragePlugin, CycleStats};
    use dc_common::{Sample, TimeEpoch};

    fn plugins() -> Vec<Box<dyn StatPlugin>> {
        vec![Box::new(AveragePlugin::new("v"))]
    }

    fn cycle() -> Cycle {
        let plugins = plugins();
        let epoch = TimeEpoch::Seconds;
        let a = Sample::new(10, "veh-1").with("v", 2.0);
        let b = Sample::new(25, "veh-1").with("v", 3.0);
        let stats = CycleStats::fold(&plugins, &a, None, epoch).unwrap();
        let stats = CycleStats::fold(&plugins, &b, Some(stats), epoch).unwrap();
        Cycle::new(a, b, stats)
    }

    #[test]
    fn accepted_cycle_yields_start_and_end_points() {
        let [start, end] = cycle_to_points(&cycle(), "trips", "veh_speed", &plugins());
        assert!(start.is_start());
        assert!(!end.is_start());
        assert_eq!(start.time, 10);
        assert_eq!(end.time, 25);
        assert_eq!(start.fields.get("duration"), Some(&FieldValue::Int(15)));
        assert_eq!(start.fields.get("sample_count"), Some(&FieldValue::Int(2)));
        assert_eq!(start.field_f64("value"), Some(2.5));
        assert_eq!(start.tags.get("participant").map(String::as_str), Some("veh-1"));
        assert_eq!(start.tags.get("detector").map(String::as_str), Some("veh_speed"));
        assert!(!start.tags.contains_key("discarded"));
        assert_eq!(start.fields, end.fields);
    }

    #[test]
    fn discarded_cycle_carries_reason_tag() {
        let mut c = cycle();
        c.reject_reason = Some("count<100".into());
        let [start, _] = cycle_to_points(&c, "trips", "veh_speed", &plugins());
        assert_eq!(start.tags.get("discarded").map(String::as_str), Some("count<100"));
    }
}
