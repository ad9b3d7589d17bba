//! Detector composition.
//!
//! A [`Detector`] is built from one [`DetectorConfig`] and runs the complete
//! per-series pass: preprocess, segment, merge, classify. It owns its merge
//! log and diagnostics; nothing is shared between detectors, so every series
//! gets its own instance.

use dc_common::{Error, Result, Sample, TimeEpoch};
use dc_config::{validate_detector, DetectorConfig};
use tracing::{debug, trace};

use crate::accumulate::{AveragePlugin, CycleStats, IntegralPlugin, MemoryPlugin, StatPlugin};
use crate::classify::{classify, partition, Detection, RejectPolicy};
use crate::diagnostics::Diagnostics;
use crate::events::{detection_to_points, CyclePoint};
use crate::logging::event_names;
use crate::merge::{MergeDecision, MergeLog, MergePolicy};
use crate::pipeline::CancelToken;
use crate::preprocess::Preprocessor;
use crate::segment::{CycleRules, Segmenter};

/// Threshold start/end predicates plus the plugins folded inside a cycle.
#[derive(Debug)]
pub struct Rules {
    pub attr: String,
    pub epoch: TimeEpoch,
    pub start_above: f64,
    pub end_below: f64,
    pub end_above: Option<f64>,
    pub max_sample_gap_secs: Option<f64>,
    plugins: Vec<Box<dyn StatPlugin>>,
}

impl Rules {
    pub fn from_config(config: &DetectorConfig) -> Self {
        Rules {
            attr: config.attr.clone(),
            epoch: config.epoch,
            start_above: config.start.above,
            end_below: config.end.below,
            end_above: config.end.above,
            max_sample_gap_secs: config.end.max_sample_gap_secs,
            plugins: build_plugins(config),
        }
    }

    pub fn plugins(&self) -> &[Box<dyn StatPlugin>] {
        &self.plugins
    }
}

impl CycleRules for Rules {
    type Acc = CycleStats;

    fn is_start(&self, sample: &Sample, _previous: Option<&Sample>) -> Result<bool> {
        Ok(sample.require_f64(&self.attr)? > self.start_above)
    }

    fn is_end(&self, sample: &Sample, previous: &Sample) -> Result<bool> {
        let value = sample.require_f64(&self.attr)?;
        if value < self.end_below {
            return Ok(true);
        }
        if self.end_above.is_some_and(|above| value > above) {
            return Ok(true);
        }
        let gapped = self
            .max_sample_gap_secs
            .is_some_and(|max| self.epoch.gap_secs(previous.time, sample.time) > max);
        Ok(gapped)
    }

    fn accumulate(&self, sample: &Sample, acc: Option<CycleStats>) -> Result<CycleStats> {
        CycleStats::fold(&self.plugins, sample, acc, self.epoch)
    }
}

/// Plugins in export order: primary average, memories, integrals.
pub fn build_plugins(config: &DetectorConfig) -> Vec<Box<dyn StatPlugin>> {
    let mut plugins: Vec<Box<dyn StatPlugin>> = vec![Box::new(AveragePlugin::new(&config.attr))];
    for memory in &config.trackers.memories {
        plugins.push(Box::new(MemoryPlugin::new(
            &memory.attr,
            &memory.label,
            memory.export,
        )));
    }
    if let Some(distance) = &config.trackers.distance {
        plugins.push(Box::new(IntegralPlugin::distance(&distance.speed_attr)));
    }
    if let Some(energy) = &config.trackers.energy {
        plugins.push(Box::new(IntegralPlugin::energy(
            &energy.current_attr,
            &energy.voltage_attr,
        )));
    }
    if let Some(fuel) = &config.trackers.fuel {
        plugins.push(Box::new(IntegralPlugin::fuel(&fuel.rate_attr)));
    }
    plugins
}

/// One configured cycle detector.
#[derive(Debug)]
pub struct Detector {
    config: DetectorConfig,
    rules: Rules,
    merge_policy: MergePolicy,
    reject_policy: RejectPolicy,
    merge_log: MergeLog,
    diagnostics: Diagnostics,
}

impl Detector {
    /// Build a detector; the configuration is validated first.
    pub fn new(config: DetectorConfig) -> Result<Self> {
        validate_detector(&config).map_err(|e| Error::InvalidDetector {
            name: config.name.clone(),
            message: e.to_string(),
        })?;
        Ok(Detector {
            rules: Rules::from_config(&config),
            merge_policy: MergePolicy::from_config(&config),
            reject_policy: RejectPolicy::from_config(&config),
            merge_log: MergeLog::new(),
            diagnostics: Diagnostics::new(),
            config,
        })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn plugins(&self) -> &[Box<dyn StatPlugin>] {
        self.rules.plugins()
    }

    pub fn merge_log(&self) -> &MergeLog {
        &self.merge_log
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Detect cycles in one complete, time-ordered series.
    pub fn detect(&mut self, samples: impl IntoIterator<Item = Sample>) -> Result<Detection> {
        let mut samples = samples.into_iter().peekable();
        let series = samples
            .peek()
            .map(|s| s.participant.clone())
            .unwrap_or_default();
        self.detect_series(&series, samples.map(Ok), &CancelToken::new())
    }

    /// Detect cycles in a fallible sample stream.
    ///
    /// The token is checked before every sample; a cancelled series fails
    /// with [`Error::Cancelled`] and yields no cycles at all.
    pub fn detect_series(
        &mut self,
        series: &str,
        samples: impl IntoIterator<Item = Result<Sample>>,
        cancel: &CancelToken,
    ) -> Result<Detection> {
        let mut preprocessor = Preprocessor::new(&self.config.preprocess, self.config.epoch);
        let mut segmenter = Segmenter::new(&self.rules, series);
        let mut raw = Vec::new();
        let mut seen = 0u64;

        for sample in samples {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled {
                    series: series.to_string(),
                });
            }
            let sample = sample?;
            seen += 1;
            let Some(sample) = preprocessor.apply(sample) else {
                trace!(event = event_names::SAMPLE_DROPPED, series, "sample dropped");
                continue;
            };
            if let Some(cycle) = segmenter.push(sample)? {
                trace!(
                    event = event_names::CYCLE_CLOSED,
                    series,
                    start = cycle.start.time,
                    end = cycle.end.time,
                    "cycle closed"
                );
                raw.push(cycle);
            }
        }
        raw.extend(segmenter.finish());

        let raw_count = raw.len();
        let logged = self.merge_log.len();
        let merged = self
            .merge_policy
            .merge(raw, &mut self.merge_log, CycleStats::merge)?;

        let classified: Vec<_> = merged
            .into_iter()
            .map(|cycle| classify(cycle, |c| self.reject_policy.check(c)))
            .collect();

        let labels: Vec<String> = self
            .config
            .trackers
            .memories
            .iter()
            .map(|m| m.label.clone())
            .collect();
        let odometer = self
            .config
            .trackers
            .distance
            .as_ref()
            .and_then(|d| d.odometer_memory.as_deref());
        for cycle in &classified {
            self.diagnostics
                .record_cycle(cycle, &labels, odometer, self.config.epoch);
        }
        self.diagnostics
            .merges
            .extend(self.merge_log.decisions()[logged..].iter().cloned());

        let detection = partition(classified);
        debug!(
            event = event_names::CYCLE_CLASSIFIED,
            series,
            samples = seen,
            raw = raw_count,
            accepted = detection.accepted.len(),
            discarded = detection.discarded.len(),
            "series classified"
        );
        Ok(detection)
    }

    /// Start and end points of every cycle of `detection`.
    pub fn points(&self, detection: &Detection) -> Vec<CyclePoint> {
        detection_to_points(
            detection,
            &self.config.measurement,
            &self.config.name,
            self.plugins(),
        )
    }

    pub fn take_merge_log(&mut self) -> Vec<MergeDecision> {
        self.merge_log.take()
    }

    pub fn take_diagnostics(&mut self) -> Diagnostics {
        std::mem::take(&mut self.diagnostics)
    }

    /// Forget everything recorded so far.
    pub fn reset(&mut self) {
        self.merge_log.clear();
        self.diagnostics = Diagnostics::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulate::IntegralKind;
    use dc_common::FieldValue;

    fn config() -> DetectorConfig {
        DetectorConfig::new("speed", "trips", "v", 1.0, 1.0)
            .with_epoch(TimeEpoch::Seconds)
            .with_min_sample_count(1)
            .with_min_cycle_duration_secs(0.0)
            .with_max_merge_gap_secs(10.0)
    }

    fn series(values: &[(i64, f64)]) -> Vec<Sample> {
        values
            .iter()
            .map(|(t, v)| Sample::new(*t, "veh").with("v", *v))
            .collect()
    }

    #[test]
    fn end_rule_covers_threshold_ceiling_and_gap() {
        let mut config = config();
        config.end.above = Some(100.0);
        config.end.max_sample_gap_secs = Some(60.0);
        let rules = Rules::from_config(&config);
        let prev = Sample::new(0, "p").with("v", 5.0);

        assert!(rules.is_end(&Sample::new(1, "p").with("v", 0.5), &prev).unwrap());
        assert!(rules.is_end(&Sample::new(1, "p").with("v", 150.0), &prev).unwrap());
        assert!(rules.is_end(&Sample::new(61, "p").with("v", 5.0), &prev).unwrap());
        assert!(!rules.is_end(&Sample::new(60, "p").with("v", 5.0), &prev).unwrap());
    }

    #[test]
    fn detect_scenario_single_cycle() {
        let mut detector = Detector::new(config()).unwrap();
        let detection = detector
            .detect(series(&[(0, 0.0), (1, 2.0), (2, 3.0), (3, 0.0)]))
            .unwrap();
        assert_eq!(detection.accepted.len(), 1);
        let cycle = &detection.accepted[0];
        assert_eq!((cycle.start.time, cycle.end.time), (1, 2));
        assert_eq!(cycle.stats.count, 2);
        assert_eq!(cycle.stats.average(AveragePlugin::FIELD).map(|a| a.value), Some(2.5));
    }

    #[test]
    fn nearby_cycles_merge_and_are_logged() {
        let mut detector = Detector::new(config()).unwrap();
        let detection = detector
            .detect(series(&[
                (0, 5.0),
                (1, 5.0),
                (2, 0.0),
                (5, 5.0),
                (6, 5.0),
                (7, 0.0),
                (40, 5.0),
                (41, 0.0),
            ]))
            .unwrap();
        let spans: Vec<_> = detection
            .accepted
            .iter()
            .map(|c| (c.start.time, c.end.time, c.stats.count))
            .collect();
        assert_eq!(spans, vec![(0, 6, 4), (40, 40, 1)]);
        assert_eq!(detector.merge_log().len(), 2);
        assert_eq!(detector.merge_log().merged_count(), 1);
        assert_eq!(detector.diagnostics().merges.len(), 2);
    }

    #[test]
    fn short_cycles_are_discarded_not_dropped() {
        let config = config().with_min_sample_count(3);
        let mut detector = Detector::new(config).unwrap();
        let detection = detector
            .detect(series(&[(0, 5.0), (1, 0.0), (100, 5.0), (101, 5.0), (102, 5.0)]))
            .unwrap();
        assert_eq!(detection.accepted.len(), 1);
        assert_eq!(detection.discarded.len(), 1);
        assert_eq!(detection.discarded[0].reject_reason.as_deref(), Some("count<3"));

        let points = detector.points(&detection);
        assert_eq!(points.len(), 4);
        assert!(points[2].tags.contains_key("discarded"));
    }

    #[test]
    fn missing_primary_attribute_fails() {
        let mut detector = Detector::new(config()).unwrap();
        let err = detector
            .detect(vec![Sample::new(0, "veh").with("other", 1.0)])
            .unwrap_err();
        assert_eq!(err.code(), 12);
    }

    #[test]
    fn cancelled_series_yields_nothing() {
        let mut detector = Detector::new(config()).unwrap();
        let token = CancelToken::new();
        token.cancel();
        let err = detector
            .detect_series("veh", series(&[(0, 5.0)]).into_iter().map(Ok), &token)
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled { .. }));
    }

    #[test]
    fn source_error_is_propagated() {
        let mut detector = Detector::new(config()).unwrap();
        let samples = vec![
            Ok(Sample::new(0, "veh").with("v", 5.0)),
            Err(Error::Source("truncated line".into())),
        ];
        let err = detector
            .detect_series("veh", samples, &CancelToken::new())
            .unwrap_err();
        assert_eq!(err.code(), 30);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = config();
        config.attr = String::new();
        let err = Detector::new(config).unwrap_err();
        assert_eq!(err.code(), 11);
    }

    #[test]
    fn trip_trackers_export_fields() {
        let mut config = config();
        config.trackers.memories.push(dc_config::detector::MemoryTracker {
            attr: "odometer".into(),
            label: "odo".into(),
            export: dc_config::detector::MemoryExport::Bounds,
        });
        config.trackers.distance = Some(dc_config::detector::DistanceTracker {
            speed_attr: "v".into(),
            odometer_memory: Some("odo".into()),
        });
        let mut detector = Detector::new(config).unwrap();
        let samples = vec![
            Sample::new(0, "veh").with("v", 36.0).with("odometer", 100.0),
            Sample::new(100, "veh").with("v", 36.0).with("odometer", FieldValue::Null),
            Sample::new(200, "veh").with("v", 36.0).with("odometer", 102.0),
            Sample::new(300, "veh").with("v", 0.0),
        ];
        let detection = detector.detect(samples).unwrap();
        let cycle = &detection.accepted[0];
        // Two steps of 100 s at 36 km/h.
        let distance = cycle.stats.integral(IntegralKind::Distance).unwrap();
        assert!((distance.total - 2.0).abs() < 1e-9);

        let points = detector.points(&detection);
        assert_eq!(points[0].field_f64("odo_start"), Some(100.0));
        assert_eq!(points[0].field_f64("odo_end"), Some(102.0));
        assert!(points[0].field_f64("est_distance").is_some());

        let diagnostics = detector.take_diagnostics();
        assert_eq!(diagnostics.distances.len(), 1);
        assert!(detector.diagnostics().is_empty());
    }

    #[test]
    fn reset_clears_state() {
        let mut detector = Detector::new(config()).unwrap();
        detector
            .detect(series(&[(0, 5.0), (1, 0.0), (3, 5.0)]))
            .unwrap();
        assert!(!detector.merge_log().is_empty());
        detector.reset();
        assert!(detector.merge_log().is_empty());
        assert!(detector.diagnostics().is_empty());
    }
}
