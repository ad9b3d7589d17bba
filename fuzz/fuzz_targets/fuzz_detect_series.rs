//! Fuzz target for the per-series detection pass.
//!
//! Arbitrary readings (including NaN, the invalid-reading sentinel and
//! out-of-order timestamps) must produce either a detection or an error.

#![no_main]

use arbitrary::Arbitrary;
use dc_common::{Sample, TimeEpoch};
use dc_config::DetectorConfig;
use dc_core::Detector;
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Reading {
    step: u16,
    speed: Option<f64>,
    soc: Option<f64>,
}

fuzz_target!(|readings: Vec<Reading>| {
    let config = DetectorConfig::new("fuzz", "trips", "speed", 1.0, 1.0)
        .with_epoch(TimeEpoch::Seconds)
        .with_min_sample_count(1)
        .with_max_merge_gap_secs(30.0);
    let Ok(mut detector) = Detector::new(config) else {
        return;
    };

    let mut time = 0i64;
    let samples: Vec<Sample> = readings
        .iter()
        .map(|r| {
            // Steps below 8 move backwards in time.
            time += i64::from(r.step) - 8;
            Sample::new(time, "veh").with("speed", r.speed).with("soc", r.soc)
        })
        .collect();

    if let Ok(detection) = detector.detect(samples) {
        let _ = detector.points(&detection);
    }
});
