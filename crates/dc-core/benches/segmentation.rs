//! Criterion benchmarks for the per-series detection pass.
//!
//! Series are synthetic so the numbers are reproducible without telemetry
//! exports on disk.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use dc_common::{Sample, TimeEpoch};
use dc_config::{get_preset, PresetName};
use dc_core::Detector;

/// Drive for 10 minutes, park for 5, repeat; one sample every 5 s.
fn synthetic_trips(len: usize) -> Vec<Sample> {
    (0..len)
        .map(|i| {
            let time = i as i64 * 5;
            let phase = (i / 60) % 3;
            let speed = if phase < 2 { 40.0 + (i % 7) as f64 } else { 0.0 };
            Sample::new(time, "bench")
                .with("veh_speed", speed)
                .with("veh_odometer", 1000.0 + i as f64 * 0.05)
                .with("hvbatt_soc", 80.0 - (i as f64 * 0.001))
        })
        .collect()
}

fn bench_detect_trip_preset(c: &mut Criterion) {
    let mut group = c.benchmark_group("segmentation");

    for len in [1_000usize, 10_000, 100_000] {
        let samples = synthetic_trips(len);
        group.bench_with_input(BenchmarkId::new("detect_trip", len), &samples, |b, input| {
            b.iter(|| {
                let config = get_preset(PresetName::Trip, TimeEpoch::Seconds);
                let mut detector = Detector::new(config).expect("preset should validate");
                let detection = detector
                    .detect(black_box(input.iter().cloned()))
                    .expect("synthetic series should detect");
                black_box(detection);
            });
        });
    }

    group.finish();
}

fn bench_points(c: &mut Criterion) {
    let samples = synthetic_trips(10_000);
    let config = get_preset(PresetName::Trip, TimeEpoch::Seconds);
    let mut detector = Detector::new(config).expect("preset should validate");
    let detection = detector.detect(samples).expect("synthetic series should detect");

    c.bench_function("segmentation/points", |b| {
        b.iter(|| black_box(detector.points(black_box(&detection))));
    });
}

criterion_group!(benches, bench_detect_trip_preset, bench_points);
criterion_main!(benches);
