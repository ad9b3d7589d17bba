//! End-to-end pipeline runs over real JSONL files on disk.
//!
//! Covers the multi-series path: file source with prefetch, parallel
//! workers, the JSONL sink, per-series failures, cancellation, diagnostics
//! and progress events.

use dc_common::{Result, Sample, TimeEpoch};
use dc_config::DetectorConfig;
use dc_core::events::{event_names, ProgressEmitter, ProgressEvent};
use dc_core::exit_codes::ExitCode;
use dc_core::pipeline::{run_pipeline, CancelToken, PipelineOptions};
use dc_core::sink::{CycleSink, JsonlSink, MemorySink};
use dc_core::source::{JsonlSource, MemorySource, Prefetch, SampleSource, Series};
use dc_core::CyclePoint;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

fn config() -> DetectorConfig {
    DetectorConfig::new("speed", "trips", "veh_speed", 1.0, 1.0)
        .with_epoch(TimeEpoch::Seconds)
        .with_min_sample_count(2)
        .with_min_cycle_duration_secs(0.0)
        .with_max_merge_gap_secs(10.0)
}

/// Two trips 3 s apart (merged) and a third one far away.
const TRIPS: &[(i64, f64)] = &[
    (0, 0.0),
    (1, 5.0),
    (2, 6.0),
    (3, 0.0),
    (5, 4.0),
    (6, 4.0),
    (7, 0.0),
    (100, 3.0),
    (101, 3.0),
    (102, 0.0),
];

fn write_series(dir: &Path, name: &str, rows: &[(i64, f64)]) -> PathBuf {
    let path = dir.join(format!("{name}.jsonl"));
    let mut file = std::fs::File::create(&path).unwrap();
    for (t, v) in rows {
        writeln!(
            file,
            r#"{{"time": {t}, "participant": "{name}", "veh_speed": {v}}}"#
        )
        .unwrap();
    }
    path
}

fn read_points(bytes: Vec<u8>) -> Vec<CyclePoint> {
    String::from_utf8(bytes)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[derive(Default)]
struct Capture {
    events: Mutex<Vec<ProgressEvent>>,
}

impl Capture {
    fn names(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.event.clone())
            .collect()
    }
}

impl ProgressEmitter for Capture {
    fn emit(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[test]
fn prefetched_files_run_in_parallel_and_keep_order() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["veh-a", "veh-b", "veh-c"] {
        write_series(dir.path(), name, TRIPS);
    }

    let mut source = Prefetch::new(JsonlSource::from_dir(dir.path()).unwrap().with_batch_size(3));
    let mut sink = JsonlSink::new(Vec::new());
    let options = PipelineOptions::default().with_workers(2);

    let summary = run_pipeline(&mut source, &config(), &mut sink, &options).unwrap();
    sink.close().unwrap();

    let keys: Vec<_> = summary.series.iter().map(|s| s.series.as_str()).collect();
    assert_eq!(keys, vec!["veh-a", "veh-b", "veh-c"]);
    assert!(summary.series.iter().all(|s| s.accepted == 2 && s.merges == 1));
    assert_eq!(summary.accepted(), 6);
    assert_eq!(summary.exit_code(), ExitCode::CyclesFound);

    let points = read_points(sink.into_inner().unwrap());
    assert_eq!(points.len(), summary.points());
    assert_eq!(points.len(), 12);
    for participant in ["veh-a", "veh-b", "veh-c"] {
        let mut times: Vec<_> = points
            .iter()
            .filter(|p| p.tags.get("participant").map(String::as_str) == Some(participant))
            .map(|p| p.time)
            .collect();
        times.sort();
        assert_eq!(times, vec![1, 6, 100, 101]);
    }
}

#[test]
fn failing_series_does_not_stop_the_others() {
    let dir = tempfile::tempdir().unwrap();
    write_series(dir.path(), "a-good", TRIPS);
    write_series(dir.path(), "b-unordered", &[(0, 5.0), (10, 5.0), (5, 0.0)]);
    let missing = dir.path().join("c-missing.jsonl");
    let mut paths = dc_core::source::jsonl_files(dir.path()).unwrap();
    paths.push(missing);

    let mut source = JsonlSource::new(paths);
    let mut sink = MemorySink::new();
    let options = PipelineOptions::default().with_workers(3);
    let summary = run_pipeline(&mut source, &config(), &mut sink, &options).unwrap();

    assert_eq!(summary.series.len(), 3);
    assert!(summary.series[0].is_ok());
    let codes: Vec<_> = summary
        .failures()
        .map(|s| s.error.as_ref().map(|e| e.code))
        .collect();
    assert_eq!(codes, vec![Some(20), Some(30)]);
    assert_eq!(summary.exit_code(), ExitCode::PartialFail);
    assert!(sink
        .points()
        .iter()
        .all(|p| p.tags.get("participant").map(String::as_str) == Some("a-good")));
}

#[test]
fn malformed_line_fails_its_series_with_location() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_series(dir.path(), "broken", &[(0, 5.0)]);
    std::fs::OpenOptions::new()
        .append(true)
        .open(&path)
        .unwrap()
        .write_all(b"{not json\n")
        .unwrap();

    let mut source = JsonlSource::new(vec![path]);
    let mut sink = MemorySink::new();
    let summary =
        run_pipeline(&mut source, &config(), &mut sink, &PipelineOptions::default()).unwrap();

    let error = summary.series[0].error.as_ref().unwrap();
    assert_eq!(error.code, 30);
    assert!(error.message.contains("broken.jsonl:2"));
    assert!(sink.points().is_empty());
}

/// Cancels the shared token when asked for its second series.
struct CancelAfterFirst {
    inner: MemorySource,
    token: CancelToken,
    served: usize,
}

impl SampleSource for CancelAfterFirst {
    fn next_series(&mut self) -> Result<Option<Series>> {
        if self.served == 1 {
            self.token.cancel();
        }
        self.served += 1;
        self.inner.next_series()
    }
}

fn trip_samples(participant: &str) -> Vec<Sample> {
    TRIPS
        .iter()
        .map(|(t, v)| Sample::new(*t, participant).with("veh_speed", *v))
        .collect()
}

#[test]
fn cancellation_stops_the_run_without_partial_points() {
    let token = CancelToken::new();
    let mut source = CancelAfterFirst {
        inner: MemorySource::new()
            .with_series("first", trip_samples("first"))
            .with_series("second", trip_samples("second"))
            .with_series("third", trip_samples("third")),
        token: token.clone(),
        served: 0,
    };
    let mut sink = MemorySink::new();
    let options = PipelineOptions::default()
        .with_workers(1)
        .with_cancel(token);

    let summary = run_pipeline(&mut source, &config(), &mut sink, &options).unwrap();

    assert!(summary.cancelled);
    assert_eq!(summary.series.len(), 2);
    assert!(summary.series[0].is_ok());
    assert!(summary.series[1].cancelled);
    assert_eq!(summary.series[1].error.as_ref().map(|e| e.code), Some(32));
    assert_eq!(summary.exit_code(), ExitCode::Interrupted);
    assert_eq!(sink.points().len(), summary.series[0].points);
    assert!(sink
        .points()
        .iter()
        .all(|p| p.tags.get("participant").map(String::as_str) == Some("first")));
}

#[test]
fn diagnostics_are_written_per_series() {
    let out = tempfile::tempdir().unwrap();
    let diagnostics = out.path().join("hist");
    let mut source = MemorySource::new().with_series("veh/7", trip_samples("veh/7"));
    let mut sink = MemorySink::new();
    let options = PipelineOptions::default().with_diagnostics_dir(&diagnostics);

    run_pipeline(&mut source, &config(), &mut sink, &options).unwrap();

    let merges = std::fs::read_to_string(diagnostics.join("hist_merges_veh_7.jsonl")).unwrap();
    let rows: Vec<serde_json::Value> = merges
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["merged"], serde_json::json!(true));
    assert_eq!(rows[1]["merged"], serde_json::json!(false));
}

#[test]
fn progress_events_bracket_the_run() {
    let capture = Arc::new(Capture::default());
    let mut source = MemorySource::new()
        .with_series("a", trip_samples("a"))
        .with_series("b", trip_samples("b"));
    let mut sink = MemorySink::new();
    let options = PipelineOptions::default()
        .with_workers(2)
        .with_progress(capture.clone());

    let summary = run_pipeline(&mut source, &config(), &mut sink, &options).unwrap();

    let names = capture.names();
    assert_eq!(names.first().map(String::as_str), Some(event_names::RUN_STARTED));
    assert_eq!(names.last().map(String::as_str), Some(event_names::RUN_FINISHED));
    let finished = names
        .iter()
        .filter(|n| n.as_str() == event_names::SERIES_FINISHED)
        .count();
    assert_eq!(finished, 2);

    let run_id = summary.run_id.to_string();
    assert!(capture
        .events
        .lock()
        .unwrap()
        .iter()
        .all(|e| e.run_id.as_deref() == Some(run_id.as_str())));
}

#[test]
fn sink_stays_open_for_the_caller() {
    let mut source = MemorySource::new().with_series("a", trip_samples("a"));
    let mut sink = MemorySink::new();
    run_pipeline(&mut source, &config(), &mut sink, &PipelineOptions::default()).unwrap();
    assert!(!sink.is_closed());
    sink.close().unwrap();
    assert!(sink.is_closed());
}
