//! Multi-series detection runs.
//!
//! Series are pulled from a [`SampleSource`] in batches of `workers` and each
//! batch is processed on scoped threads, one fresh [`Detector`] per series.
//! Workers share nothing but the sink, which sits behind a mutex and only
//! receives points of fully classified series.

use dc_common::{Error, Result, RunId, StructuredError};
use dc_config::DetectorConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Instant;
use tracing::error;

use crate::detector::Detector;
use crate::events::{event_names as progress_names, Phase, ProgressEmitter, ProgressEvent};
use crate::exit_codes::ExitCode;
use crate::log_event;
use crate::logging::{event_names, LogContext, Stage};
use crate::sink::CycleSink;
use crate::source::{SampleSource, Series};

/// Cooperative cancellation flag shared between a run and its controller.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Knobs of one pipeline run.
#[derive(Clone)]
pub struct PipelineOptions {
    /// Maximum number of series processed at once.
    pub workers: usize,
    /// Write diagnostic histograms here, per series.
    pub diagnostics_dir: Option<PathBuf>,
    pub cancel: CancelToken,
    pub run_id: RunId,
    pub progress: Option<Arc<dyn ProgressEmitter>>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        PipelineOptions {
            workers: thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            diagnostics_dir: None,
            cancel: CancelToken::new(),
            run_id: RunId::new(),
            progress: None,
        }
    }
}

impl PipelineOptions {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_diagnostics_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.diagnostics_dir = Some(dir.into());
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressEmitter>) -> Self {
        self.progress = Some(progress);
        self
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(progress) = &self.progress {
            progress.emit(event.with_run_id(self.run_id.to_string()));
        }
    }
}

/// Result of one series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesOutcome {
    pub series: String,
    pub accepted: usize,
    pub discarded: usize,
    pub merges: usize,
    pub points: usize,
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<StructuredError>,
    /// The series was stopped by the cancel token.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub cancelled: bool,
}

impl SeriesOutcome {
    fn failed(series: &str, err: &Error, elapsed_ms: u64) -> Self {
        SeriesOutcome {
            series: series.to_string(),
            accepted: 0,
            discarded: 0,
            merges: 0,
            points: 0,
            elapsed_ms,
            error: Some(StructuredError::from(err).with_context("series", series)),
            cancelled: matches!(err, Error::Cancelled { .. }),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Outcome of a whole run, series in source order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSummary {
    pub run_id: RunId,
    pub detector: String,
    pub series: Vec<SeriesOutcome>,
    /// Set when the run stopped pulling series because of cancellation.
    pub cancelled: bool,
}

impl PipelineSummary {
    pub fn accepted(&self) -> usize {
        self.series.iter().map(|s| s.accepted).sum()
    }

    pub fn discarded(&self) -> usize {
        self.series.iter().map(|s| s.discarded).sum()
    }

    pub fn points(&self) -> usize {
        self.series.iter().map(|s| s.points).sum()
    }

    pub fn failures(&self) -> impl Iterator<Item = &SeriesOutcome> {
        self.series.iter().filter(|s| !s.is_ok())
    }

    pub fn exit_code(&self) -> ExitCode {
        if self.cancelled || self.series.iter().any(|s| s.cancelled) {
            ExitCode::Interrupted
        } else if self.failures().next().is_some() {
            ExitCode::PartialFail
        } else if self.accepted() > 0 {
            ExitCode::CyclesFound
        } else {
            ExitCode::Clean
        }
    }
}

/// Run one detector configuration over every series of `source`.
///
/// Series failures are recorded in the summary and do not stop the run; a
/// failing source or an invalid configuration does. The sink is not closed.
pub fn run_pipeline(
    source: &mut dyn SampleSource,
    config: &DetectorConfig,
    sink: &mut dyn CycleSink,
    options: &PipelineOptions,
) -> Result<PipelineSummary> {
    // Fail fast on a bad configuration instead of once per series.
    Detector::new(config.clone())?;

    let ctx = LogContext::new(options.run_id.clone());
    let started = Instant::now();
    log_event!(
        ctx,
        INFO,
        event_names::RUN_STARTED,
        Stage::Init,
        "detection run started",
        detector = config.name.as_str(),
        workers = options.workers
    );
    options.emit(ProgressEvent::new(progress_names::RUN_STARTED, Phase::Run));

    let sink = Mutex::new(sink);
    let workers = options.workers.max(1);
    let mut outcomes = Vec::new();
    let mut cancelled = false;

    loop {
        if options.cancel.is_cancelled() {
            cancelled = true;
            break;
        }
        let mut batch: Vec<Series> = Vec::with_capacity(workers);
        while batch.len() < workers {
            match source.next_series()? {
                Some(series) => batch.push(series),
                None => break,
            }
        }
        if batch.is_empty() {
            break;
        }

        let first_index = outcomes.len();
        let results: Vec<SeriesOutcome> = thread::scope(|s| {
            let handles: Vec<_> = batch
                .into_iter()
                .enumerate()
                .map(|(i, series)| {
                    let key = series.key.to_string();
                    let ctx = ctx.with_series(key.clone());
                    let sink = &sink;
                    let handle = s.spawn(move || {
                        process_series(series, first_index + i, config, sink, options, &ctx)
                    });
                    (key, handle)
                })
                .collect();

            handles
                .into_iter()
                .map(|(key, handle)| {
                    handle.join().unwrap_or_else(|_| {
                        error!(series = %key, "series worker panicked");
                        let err = Error::Internal("series worker panicked".to_string());
                        SeriesOutcome::failed(&key, &err, 0)
                    })
                })
                .collect()
        });
        outcomes.extend(results);
    }

    let summary = PipelineSummary {
        run_id: options.run_id.clone(),
        detector: config.name.clone(),
        series: outcomes,
        cancelled,
    };
    let elapsed_ms = started.elapsed().as_millis() as u64;
    log_event!(
        ctx,
        INFO,
        event_names::RUN_FINISHED,
        Stage::Sink,
        "detection run finished",
        series_count = summary.series.len(),
        accepted = summary.accepted(),
        discarded = summary.discarded(),
        failed = summary.failures().count(),
        elapsed_ms = elapsed_ms
    );
    options.emit(
        ProgressEvent::new(progress_names::RUN_FINISHED, Phase::Run)
            .with_elapsed_ms(elapsed_ms)
            .with_detail("accepted", summary.accepted())
            .with_detail("failed", summary.failures().count())
            .with_detail("exit_code", summary.exit_code().code_name()),
    );
    Ok(summary)
}

fn process_series(
    series: Series,
    index: usize,
    config: &DetectorConfig,
    sink: &Mutex<&mut dyn CycleSink>,
    options: &PipelineOptions,
    ctx: &LogContext,
) -> SeriesOutcome {
    let started = Instant::now();
    let key = series.key.to_string();
    let current = index as u64 + 1;
    log_event!(ctx, DEBUG, event_names::SERIES_STARTED, Stage::Load, "series started");
    options.emit(
        ProgressEvent::new(progress_names::SERIES_STARTED, Phase::Series)
            .with_series(key.clone())
            .with_progress(current, None),
    );

    let result = detect_and_write(series, config, sink, options, ctx);
    let elapsed_ms = started.elapsed().as_millis() as u64;

    match result {
        Ok(outcome) => {
            let outcome = SeriesOutcome {
                elapsed_ms,
                ..outcome
            };
            log_event!(
                ctx,
                INFO,
                event_names::SERIES_FINISHED,
                Stage::Sink,
                "series finished",
                accepted = outcome.accepted,
                discarded = outcome.discarded,
                merges = outcome.merges,
                elapsed_ms = elapsed_ms
            );
            options.emit(
                ProgressEvent::new(progress_names::SERIES_FINISHED, Phase::Series)
                    .with_series(key)
                    .with_progress(current, None)
                    .with_elapsed_ms(elapsed_ms)
                    .with_detail("accepted", outcome.accepted)
                    .with_detail("discarded", outcome.discarded),
            );
            outcome
        }
        Err(err) => {
            if matches!(err, Error::Cancelled { .. }) {
                log_event!(ctx, WARN, event_names::SERIES_CANCELLED, Stage::Segment, "series cancelled");
            } else {
                log_event!(
                    ctx,
                    WARN,
                    event_names::SERIES_FAILED,
                    Stage::Segment,
                    "series failed",
                    code = err.code(),
                    error = err.to_string().as_str()
                );
            }
            options.emit(
                ProgressEvent::new(progress_names::SERIES_FAILED, Phase::Series)
                    .with_series(key.clone())
                    .with_progress(current, None)
                    .with_elapsed_ms(elapsed_ms)
                    .with_detail("code", err.code()),
            );
            SeriesOutcome::failed(&key, &err, elapsed_ms)
        }
    }
}

fn detect_and_write(
    series: Series,
    config: &DetectorConfig,
    sink: &Mutex<&mut dyn CycleSink>,
    options: &PipelineOptions,
    ctx: &LogContext,
) -> Result<SeriesOutcome> {
    let key = series.key.to_string();
    let mut detector = Detector::new(config.clone())?;
    let detection = detector.detect_series(&key, series.samples, &options.cancel)?;

    let points = detector.points(&detection);
    {
        let mut sink = sink
            .lock()
            .map_err(|_| Error::Sink("sink lock poisoned".to_string()))?;
        sink.write_points(&points)?;
    }
    log_event!(
        ctx,
        DEBUG,
        event_names::POINTS_WRITTEN,
        Stage::Sink,
        "points written",
        points = points.len()
    );

    let diagnostics = detector.take_diagnostics();
    if let Some(dir) = &options.diagnostics_dir {
        let written = diagnostics.write_jsonl(dir, &key)?;
        log_event!(
            ctx,
            DEBUG,
            event_names::DIAGNOSTICS_WRITTEN,
            Stage::Sink,
            "diagnostics written",
            files = written.len()
        );
    }

    Ok(SeriesOutcome {
        series: key,
        accepted: detection.accepted.len(),
        discarded: detection.discarded.len(),
        merges: detector.merge_log().merged_count(),
        points: points.len(),
        elapsed_ms: 0,
        error: None,
        cancelled: false,
    })
}
