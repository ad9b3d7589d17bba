//! Drive Cycles Core Library
//!
//! Detects activity cycles (trips, charging sessions) in per-vehicle
//! telemetry:
//! - Segmentation of time-ordered samples into raw cycles
//! - Per-cycle statistics through pluggable accumulators
//! - Greedy merging of nearby cycles with a decision log
//! - Accept/reject classification and point rendering
//! - Sample sources, cycle sinks and the multi-series pipeline
//!
//! The binary entry point is in `main.rs`.

pub mod accumulate;
pub mod classify;
pub mod cycle;
pub mod detector;
pub mod diagnostics;
pub mod events;
pub mod exit_codes;
pub mod logging;
pub mod merge;
pub mod pipeline;
pub mod preprocess;
pub mod segment;
pub mod sink;
pub mod source;

pub use accumulate::{CycleStats, StatPlugin};
pub use classify::Detection;
pub use cycle::Cycle;
pub use detector::Detector;
pub use events::CyclePoint;
pub use pipeline::{run_pipeline, CancelToken, PipelineOptions, PipelineSummary};
pub use sink::CycleSink;
pub use source::{SampleSource, Series};
