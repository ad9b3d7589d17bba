//! Structured event names and pipeline stages for logging.
//!
//! Every event carries its name in the `event` field so that JSONL consumers
//! can filter on it without parsing messages.

use serde::{Deserialize, Serialize};

/// Processing stages of one detection run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Startup and configuration.
    Init,
    /// Reading samples from a source.
    Load,
    Preprocess,
    Segment,
    Merge,
    Classify,
    /// Writing points and diagnostics.
    Sink,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Init => "init",
            Stage::Load => "load",
            Stage::Preprocess => "preprocess",
            Stage::Segment => "segment",
            Stage::Merge => "merge",
            Stage::Classify => "classify",
            Stage::Sink => "sink",
        };
        write!(f, "{}", s)
    }
}

/// Standard event names used in logging.
pub mod event_names {
    // Run lifecycle
    pub const RUN_STARTED: &str = "run.started";
    pub const RUN_FINISHED: &str = "run.finished";

    // Config
    pub const CONFIG_LOADED: &str = "config.loaded";
    pub const CONFIG_ERROR: &str = "config.error";

    // Series lifecycle
    pub const SERIES_STARTED: &str = "series.started";
    pub const SERIES_FINISHED: &str = "series.finished";
    pub const SERIES_FAILED: &str = "series.failed";
    pub const SERIES_CANCELLED: &str = "series.cancelled";

    // Detection stages
    pub const SAMPLE_DROPPED: &str = "preprocess.sample_dropped";
    pub const CYCLE_CLOSED: &str = "segment.cycle_closed";
    pub const MERGE_DECIDED: &str = "merge.decided";
    pub const CYCLE_CLASSIFIED: &str = "classify.cycle_classified";

    // Output
    pub const POINTS_WRITTEN: &str = "sink.points_written";
    pub const DIAGNOSTICS_WRITTEN: &str = "sink.diagnostics_written";
}
