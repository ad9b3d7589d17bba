//! The interval produced by segmentation.

use dc_common::{Result, Sample, TimeEpoch};
use serde::{Deserialize, Serialize};

use crate::accumulate::CycleStats;

/// One activity cycle.
///
/// `start` and `end` are the first and last samples that satisfied the
/// inside condition, so `start.time <= end.time` always holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cycle<A = CycleStats> {
    pub start: Sample,
    pub end: Sample,
    pub stats: A,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reject_reason: Option<String>,
}

impl<A> Cycle<A> {
    pub fn new(start: Sample, end: Sample, stats: A) -> Self {
        Cycle {
            start,
            end,
            stats,
            reject_reason: None,
        }
    }

    /// Span in raw time units, saturating at `i64::MAX`.
    pub fn duration_units(&self) -> i64 {
        self.end.time.saturating_sub(self.start.time)
    }

    pub fn duration_secs(&self, epoch: TimeEpoch) -> Result<f64> {
        epoch.duration_secs(self.start.time, self.end.time)
    }

    pub fn is_accepted(&self) -> bool {
        self.reject_reason.is_none()
    }

    pub fn participant(&self) -> &str {
        &self.start.participant
    }
}
