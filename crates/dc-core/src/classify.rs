//! Accept/reject classification of final cycles.

use dc_common::TimeEpoch;
use dc_config::DetectorConfig;
use serde::{Deserialize, Serialize};

use crate::accumulate::CycleStats;
use crate::cycle::Cycle;

/// Set the cycle's reject reason from `check`.
pub fn classify<A>(mut cycle: Cycle<A>, check: impl Fn(&Cycle<A>) -> Option<String>) -> Cycle<A> {
    cycle.reject_reason = check(&cycle);
    cycle
}

/// Classified cycles of one series. Both lists keep full cycle data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection<A = CycleStats> {
    pub accepted: Vec<Cycle<A>>,
    pub discarded: Vec<Cycle<A>>,
}

impl<A> Default for Detection<A> {
    fn default() -> Self {
        Detection {
            accepted: Vec::new(),
            discarded: Vec::new(),
        }
    }
}

impl<A> Detection<A> {
    pub fn len(&self) -> usize {
        self.accepted.len() + self.discarded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accepted.is_empty() && self.discarded.is_empty()
    }

    /// All cycles, accepted first.
    pub fn iter(&self) -> impl Iterator<Item = &Cycle<A>> {
        self.accepted.iter().chain(self.discarded.iter())
    }
}

/// Split classified cycles by `reject_reason`, keeping their order.
pub fn partition<A>(cycles: impl IntoIterator<Item = Cycle<A>>) -> Detection<A> {
    let (accepted, discarded) = cycles.into_iter().partition(Cycle::is_accepted);
    Detection {
        accepted,
        discarded,
    }
}

/// Sample-count and duration floors, then domain checks.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectPolicy {
    pub epoch: TimeEpoch,
    pub min_sample_count: u64,
    pub min_duration_secs: f64,
    /// Minimum state-of-charge rise in percentage points.
    pub min_soc_delta: Option<f64>,
    pub soc_attr: String,
    /// Memory consulted when a boundary sample lacks the SoC attribute.
    pub soc_memory: Option<String>,
}

impl RejectPolicy {
    pub fn from_config(config: &DetectorConfig) -> Self {
        let soc_memory = config
            .trackers
            .memories
            .iter()
            .find(|m| m.attr == config.reject.soc_attr)
            .map(|m| m.label.clone());
        RejectPolicy {
            epoch: config.epoch,
            min_sample_count: config.min_sample_count,
            min_duration_secs: config.min_cycle_duration_secs,
            min_soc_delta: config.reject.min_soc_delta,
            soc_attr: config.reject.soc_attr.clone(),
            soc_memory,
        }
    }

    /// First failing check, or `None` to accept.
    pub fn check(&self, cycle: &Cycle) -> Option<String> {
        if cycle.stats.count < self.min_sample_count {
            return Some(format!("count<{}", self.min_sample_count));
        }

        // An ill-ordered cycle cannot come out of segmentation; treat it as
        // zero length rather than failing classification.
        let duration = cycle.duration_secs(self.epoch).unwrap_or(0.0);
        if duration < self.min_duration_secs {
            return Some(format!("duration<{}s", self.min_duration_secs));
        }

        if let Some(min_delta) = self.min_soc_delta {
            match self.soc_delta(cycle) {
                Some(delta) if delta >= min_delta => {}
                _ => return Some(format!("delta_soc<{}%", min_delta)),
            }
        }

        None
    }

    /// SoC change over the cycle, from the boundary samples or, failing
    /// that, from the tracked SoC memory.
    fn soc_delta(&self, cycle: &Cycle) -> Option<f64> {
        let memory = self
            .soc_memory
            .as_deref()
            .and_then(|label| cycle.stats.memory(label));
        let start = cycle
            .start
            .valid_f64(&self.soc_attr)
            .or_else(|| memory.and_then(|m| m.first_value()))?;
        let end = cycle
            .end
            .valid_f64(&self.soc_attr)
            .or_else(|| memory.and_then(|m| m.last_value()))?;
        Some(end - start)
    }
}
