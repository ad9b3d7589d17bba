//! Greedy merge of adjacent raw cycles.
//!
//! One left-to-right pass: the current cycle absorbs its successor while the
//! merge predicate allows it, otherwise it is emitted and the successor
//! becomes current. Already emitted cycles are never revisited.

use dc_common::{Result, TimeEpoch};
use dc_config::DetectorConfig;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::cycle::Cycle;
use crate::logging::event_names;

/// Merge adjacent cycles for which `can_merge(current, next)` holds.
pub fn merge_cycles<A>(
    raw: Vec<Cycle<A>>,
    mut can_merge: impl FnMut(&Cycle<A>, &Cycle<A>) -> bool,
    mut merge_stats: impl FnMut(A, A) -> Result<A>,
) -> Result<Vec<Cycle<A>>> {
    let mut merged = Vec::with_capacity(raw.len());
    let mut iter = raw.into_iter();
    let Some(mut current) = iter.next() else {
        return Ok(merged);
    };

    for next in iter {
        if can_merge(&current, &next) {
            current = Cycle {
                start: current.start,
                end: next.end,
                stats: merge_stats(current.stats, next.stats)?,
                reject_reason: None,
            };
        } else {
            merged.push(current);
            current = next;
        }
    }
    merged.push(current);
    Ok(merged)
}

/// One recorded merge decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeDecision {
    /// End time of the cycle being extended.
    pub last_end: i64,
    /// Start time of the candidate successor.
    pub next_start: i64,
    pub gap_secs: f64,
    pub merged: bool,
    /// Why the merge was refused.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Merge decisions of one detector run.
///
/// Owned by the detector and cleared between independent series.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergeLog {
    decisions: Vec<MergeDecision>,
}

impl MergeLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, decision: MergeDecision) {
        self.decisions.push(decision);
    }

    pub fn decisions(&self) -> &[MergeDecision] {
        &self.decisions
    }

    pub fn len(&self) -> usize {
        self.decisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decisions.is_empty()
    }

    pub fn merged_count(&self) -> usize {
        self.decisions.iter().filter(|d| d.merged).count()
    }

    /// Drain the log, leaving it empty.
    pub fn take(&mut self) -> Vec<MergeDecision> {
        std::mem::take(&mut self.decisions)
    }

    pub fn clear(&mut self) {
        self.decisions.clear();
    }
}

/// Time-gap merge rule plus optional domain guards.
#[derive(Debug, Clone, PartialEq)]
pub struct MergePolicy {
    pub epoch: TimeEpoch,
    pub max_gap_secs: f64,
    /// Refuse when state of charge fell by more than this many points.
    pub max_soc_drop: Option<f64>,
    pub soc_attr: String,
    /// Refuse when the successor's marker lies past the current end.
    pub movement_marker: Option<String>,
}

impl MergePolicy {
    pub fn from_config(config: &DetectorConfig) -> Self {
        MergePolicy {
            epoch: config.epoch,
            max_gap_secs: config.max_merge_gap_secs,
            max_soc_drop: config.merge_guards.max_soc_drop,
            soc_attr: config.merge_guards.soc_attr.clone(),
            movement_marker: config.merge_guards.movement_marker.clone(),
        }
    }

    /// Plain time-gap policy without guards.
    pub fn gap_only(epoch: TimeEpoch, max_gap_secs: f64) -> Self {
        MergePolicy {
            epoch,
            max_gap_secs,
            max_soc_drop: None,
            soc_attr: String::new(),
            movement_marker: None,
        }
    }

    /// Decide whether `next` may be merged into `current`.
    ///
    /// Guards only veto; a guard whose attribute is missing on either
    /// boundary sample lets the merge through.
    pub fn decide<A>(&self, current: &Cycle<A>, next: &Cycle<A>) -> MergeDecision {
        let gap_secs = self.epoch.gap_secs(current.end.time, next.start.time);
        let reason = if gap_secs >= self.max_gap_secs {
            Some(format!("gap>={}s", self.max_gap_secs))
        } else {
            self.guard_veto(current, next)
        };

        MergeDecision {
            last_end: current.end.time,
            next_start: next.start.time,
            gap_secs,
            merged: reason.is_none(),
            reason,
        }
    }

    fn guard_veto<A>(&self, current: &Cycle<A>, next: &Cycle<A>) -> Option<String> {
        if let Some(max_drop) = self.max_soc_drop {
            let before = current.end.valid_f64(&self.soc_attr);
            let after = next.start.valid_f64(&self.soc_attr);
            if let (Some(before), Some(after)) = (before, after) {
                if after - before < -max_drop {
                    return Some(format!("soc_drop>{}%", max_drop));
                }
            }
        }

        if let Some(marker) = &self.movement_marker {
            if let Some(moved_at) = next.start.f64(marker) {
                if moved_at > current.end.time as f64 {
                    return Some("moved".to_string());
                }
            }
        }

        None
    }

    /// Merge with this policy, recording every decision in `log`.
    pub fn merge<A>(
        &self,
        raw: Vec<Cycle<A>>,
        log: &mut MergeLog,
        merge_stats: impl FnMut(A, A) -> Result<A>,
    ) -> Result<Vec<Cycle<A>>> {
        merge_cycles(
            raw,
            |current, next| {
                let decision = self.decide(current, next);
                trace!(
                    event = event_names::MERGE_DECIDED,
                    last_end = decision.last_end,
                    next_start = decision.next_start,
                    gap_secs = decision.gap_secs,
                    merged = decision.merged,
                    reason = ?decision.reason,
                    "merge decided"
                );
                let merged = decision.merged;
                log.record(decision);
                merged
            },
            merge_stats,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dc_common::Sample;

    fn cycle(start: i64, end: i64, count: u64) -> Cycle<u64> {
        Cycle::new(Sample::new(start, "p"), Sample::new(end, "p"), count)
    }

    fn sum(a: u64, b: u64) -> Result<u64> {
        Ok(a + b)
    }

    fn spans(cycles: &[Cycle<u64>]) -> Vec<(i64, i64, u64)> {
        cycles
            .iter()
            .map(|c| (c.start.time, c.end.time, c.stats))
            .collect()
    }

    #[test]
    fn gap_below_limit_merges() {
        let policy = MergePolicy::gap_only(TimeEpoch::Seconds, 10.0);
        let mut log = MergeLog::new();
        let merged = policy
            .merge(vec![cycle(0, 10, 3), cycle(15, 20, 4)], &mut log, sum)
            .unwrap();
        assert_eq!(spans(&merged), vec![(0, 20, 7)]);
        assert_eq!(log.len(), 1);
        assert!(log.decisions()[0].merged);
        assert_eq!(log.decisions()[0].gap_secs, 5.0);
    }

    #[test]
    fn gap_at_or_above_limit_keeps_cycles_apart() {
        let policy = MergePolicy::gap_only(TimeEpoch::Seconds, 10.0);
        let mut log = MergeLog::new();
        let merged = policy
            .merge(vec![cycle(0, 10, 3), cycle(25, 30, 4)], &mut log, sum)
            .unwrap();
        assert_eq!(spans(&merged), vec![(0, 10, 3), (25, 30, 4)]);
        assert_eq!(log.decisions()[0].reason.as_deref(), Some("gap>=10s"));
    }

    #[test]
    fn chain_merges_left_to_right() {
        let policy = MergePolicy::gap_only(TimeEpoch::Seconds, 10.0);
        let mut log = MergeLog::new();
        let raw = vec![
            cycle(0, 1, 1),
            cycle(5, 6, 1),
            cycle(10, 11, 1),
            cycle(40, 41, 1),
            cycle(45, 46, 1),
        ];
        let merged = policy.merge(raw, &mut log, sum).unwrap();
        assert_eq!(spans(&merged), vec![(0, 11, 3), (40, 46, 2)]);
        assert_eq!(log.len(), 4);
        assert_eq!(log.merged_count(), 3);
    }

    #[test]
    fn merge_is_idempotent_on_its_output() {
        let policy = MergePolicy::gap_only(TimeEpoch::Seconds, 10.0);
        let mut log = MergeLog::new();
        let raw = vec![cycle(0, 1, 1), cycle(5, 6, 1), cycle(30, 31, 1)];
        let once = policy.merge(raw, &mut log, sum).unwrap();
        let twice = policy.merge(once.clone(), &mut log, sum).unwrap();
        assert_eq!(spans(&once), spans(&twice));
    }

    #[test]
    fn empty_input_merges_to_empty() {
        let merged = merge_cycles(Vec::<Cycle<u64>>::new(), |_, _| true, sum).unwrap();
        assert!(merged.is_empty());
    }

    #[test]
    fn soc_drop_guard_refuses_merge() {
        let mut policy = MergePolicy::gap_only(TimeEpoch::Seconds, 100.0);
        policy.max_soc_drop = Some(2.0);
        policy.soc_attr = "hvbatt_soc".into();

        let a = Cycle::new(
            Sample::new(0, "p"),
            Sample::new(10, "p").with("hvbatt_soc", 50.0),
            1u64,
        );
        let dropped = Cycle::new(
            Sample::new(20, "p").with("hvbatt_soc", 47.5),
            Sample::new(30, "p"),
            1u64,
        );
        let small_drop = Cycle::new(
            Sample::new(20, "p").with("hvbatt_soc", 48.5),
            Sample::new(30, "p"),
            1u64,
        );
        let unknown = Cycle::new(Sample::new(20, "p"), Sample::new(30, "p"), 1u64);

        let decision = policy.decide(&a, &dropped);
        assert!(!decision.merged);
        assert_eq!(decision.reason.as_deref(), Some("soc_drop>2%"));
        assert!(policy.decide(&a, &small_drop).merged);
        assert!(policy.decide(&a, &unknown).merged);
    }

    #[test]
    fn movement_marker_guard_refuses_merge() {
        let mut policy = MergePolicy::gap_only(TimeEpoch::Seconds, 100.0);
        policy.movement_marker = Some("last_movement".into());

        let a = cycle(0, 10, 1);
        let moved = Cycle::new(
            Sample::new(20, "p").with("last_movement", 15i64),
            Sample::new(30, "p"),
            1u64,
        );
        let parked = Cycle::new(
            Sample::new(20, "p").with("last_movement", 5i64),
            Sample::new(30, "p"),
            1u64,
        );
        assert_eq!(policy.decide(&a, &moved).reason.as_deref(), Some("moved"));
        assert!(policy.decide(&a, &parked).merged);
    }

    #[test]
    fn gap_is_scaled_through_epoch() {
        let policy = MergePolicy::gap_only(TimeEpoch::Nanoseconds, 600.0);
        let a = cycle(0, 1_000_000_000, 1);
        let b = cycle(300_000_000_000, 301_000_000_000, 1);
        let decision = policy.decide(&a, &b);
        assert_eq!(decision.gap_secs, 299.0);
        assert!(decision.merged);
    }

    #[test]
    fn merge_log_take_resets() {
        let mut log = MergeLog::new();
        log.record(MergeDecision {
            last_end: 0,
            next_start: 1,
            gap_secs: 1.0,
            merged: true,
            reason: None,
        });
        assert_eq!(log.take().len(), 1);
        assert!(log.is_empty());
    }
}
