//! Per-series diagnostic histograms.
//!
//! Collected by the detector while it renders final cycles and exported as
//! JSONL files, one row per cycle (or per merge decision):
//!
//! - `hist_<label>_<series>.jsonl`: seconds from cycle start to the first
//!   value of a memory and from its last value to the cycle end, or the
//!   missing marker when the memory saw no value
//! - `hist_dist_<series>.jsonl`: first odometer, last odometer, estimated
//!   distance
//! - `hist_merges_<series>.jsonl`: merge decisions

use dc_common::{Error, Result, TimeEpoch};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::accumulate::IntegralKind;
use crate::cycle::Cycle;
use crate::merge::MergeDecision;

/// Written in place of a gap when a memory never saw a value.
pub const MISSING_MARKER: &str = "X";

/// Odometer bounds next to the integrated distance of one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistanceCheck {
    pub odo_first: f64,
    pub odo_last: f64,
    pub est_distance: f64,
}

/// Histogram data of one series.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diagnostics {
    pub memory_gaps: BTreeMap<String, Vec<Option<(f64, f64)>>>,
    pub distances: Vec<DistanceCheck>,
    pub merges: Vec<MergeDecision>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.memory_gaps.values().all(Vec::is_empty)
            && self.distances.is_empty()
            && self.merges.is_empty()
    }

    /// Record gaps for every memory and, when configured, the distance check.
    pub fn record_cycle(
        &mut self,
        cycle: &Cycle,
        memory_labels: &[String],
        odometer_memory: Option<&str>,
        epoch: TimeEpoch,
    ) {
        for label in memory_labels {
            let gap = cycle
                .stats
                .memory(label)
                .and_then(|m| m.time_gap(&cycle.start, &cycle.end, epoch));
            self.memory_gaps.entry(label.clone()).or_default().push(gap);
        }

        let Some(odo) = odometer_memory.and_then(|label| cycle.stats.memory(label)) else {
            return;
        };
        let distance = cycle.stats.integral(IntegralKind::Distance);
        if let (Some(odo_first), Some(odo_last), Some(distance)) =
            (odo.first_value(), odo.last_value(), distance)
        {
            self.distances.push(DistanceCheck {
                odo_first,
                odo_last,
                est_distance: distance.total,
            });
        }
    }

    /// Named row sets, in file order.
    pub fn histograms(&self) -> Vec<(String, Vec<Value>)> {
        let mut out: Vec<(String, Vec<Value>)> = self
            .memory_gaps
            .iter()
            .map(|(label, gaps)| {
                let rows = gaps
                    .iter()
                    .map(|gap| match gap {
                        Some((head, tail)) => json!([head, tail]),
                        None => json!([MISSING_MARKER, MISSING_MARKER]),
                    })
                    .collect();
                (label.clone(), rows)
            })
            .collect();

        if !self.distances.is_empty() {
            let rows = self
                .distances
                .iter()
                .map(|d| json!([d.odo_first, d.odo_last, d.est_distance]))
                .collect();
            out.push(("dist".to_string(), rows));
        }

        if !self.merges.is_empty() {
            let rows = self
                .merges
                .iter()
                .map(|m| serde_json::to_value(m).unwrap_or(Value::Null))
                .collect();
            out.push(("merges".to_string(), rows));
        }

        out
    }

    /// Write each histogram to `dir/hist_<name>_<series>.jsonl`.
    pub fn write_jsonl(&self, dir: &Path, series: &str) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(dir)?;
        let series = file_safe(series);
        let mut written = Vec::new();
        for (name, rows) in self.histograms() {
            let path = dir.join(format!("hist_{}_{}.jsonl", file_safe(&name), series));
            let file = File::create(&path)
                .map_err(|e| Error::Sink(format!("{}: {}", path.display(), e)))?;
            let mut writer = BufWriter::new(file);
            for row in rows {
                serde_json::to_writer(&mut writer, &row)?;
                writer.write_all(b"\n")?;
            }
            writer.flush()?;
            written.push(path);
        }
        Ok(written)
    }
}

fn file_safe(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
