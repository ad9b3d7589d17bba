//! Per-cycle accumulators.
//!
//! A detector owns an ordered list of [`StatPlugin`]s. Each plugin folds one
//! sample at a time into its own [`PluginState`] and knows how to merge the
//! state of an earlier cycle with the state of a later one. [`CycleStats`]
//! holds the sample count plus one state per plugin, keyed by plugin name.
//!
//! Merging always assumes the left operand precedes the right one in time;
//! nothing here reorders.

use dc_common::{Error, FieldValue, Result, Sample, TimeEpoch};
use dc_config::detector::MemoryExport;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Point fields produced by plugin exports.
pub type FieldMap = BTreeMap<String, FieldValue>;

/// Recency-weighted average: every new value counts as much as all previous
/// values together.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunningAverage {
    pub value: f64,
}

impl RunningAverage {
    pub fn first(value: f64) -> Self {
        RunningAverage { value }
    }

    /// `(avg + value) / 2`
    pub fn update(self, value: f64) -> Self {
        RunningAverage {
            value: (self.value + value) / 2.0,
        }
    }

    pub fn merge(self, later: RunningAverage) -> Self {
        self.update(later.value)
    }
}

/// First and last sample carrying a usable value of one attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueMemory {
    pub name: String,
    pub first: Option<Sample>,
    pub last: Option<Sample>,
}

impl ValueMemory {
    pub fn new(name: impl Into<String>) -> Self {
        ValueMemory {
            name: name.into(),
            first: None,
            last: None,
        }
    }

    /// Record `sample` if it carries a present, finite, non-sentinel value.
    pub fn update(&mut self, sample: &Sample) {
        if sample.valid_f64(&self.name).is_none() {
            return;
        }
        if self.first.is_none() {
            self.first = Some(sample.clone());
        }
        self.last = Some(sample.clone());
    }

    /// Combine with the memory of a later cycle.
    pub fn merge(self, later: ValueMemory) -> Result<ValueMemory> {
        if self.name != later.name {
            return Err(Error::Config(format!(
                "cannot merge memory of '{}' with memory of '{}'",
                self.name, later.name
            )));
        }
        Ok(ValueMemory {
            first: self.first.or(later.first),
            last: later.last.or(self.last),
            name: self.name,
        })
    }

    pub fn first_value(&self) -> Option<f64> {
        self.first.as_ref().and_then(|s| s.valid_f64(&self.name))
    }

    pub fn last_value(&self) -> Option<f64> {
        self.last.as_ref().and_then(|s| s.valid_f64(&self.name))
    }

    /// Seconds from the cycle start to the first value, and from the last
    /// value to the cycle end. `None` when nothing was recorded.
    pub fn time_gap(&self, start: &Sample, end: &Sample, epoch: TimeEpoch) -> Option<(f64, f64)> {
        let first = self.first.as_ref()?;
        let last = self.last.as_ref()?;
        Some((
            epoch.gap_secs(start.time, first.time),
            epoch.gap_secs(last.time, end.time),
        ))
    }
}

/// Quantity integrated over time inside a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegralKind {
    /// Speed (km/h) to distance (km).
    Distance,
    /// Current × voltage (W) to energy (Wh).
    Energy,
    /// Fuel rate (L/h) to fuel (L).
    Fuel,
}

impl IntegralKind {
    /// Point field the total is exported as.
    pub fn field(self) -> &'static str {
        match self {
            IntegralKind::Distance => "est_distance",
            IntegralKind::Energy => "cons_energy",
            IntegralKind::Fuel => "cons_gasoline",
        }
    }
}

/// Running `Σ Δt_hours × rate` between consecutive in-cycle samples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Integral {
    pub total: f64,
    pub contributions: u64,
    /// Time of the previous sample of this cycle.
    pub last_time: i64,
}

impl Integral {
    pub fn start(time: i64) -> Self {
        Integral {
            total: 0.0,
            contributions: 0,
            last_time: time,
        }
    }

    /// Add the step from the previous sample to `time`. A missing rate adds
    /// nothing but still moves the step origin.
    pub fn advance(self, time: i64, rate: Option<f64>, epoch: TimeEpoch) -> Self {
        let mut next = Integral {
            last_time: time,
            ..self
        };
        if let Some(rate) = rate {
            let hours = epoch.gap_secs(self.last_time, time) / 3600.0;
            next.total += hours * rate;
            next.contributions += 1;
        }
        next
    }

    pub fn merge(self, later: Integral) -> Self {
        Integral {
            total: self.total + later.total,
            contributions: self.contributions + later.contributions,
            last_time: later.last_time,
        }
    }
}

/// State of one plugin for one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PluginState {
    Average(RunningAverage),
    Memory(ValueMemory),
    Integral(Integral),
}

impl PluginState {
    pub fn kind(&self) -> &'static str {
        match self {
            PluginState::Average(_) => "average",
            PluginState::Memory(_) => "memory",
            PluginState::Integral(_) => "integral",
        }
    }

    /// Merge with the state of a later cycle; both sides must be the same kind.
    pub fn merge(self, later: PluginState) -> Result<PluginState> {
        match (self, later) {
            (PluginState::Average(a), PluginState::Average(b)) => Ok(PluginState::Average(a.merge(b))),
            (PluginState::Memory(a), PluginState::Memory(b)) => Ok(PluginState::Memory(a.merge(b)?)),
            (PluginState::Integral(a), PluginState::Integral(b)) => {
                Ok(PluginState::Integral(a.merge(b)))
            }
            (a, b) => Err(Error::Config(format!(
                "cannot merge {} state with {} state",
                a.kind(),
                b.kind()
            ))),
        }
    }
}

fn state_mismatch(plugin: &str, found: &PluginState) -> Error {
    Error::Config(format!(
        "plugin '{}' was handed a {} state",
        plugin,
        found.kind()
    ))
}

/// One independent per-cycle statistic.
pub trait StatPlugin: Send + Sync + fmt::Debug {
    /// Unique key of this plugin's state inside [`CycleStats`].
    fn name(&self) -> &str;

    /// Fold one sample. `state` is `None` on the first sample of a cycle.
    fn fold(&self, sample: &Sample, state: Option<PluginState>, epoch: TimeEpoch) -> Result<PluginState>;

    /// Merge the state of an earlier cycle with that of a later one.
    fn merge(&self, earlier: PluginState, later: PluginState) -> Result<PluginState> {
        earlier.merge(later)
    }

    /// Write this plugin's point fields. Fields without a value are omitted.
    fn export(&self, state: &PluginState, fields: &mut FieldMap);
}

/// Running average of the primary attribute, exported as `value`.
///
/// The attribute is required: a sample without it is a configuration error.
#[derive(Debug, Clone)]
pub struct AveragePlugin {
    attr: String,
}

impl AveragePlugin {
    pub const FIELD: &'static str = "value";

    pub fn new(attr: impl Into<String>) -> Self {
        AveragePlugin { attr: attr.into() }
    }
}

impl StatPlugin for AveragePlugin {
    fn name(&self) -> &str {
        Self::FIELD
    }

    fn fold(&self, sample: &Sample, state: Option<PluginState>, _epoch: TimeEpoch) -> Result<PluginState> {
        let value = sample.require_f64(&self.attr)?;
        match state {
            None => Ok(PluginState::Average(RunningAverage::first(value))),
            Some(PluginState::Average(avg)) => Ok(PluginState::Average(avg.update(value))),
            Some(other) => Err(state_mismatch(self.name(), &other)),
        }
    }

    fn export(&self, state: &PluginState, fields: &mut FieldMap) {
        if let PluginState::Average(avg) = state {
            fields.insert(Self::FIELD.to_string(), FieldValue::Float(avg.value));
        }
    }
}

/// First/last value memory of one attribute.
#[derive(Debug, Clone)]
pub struct MemoryPlugin {
    attr: String,
    label: String,
    export: MemoryExport,
}

impl MemoryPlugin {
    pub fn new(attr: impl Into<String>, label: impl Into<String>, export: MemoryExport) -> Self {
        MemoryPlugin {
            attr: attr.into(),
            label: label.into(),
            export,
        }
    }

    pub fn attr(&self) -> &str {
        &self.attr
    }
}

impl StatPlugin for MemoryPlugin {
    fn name(&self) -> &str {
        &self.label
    }

    fn fold(&self, sample: &Sample, state: Option<PluginState>, _epoch: TimeEpoch) -> Result<PluginState> {
        let mut memory = match state {
            None => ValueMemory::new(self.attr.clone()),
            Some(PluginState::Memory(memory)) => memory,
            Some(other) => return Err(state_mismatch(self.name(), &other)),
        };
        memory.update(sample);
        Ok(PluginState::Memory(memory))
    }

    fn export(&self, state: &PluginState, fields: &mut FieldMap) {
        let PluginState::Memory(memory) = state else {
            return;
        };
        match self.export {
            MemoryExport::Bounds => {
                if let Some(v) = memory.first_value() {
                    fields.insert(format!("{}_start", self.label), FieldValue::Float(v));
                }
                if let Some(v) = memory.last_value() {
                    fields.insert(format!("{}_end", self.label), FieldValue::Float(v));
                }
            }
            MemoryExport::Last => {
                if let Some(v) = memory.last_value() {
                    fields.insert(self.label.clone(), FieldValue::Float(v));
                }
            }
        }
    }
}

/// Time integral of a rate derived from one or two attributes.
#[derive(Debug, Clone)]
pub struct IntegralPlugin {
    kind: IntegralKind,
    /// The rate is the product of these attributes; all must be present.
    factors: Vec<String>,
}

impl IntegralPlugin {
    pub fn distance(speed_attr: impl Into<String>) -> Self {
        IntegralPlugin {
            kind: IntegralKind::Distance,
            factors: vec![speed_attr.into()],
        }
    }

    pub fn energy(current_attr: impl Into<String>, voltage_attr: impl Into<String>) -> Self {
        IntegralPlugin {
            kind: IntegralKind::Energy,
            factors: vec![current_attr.into(), voltage_attr.into()],
        }
    }

    pub fn fuel(rate_attr: impl Into<String>) -> Self {
        IntegralPlugin {
            kind: IntegralKind::Fuel,
            factors: vec![rate_attr.into()],
        }
    }

    pub fn kind(&self) -> IntegralKind {
        self.kind
    }

    fn rate(&self, sample: &Sample) -> Option<f64> {
        self.factors
            .iter()
            .try_fold(1.0, |acc, attr| sample.valid_f64(attr).map(|v| acc * v))
    }
}

impl StatPlugin for IntegralPlugin {
    fn name(&self) -> &str {
        self.kind.field()
    }

    fn fold(&self, sample: &Sample, state: Option<PluginState>, epoch: TimeEpoch) -> Result<PluginState> {
        match state {
            None => Ok(PluginState::Integral(Integral::start(sample.time))),
            Some(PluginState::Integral(integral)) => Ok(PluginState::Integral(integral.advance(
                sample.time,
                self.rate(sample),
                epoch,
            ))),
            Some(other) => Err(state_mismatch(self.name(), &other)),
        }
    }

    fn export(&self, state: &PluginState, fields: &mut FieldMap) {
        if let PluginState::Integral(integral) = state {
            if integral.contributions > 0 {
                fields.insert(self.kind.field().to_string(), FieldValue::Float(integral.total));
            }
        }
    }
}

/// Accumulated statistics of one cycle.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CycleStats {
    /// Number of samples folded into the cycle.
    pub count: u64,
    pub plugins: BTreeMap<String, PluginState>,
}

impl CycleStats {
    /// Fold `sample` into `acc` (or start fresh statistics) with every plugin.
    pub fn fold(
        plugins: &[Box<dyn StatPlugin>],
        sample: &Sample,
        acc: Option<CycleStats>,
        epoch: TimeEpoch,
    ) -> Result<CycleStats> {
        let mut stats = acc.unwrap_or_default();
        for plugin in plugins {
            let previous = stats.plugins.remove(plugin.name());
            let next = plugin.fold(sample, previous, epoch)?;
            stats.plugins.insert(plugin.name().to_string(), next);
        }
        stats.count += 1;
        Ok(stats)
    }

    /// Merge with the statistics of a later cycle.
    ///
    /// Counts add exactly. States present on both sides merge pairwise; a
    /// state present on one side only is carried over unchanged.
    pub fn merge(self, later: CycleStats) -> Result<CycleStats> {
        let mut plugins = self.plugins;
        for (name, later_state) in later.plugins {
            let merged = match plugins.remove(&name) {
                Some(earlier_state) => earlier_state.merge(later_state)?,
                None => later_state,
            };
            plugins.insert(name, merged);
        }
        Ok(CycleStats {
            count: self.count + later.count,
            plugins,
        })
    }

    pub fn get(&self, name: &str) -> Option<&PluginState> {
        self.plugins.get(name)
    }

    pub fn average(&self, name: &str) -> Option<RunningAverage> {
        match self.plugins.get(name) {
            Some(PluginState::Average(avg)) => Some(*avg),
            _ => None,
        }
    }

    pub fn memory(&self, name: &str) -> Option<&ValueMemory> {
        match self.plugins.get(name) {
            Some(PluginState::Memory(memory)) => Some(memory),
            _ => None,
        }
    }

    pub fn integral(&self, kind: IntegralKind) -> Option<Integral> {
        match self.plugins.get(kind.field()) {
            Some(PluginState::Integral(integral)) => Some(*integral),
            _ => None,
        }
    }

    /// Exported fields of every plugin that has state, in plugin order.
    pub fn export(&self, plugins: &[Box<dyn StatPlugin>], fields: &mut FieldMap) {
        for plugin in plugins {
            if let Some(state) = self.plugins.get(plugin.name()) {
                plugin.export(state, fields);
            }
        }
    }
}
