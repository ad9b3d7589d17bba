//! Sample stream preprocessing applied before segmentation.
//!
//! - Limit filter: drops samples whose attribute is at or above a limit
//! - Derivative: exponentially smooths a source attribute, differentiates the
//!   smoothed value over time and smooths the derivative again

use dc_common::{Sample, TimeEpoch};
use dc_config::detector::{DerivativeConfig, FieldLimit, Preprocess};

/// Exponential moving average; `alpha` weighs the previous value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ema {
    alpha: f64,
    value: Option<f64>,
}

impl Ema {
    pub fn new(alpha: f64) -> Self {
        Ema { alpha, value: None }
    }

    pub fn update(&mut self, value: f64) -> f64 {
        let next = match self.value {
            None => value,
            Some(prev) => self.alpha * prev + (1.0 - self.alpha) * value,
        };
        self.value = Some(next);
        next
    }
}

#[derive(Debug, Clone)]
struct Derivative {
    config: DerivativeConfig,
    smooth_source: Ema,
    smooth_diff: Ema,
    /// Time and smoothed value of the previous kept sample.
    last: Option<(i64, f64)>,
    last_raw: f64,
}

impl Derivative {
    fn new(config: DerivativeConfig) -> Self {
        Derivative {
            smooth_source: Ema::new(config.alpha),
            smooth_diff: Ema::new(config.alpha),
            config,
            last: None,
            last_raw: 0.0,
        }
    }

    fn apply(&mut self, sample: Sample, epoch: TimeEpoch) -> Option<Sample> {
        let value = sample.valid_f64(&self.config.source)?;
        let smoothed = self.smooth_source.update(value);

        let raw = match self.last {
            Some((time, prev)) if sample.time > time => {
                let units = epoch.gap_secs(time, sample.time) / self.config.per_secs;
                (smoothed - prev) / units
            }
            // Same timestamp: the slope is undefined, keep the last one.
            Some(_) => self.last_raw,
            None => 0.0,
        };
        self.last = Some((sample.time, smoothed));
        self.last_raw = raw;
        let diff = self.smooth_diff.update(raw);

        Some(
            sample
                .with(self.config.smoothed.clone(), smoothed)
                .with(self.config.raw_diff.clone(), raw)
                .with(self.config.diff.clone(), diff),
        )
    }
}

/// Stateful per-series preprocessing pipeline.
#[derive(Debug, Clone)]
pub struct Preprocessor {
    epoch: TimeEpoch,
    limit: Option<FieldLimit>,
    derivative: Option<Derivative>,
}

impl Preprocessor {
    pub fn new(config: &Preprocess, epoch: TimeEpoch) -> Self {
        Preprocessor {
            epoch,
            limit: config.drop_at_or_above.clone(),
            derivative: config.derivative.clone().map(Derivative::new),
        }
    }

    pub fn is_noop(&self) -> bool {
        self.limit.is_none() && self.derivative.is_none()
    }

    /// Transform one sample; `None` drops it.
    ///
    /// The derivative stage drops samples without a usable source value.
    pub fn apply(&mut self, sample: Sample) -> Option<Sample> {
        if let Some(limit) = &self.limit {
            if sample.f64(&limit.attr).is_some_and(|v| v >= limit.limit) {
                return None;
            }
        }
        match &mut self.derivative {
            Some(derivative) => derivative.apply(sample, self.epoch),
            None => Some(sample),
        }
    }
}
