//! Segmentation state machine.
//!
//! Folds a time-ordered sample stream into raw cycles. The machine is either
//! outside or inside a cycle. A sample that ends a cycle is re-evaluated as a
//! potential start of the next one, and the last open cycle is flushed when
//! the stream ends.

use dc_common::{Error, Result, Sample};

use crate::cycle::Cycle;

/// Predicates and accumulator a [`Segmenter`] is driven by.
pub trait CycleRules {
    type Acc;

    /// Whether `sample` opens a cycle while outside.
    fn is_start(&self, sample: &Sample, previous: Option<&Sample>) -> Result<bool>;

    /// Whether `sample` closes the open cycle. `previous` is the sample
    /// observed just before it.
    fn is_end(&self, sample: &Sample, previous: &Sample) -> Result<bool>;

    /// Fold `sample` into the accumulator (`None` on the cycle's first sample).
    fn accumulate(&self, sample: &Sample, acc: Option<Self::Acc>) -> Result<Self::Acc>;
}

impl<R: CycleRules + ?Sized> CycleRules for &R {
    type Acc = R::Acc;

    fn is_start(&self, sample: &Sample, previous: Option<&Sample>) -> Result<bool> {
        (**self).is_start(sample, previous)
    }

    fn is_end(&self, sample: &Sample, previous: &Sample) -> Result<bool> {
        (**self).is_end(sample, previous)
    }

    fn accumulate(&self, sample: &Sample, acc: Option<Self::Acc>) -> Result<Self::Acc> {
        (**self).accumulate(sample, acc)
    }
}

enum State<A> {
    Outside,
    Inside { start: Sample, acc: A },
}

/// Streaming segmentation of one series.
pub struct Segmenter<R: CycleRules> {
    rules: R,
    series: String,
    state: State<R::Acc>,
    previous: Option<Sample>,
}

impl<R: CycleRules> Segmenter<R> {
    pub fn new(rules: R, series: impl Into<String>) -> Self {
        Segmenter {
            rules,
            series: series.into(),
            state: State::Outside,
            previous: None,
        }
    }

    pub fn is_inside(&self) -> bool {
        matches!(self.state, State::Inside { .. })
    }

    /// Feed the next sample; returns the cycle it closed, if any.
    pub fn push(&mut self, sample: Sample) -> Result<Option<Cycle<R::Acc>>> {
        if let Some(previous) = &self.previous {
            if sample.time < previous.time {
                return Err(Error::OutOfOrderSample {
                    series: self.series.clone(),
                    previous: Box::new(previous.clone()),
                    current: Box::new(sample),
                });
            }
        }

        let mut closed = None;
        self.state = match std::mem::replace(&mut self.state, State::Outside) {
            State::Outside => State::Outside,
            State::Inside { start, acc } => {
                // Inside always has a previous sample: the start sample at least.
                let previous = self.previous.as_ref().unwrap_or(&start);
                if self.rules.is_end(&sample, previous)? {
                    let end = previous.clone();
                    closed = Some(Cycle::new(start, end, acc));
                    State::Outside
                } else {
                    let acc = self.rules.accumulate(&sample, Some(acc))?;
                    State::Inside { start, acc }
                }
            }
        };

        if let State::Outside = self.state {
            if self.rules.is_start(&sample, self.previous.as_ref())? {
                let acc = self.rules.accumulate(&sample, None)?;
                self.state = State::Inside {
                    start: sample.clone(),
                    acc,
                };
            }
        }

        self.previous = Some(sample);
        Ok(closed)
    }

    /// End of stream: close the open cycle at the last observed sample.
    pub fn finish(self) -> Option<Cycle<R::Acc>> {
        match (self.state, self.previous) {
            (State::Inside { start, acc }, Some(end)) => Some(Cycle::new(start, end, acc)),
            _ => None,
        }
    }
}

/// Segment a complete, infallible sample sequence.
pub fn segment<R: CycleRules>(
    samples: impl IntoIterator<Item = Sample>,
    rules: R,
    series: &str,
) -> Result<Vec<Cycle<R::Acc>>> {
    let mut segmenter = Segmenter::new(rules, series);
    let mut cycles = Vec::new();
    for sample in samples {
        if let Some(cycle) = segmenter.push(sample)? {
            cycles.push(cycle);
        }
    }
    cycles.extend(segmenter.finish());
    Ok(cycles)
}
