//! Time epochs and duration math.
//!
//! Sample timestamps are plain integers whose unit is fixed per data source.
//! Every duration in the engine goes through [`TimeEpoch::duration_secs`] so
//! that thresholds expressed in seconds stay correct for any epoch.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Unit of the integer `time` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TimeEpoch {
    #[serde(rename = "h")]
    Hours,
    #[serde(rename = "m")]
    Minutes,
    #[serde(rename = "s")]
    Seconds,
    #[serde(rename = "ms")]
    Milliseconds,
    #[serde(rename = "u")]
    Microseconds,
    #[default]
    #[serde(rename = "n")]
    Nanoseconds,
}

impl TimeEpoch {
    pub const ALL: &'static [TimeEpoch] = &[
        TimeEpoch::Hours,
        TimeEpoch::Minutes,
        TimeEpoch::Seconds,
        TimeEpoch::Milliseconds,
        TimeEpoch::Microseconds,
        TimeEpoch::Nanoseconds,
    ];

    /// Length of one time unit in seconds.
    pub fn seconds_per_unit(self) -> f64 {
        match self {
            TimeEpoch::Hours => 3600.0,
            TimeEpoch::Minutes => 60.0,
            TimeEpoch::Seconds => 1.0,
            TimeEpoch::Milliseconds => 1e-3,
            TimeEpoch::Microseconds => 1e-6,
            TimeEpoch::Nanoseconds => 1e-9,
        }
    }

    /// Short name as used in query parameters (`n`, `u`, `ms`, ...).
    pub fn as_str(self) -> &'static str {
        match self {
            TimeEpoch::Hours => "h",
            TimeEpoch::Minutes => "m",
            TimeEpoch::Seconds => "s",
            TimeEpoch::Milliseconds => "ms",
            TimeEpoch::Microseconds => "u",
            TimeEpoch::Nanoseconds => "n",
        }
    }

    /// Convert a (possibly negative) span of time units to seconds.
    pub fn to_secs(self, units: i64) -> f64 {
        self.span_secs(i128::from(units))
    }

    fn span_secs(self, units: i128) -> f64 {
        let units = units as f64;
        match self {
            TimeEpoch::Hours | TimeEpoch::Minutes | TimeEpoch::Seconds => {
                units * self.seconds_per_unit()
            }
            // Divide so that whole seconds come out exact.
            _ => units / self.units_per_second(),
        }
    }

    /// Number of time units in one second.
    pub fn units_per_second(self) -> f64 {
        match self {
            TimeEpoch::Hours => 1.0 / 3600.0,
            TimeEpoch::Minutes => 1.0 / 60.0,
            TimeEpoch::Seconds => 1.0,
            TimeEpoch::Milliseconds => 1e3,
            TimeEpoch::Microseconds => 1e6,
            TimeEpoch::Nanoseconds => 1e9,
        }
    }

    /// Seconds elapsed from `earlier` to `later`.
    ///
    /// Fails with [`Error::NegativeDuration`] when `later` precedes `earlier`.
    pub fn duration_secs(self, earlier: i64, later: i64) -> Result<f64> {
        if later < earlier {
            return Err(Error::NegativeDuration { earlier, later });
        }
        Ok(self.gap_secs(earlier, later))
    }

    /// Signed gap in seconds; used where the caller has already ordered the inputs.
    ///
    /// The difference is taken in 128 bits, so any pair of timestamps is exact.
    pub fn gap_secs(self, earlier: i64, later: i64) -> f64 {
        self.span_secs(i128::from(later) - i128::from(earlier))
    }
}

impl fmt::Display for TimeEpoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TimeEpoch {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "h" | "hour" | "hours" => Ok(TimeEpoch::Hours),
            "m" | "min" | "minutes" => Ok(TimeEpoch::Minutes),
            "s" | "sec" | "seconds" => Ok(TimeEpoch::Seconds),
            "ms" | "millis" | "milliseconds" => Ok(TimeEpoch::Milliseconds),
            "u" | "us" | "micros" | "microseconds" => Ok(TimeEpoch::Microseconds),
            "n" | "ns" | "nanos" | "nanoseconds" => Ok(TimeEpoch::Nanoseconds),
            _ => Err(Error::Config(format!("unknown time epoch: {}", s))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_scales_through_epoch() {
        let ten_minutes_ns = 600 * 1_000_000_000;
        assert_eq!(
            TimeEpoch::Nanoseconds.duration_secs(0, ten_minutes_ns).unwrap(),
            600.0
        );
        assert_eq!(TimeEpoch::Seconds.duration_secs(5, 15).unwrap(), 10.0);
        assert_eq!(TimeEpoch::Minutes.duration_secs(0, 2).unwrap(), 120.0);
        assert!((TimeEpoch::Microseconds.duration_secs(0, 1_500_000).unwrap() - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_negative_duration_is_an_error() {
        let err = TimeEpoch::Seconds.duration_secs(10, 5).unwrap_err();
        assert!(matches!(err, Error::NegativeDuration { earlier: 10, later: 5 }));
    }

    #[test]
    fn test_parse_and_display() {
        for epoch in TimeEpoch::ALL {
            assert_eq!(epoch.as_str().parse::<TimeEpoch>().unwrap(), *epoch);
        }
        assert_eq!("ns".parse::<TimeEpoch>().unwrap(), TimeEpoch::Nanoseconds);
        assert!("fortnight".parse::<TimeEpoch>().is_err());
    }

    #[test]
    fn test_serde_uses_short_names() {
        let json = serde_json::to_string(&TimeEpoch::Microseconds).unwrap();
        assert_eq!(json, r#""u""#);
        let epoch: TimeEpoch = serde_json::from_str(r#""ms""#).unwrap();
        assert_eq!(epoch, TimeEpoch::Milliseconds);
    }

    #[test]
    fn test_extreme_timestamps_do_not_overflow() {
        let secs = TimeEpoch::Seconds.duration_secs(i64::MIN + 1, i64::MAX).unwrap();
        assert_eq!(secs, (i64::MAX as f64) * 2.0);
        assert!(TimeEpoch::Nanoseconds.gap_secs(i64::MAX, i64::MIN) < 0.0);
        assert_eq!(TimeEpoch::Seconds.to_secs(-3), -3.0);
    }

    proptest::proptest! {
        #[test]
        fn prop_whole_seconds_are_exact(secs in -1_000_000i64..1_000_000) {
            for (epoch, per_sec) in [
                (TimeEpoch::Seconds, 1),
                (TimeEpoch::Milliseconds, 1_000),
                (TimeEpoch::Microseconds, 1_000_000),
                (TimeEpoch::Nanoseconds, 1_000_000_000),
            ] {
                proptest::prop_assert_eq!(epoch.to_secs(secs * per_sec), secs as f64);
            }
        }
    }
}
