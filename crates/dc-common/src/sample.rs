//! Telemetry sample model.
//!
//! A [`Sample`] is one row of a time series: a timestamp in the configured
//! epoch, the participant (vehicle) it belongs to, and an open set of named
//! attributes. The engine never interprets attributes on its own; only the
//! fields a detector configuration names are read.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Error, Result};

/// Sentinel written by the logger firmware when a channel has no reading.
pub const INVALID_READING: f64 = f64::MAX;

/// A single attribute value carried by a sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Null,
}

impl FieldValue {
    /// Numeric view of the value. Booleans map to 0/1, strings and nulls to `None`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Float(v) => Some(*v),
            FieldValue::Int(v) => Some(*v as f64),
            FieldValue::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            FieldValue::Str(_) | FieldValue::Null => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Bool(v) => write!(f, "{}", v),
            FieldValue::Int(v) => write!(f, "{}", v),
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::Str(v) => write!(f, "{}", v),
            FieldValue::Null => write!(f, "null"),
        }
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<u64> for FieldValue {
    fn from(v: u64) -> Self {
        FieldValue::Int(v as i64)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Str(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Str(v)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(FieldValue::Null)
    }
}

/// One immutable telemetry sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Timestamp in units of the configured [`crate::TimeEpoch`].
    pub time: i64,

    /// Participant (vehicle) identity of the series.
    #[serde(deserialize_with = "participant_from_any")]
    pub participant: String,

    /// All remaining attributes.
    #[serde(flatten)]
    pub fields: BTreeMap<String, FieldValue>,
}

/// Participants are stored as tags upstream but sometimes exported as integers.
fn participant_from_any<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = FieldValue::deserialize(deserializer)?;
    Ok(match value {
        FieldValue::Str(s) => s,
        FieldValue::Null => String::new(),
        other => other.to_string(),
    })
}

impl Sample {
    pub fn new(time: i64, participant: impl Into<String>) -> Self {
        Sample {
            time,
            participant: participant.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style attribute setter.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Copy of this sample with one attribute added or replaced.
    pub fn derive(&self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.clone().with(name, value)
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Finite numeric value of `name`, if present.
    pub fn f64(&self, name: &str) -> Option<f64> {
        self.fields
            .get(name)
            .and_then(FieldValue::as_f64)
            .filter(|v| v.is_finite())
    }

    /// Like [`Sample::f64`], but also rejects the [`INVALID_READING`] sentinel.
    pub fn valid_f64(&self, name: &str) -> Option<f64> {
        self.f64(name).filter(|v| *v != INVALID_READING)
    }

    /// Numeric value a predicate depends on; absence is a configuration error.
    pub fn require_f64(&self, name: &str) -> Result<f64> {
        self.f64(name).ok_or_else(|| Error::MissingAttribute {
            field: name.to_string(),
            time: self.time,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_from_json_flattens_fields() {
        let sample: Sample = serde_json::from_str(
            r#"{"time": 10, "participant": "5", "veh_speed": 12.5, "fuel_rate": null}"#,
        )
        .unwrap();

        assert_eq!(sample.time, 10);
        assert_eq!(sample.participant, "5");
        assert_eq!(sample.f64("veh_speed"), Some(12.5));
        assert_eq!(sample.get("fuel_rate"), Some(&FieldValue::Null));
        assert_eq!(sample.f64("fuel_rate"), None);
    }

    #[test]
    fn test_numeric_participant_is_stringified() {
        let sample: Sample =
            serde_json::from_str(r#"{"time": 1, "participant": 7, "hvbatt_soc": 80}"#).unwrap();
        assert_eq!(sample.participant, "7");
        assert_eq!(sample.get("hvbatt_soc"), Some(&FieldValue::Int(80)));
        assert_eq!(sample.f64("hvbatt_soc"), Some(80.0));
    }

    #[test]
    fn test_valid_f64_rejects_sentinel() {
        let sample = Sample::new(0, "1")
            .with("soc", INVALID_READING)
            .with("temp", f64::NAN)
            .with("odo", 1234.0);

        assert_eq!(sample.valid_f64("soc"), None);
        assert_eq!(sample.f64("soc"), Some(INVALID_READING));
        assert_eq!(sample.valid_f64("temp"), None);
        assert_eq!(sample.valid_f64("odo"), Some(1234.0));
    }

    #[test]
    fn test_require_f64_reports_field_and_time() {
        let sample = Sample::new(42, "1").with("label", "x");
        let err = sample.require_f64("veh_speed").unwrap_err();
        match err {
            Error::MissingAttribute { field, time } => {
                assert_eq!(field, "veh_speed");
                assert_eq!(time, 42);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(sample.require_f64("label").is_err());
    }

    #[test]
    fn test_serialize_roundtrip_keeps_flat_layout() {
        let sample = Sample::new(3, "2").with("veh_speed", 4.0);
        let json = serde_json::to_value(&sample).unwrap();
        assert_eq!(json["veh_speed"], serde_json::json!(4.0));
        assert_eq!(json["participant"], serde_json::json!("2"));
    }
}
