//! Run and series identity types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of one detection run, used to correlate log lines.
///
/// Format: `run-<12 hex chars>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub String);

impl RunId {
    /// Generate a fresh run id.
    pub fn new() -> Self {
        let uuid = uuid::Uuid::new_v4().simple().to_string();
        RunId(format!("run-{}", &uuid[..12]))
    }

    /// Parse and validate a RunId string.
    pub fn parse(s: &str) -> Option<Self> {
        let hex = s.strip_prefix("run-")?;
        if hex.len() != 12 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        Some(RunId(s.to_string()))
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Name of one logical series, e.g. the participant or the input file stem.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeriesKey(pub String);

impl SeriesKey {
    pub fn new(key: impl Into<String>) -> Self {
        SeriesKey(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SeriesKey {
    fn from(s: &str) -> Self {
        SeriesKey(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_id_format() {
        let id = RunId::new();
        assert!(id.0.starts_with("run-"));
        assert_eq!(id.0.len(), 16);
        assert!(RunId::parse(&id.0).is_some());
        assert_ne!(RunId::new(), id);
    }

    #[test]
    fn test_run_id_parse_rejects_garbage() {
        assert!(RunId::parse("run-xyz").is_none());
        assert!(RunId::parse("abc-0123456789ab").is_none());
        assert!(RunId::parse("run-0123456789ab").is_some());
    }

    #[test]
    fn test_series_key_serializes_transparently() {
        let key = SeriesKey::from("participant-5");
        assert_eq!(serde_json::to_string(&key).unwrap(), r#""participant-5""#);
        assert_eq!(key.to_string(), "participant-5");
    }
}
