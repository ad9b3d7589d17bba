//! Configuration validation errors and semantic validation.

use std::collections::HashSet;
use thiserror::Error;

use crate::detector::DetectorConfig;

/// Validation result type.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Configuration validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Semantic validation failed: {0}")]
    SemanticError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: String, actual: String },
}

impl ValidationError {
    /// Error code for structured error reporting.
    pub fn code(&self) -> u32 {
        match self {
            ValidationError::SemanticError(_) => 63,
            ValidationError::MissingField(_) => 64,
            ValidationError::InvalidValue { .. } => 65,
            ValidationError::VersionMismatch { .. } => 66,
        }
    }
}

fn invalid(field: &str, message: impl Into<String>) -> ValidationError {
    ValidationError::InvalidValue {
        field: field.to_string(),
        message: message.into(),
    }
}

fn require_name(field: &str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::MissingField(field.to_string()));
    }
    Ok(())
}

fn require_finite(field: &str, value: f64) -> ValidationResult<()> {
    if !value.is_finite() {
        return Err(invalid(field, format!("must be finite, got {}", value)));
    }
    Ok(())
}

fn require_non_negative(field: &str, value: f64) -> ValidationResult<()> {
    require_finite(field, value)?;
    if value < 0.0 {
        return Err(invalid(field, format!("must be >= 0, got {}", value)));
    }
    Ok(())
}

/// Validate a detector configuration semantically.
pub fn validate_detector(config: &DetectorConfig) -> ValidationResult<()> {
    if config.schema_version != crate::CONFIG_SCHEMA_VERSION {
        return Err(ValidationError::VersionMismatch {
            expected: crate::CONFIG_SCHEMA_VERSION.to_string(),
            actual: config.schema_version.clone(),
        });
    }

    require_name("name", &config.name)?;
    require_name("measurement", &config.measurement)?;
    require_name("attr", &config.attr)?;

    require_non_negative("min_cycle_duration_secs", config.min_cycle_duration_secs)?;
    require_non_negative("max_merge_gap_secs", config.max_merge_gap_secs)?;

    require_finite("start.above", config.start.above)?;
    require_finite("end.below", config.end.below)?;
    if let Some(above) = config.end.above {
        require_finite("end.above", above)?;
        if above <= config.start.above {
            return Err(ValidationError::SemanticError(format!(
                "end.above ({}) must exceed start.above ({}), otherwise no cycle survives its first sample",
                above, config.start.above
            )));
        }
    }
    if let Some(gap) = config.end.max_sample_gap_secs {
        require_non_negative("end.max_sample_gap_secs", gap)?;
    }

    if let Some(drop) = config.merge_guards.max_soc_drop {
        require_non_negative("merge_guards.max_soc_drop", drop)?;
        require_name("merge_guards.soc_attr", &config.merge_guards.soc_attr)?;
    }
    if let Some(marker) = &config.merge_guards.movement_marker {
        require_name("merge_guards.movement_marker", marker)?;
    }
    if let Some(delta) = config.reject.min_soc_delta {
        require_finite("reject.min_soc_delta", delta)?;
        require_name("reject.soc_attr", &config.reject.soc_attr)?;
    }

    let mut labels = HashSet::new();
    for memory in &config.trackers.memories {
        require_name("trackers.memories.attr", &memory.attr)?;
        require_name("trackers.memories.label", &memory.label)?;
        if !labels.insert(memory.label.as_str()) {
            return Err(invalid(
                "trackers.memories.label",
                format!("duplicate label '{}'", memory.label),
            ));
        }
    }

    if let Some(label) = config
        .trackers
        .distance
        .as_ref()
        .and_then(|d| d.odometer_memory.as_ref())
    {
        if !labels.contains(label.as_str()) {
            return Err(invalid(
                "trackers.distance.odometer_memory",
                format!("no memory labelled '{}'", label),
            ));
        }
    }

    if let Some(limit) = &config.preprocess.drop_at_or_above {
        require_name("preprocess.drop_at_or_above.attr", &limit.attr)?;
        require_finite("preprocess.drop_at_or_above.limit", limit.limit)?;
    }
    if let Some(deriv) = &config.preprocess.derivative {
        if !(0.0..1.0).contains(&deriv.alpha) {
            return Err(invalid(
                "preprocess.derivative.alpha",
                format!("must be in [0, 1), got {}", deriv.alpha),
            ));
        }
        if !(deriv.per_secs.is_finite() && deriv.per_secs > 0.0) {
            return Err(invalid(
                "preprocess.derivative.per_secs",
                format!("must be > 0, got {}", deriv.per_secs),
            ));
        }
        for (field, value) in [
            ("preprocess.derivative.source", &deriv.source),
            ("preprocess.derivative.smoothed", &deriv.smoothed),
            ("preprocess.derivative.raw_diff", &deriv.raw_diff),
            ("preprocess.derivative.diff", &deriv.diff),
        ] {
            require_name(field, value)?;
        }
    }

    Ok(())
}
