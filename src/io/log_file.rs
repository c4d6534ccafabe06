//! Native experiment-log files.
//!
//! A log is a single JSON object tagged with the collector version under
//! `"sysid"`, carrying the mechanism family, the measurement units, and
//! the four test runs as arrays of numeric rows:
//!
//! ```json
//! {
//!   "sysid": "2024.1.0",
//!   "test": "Arm",
//!   "units": "Degrees",
//!   "unitsPerRotation": 360.0,
//!   "slow-forward":  [[t, V, p, v], ...],
//!   "slow-backward": [[t, V, p, v], ...],
//!   "fast-forward":  [[t, V, p, v], ...],
//!   "fast-backward": [[t, V, p, v], ...]
//! }
//! ```
//!
//! General mechanisms log 4-column rows; drivetrains log 9-column rows
//! `[t, Vl, Vr, pl, pr, vl, vr, heading, angular rate]`.

use std::fs;
use std::path::Path;

use serde_json::Value;

use crate::core::error::{Error, Result};
use crate::core::types::{MechanismTest, Unit, RUN_LABELS};

/// A parsed experiment log: header fields plus the four raw runs.
#[derive(Debug, Clone)]
pub struct ExperimentLog {
    /// Mechanism family recorded in the log
    pub mechanism: MechanismTest,
    /// Measurement unit of the position and velocity channels
    pub unit: Unit,
    /// Output units per motor-shaft rotation
    pub units_per_rotation: f64,
    /// Quasistatic ramp, forward direction
    pub slow_forward: Vec<Vec<f64>>,
    /// Quasistatic ramp, backward direction
    pub slow_backward: Vec<Vec<f64>>,
    /// Voltage step, forward direction
    pub fast_forward: Vec<Vec<f64>>,
    /// Voltage step, backward direction
    pub fast_backward: Vec<Vec<f64>>,
}

impl ExperimentLog {
    /// Read and validate a log file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.display().to_string(),
            source,
        })?;
        let value: Value = serde_json::from_str(&text)?;
        let log = Self::from_value(&value)?;
        log::info!(
            "read {}: {} test in {}, {} samples",
            path.display(),
            log.mechanism,
            log.unit,
            log.sample_count()
        );
        Ok(log)
    }

    /// Validate a parsed JSON document.
    ///
    /// The `"sysid"` tag must be present; its value is the collector
    /// version and is not interpreted. Every row of every run must have
    /// the mechanism's column count.
    pub fn from_value(value: &Value) -> Result<Self> {
        if value.get("sysid").is_none() {
            return Err(Error::SchemaMismatch(
                "missing \"sysid\" tag; convert legacy logs with convert_log first".to_string(),
            ));
        }

        let mechanism = MechanismTest::from_name(required_str(value, "test")?)?;
        let unit = Unit::from_name(required_str(value, "units")?)?;
        let units_per_rotation = value
            .get("unitsPerRotation")
            .and_then(Value::as_f64)
            .ok_or_else(|| {
                Error::SchemaMismatch("missing or non-numeric \"unitsPerRotation\"".to_string())
            })?;

        let mut runs = Vec::with_capacity(RUN_LABELS.len());
        for label in RUN_LABELS {
            let raw = value.get(label).ok_or_else(|| {
                Error::SchemaMismatch(format!("missing run {label:?}"))
            })?;
            let rows: Vec<Vec<f64>> = serde_json::from_value(raw.clone())?;

            for (i, row) in rows.iter().enumerate() {
                if row.len() != mechanism.raw_columns() {
                    return Err(Error::SchemaMismatch(format!(
                        "run {label:?} row {i} has {} columns, {} expects {}",
                        row.len(),
                        mechanism,
                        mechanism.raw_columns()
                    )));
                }
            }
            runs.push(rows);
        }

        let mut runs = runs.into_iter();
        Ok(Self {
            mechanism,
            unit,
            units_per_rotation,
            slow_forward: runs.next().unwrap_or_default(),
            slow_backward: runs.next().unwrap_or_default(),
            fast_forward: runs.next().unwrap_or_default(),
            fast_backward: runs.next().unwrap_or_default(),
        })
    }

    /// Total sample count across the four runs.
    pub fn sample_count(&self) -> usize {
        self.slow_forward.len()
            + self.slow_backward.len()
            + self.fast_forward.len()
            + self.fast_backward.len()
    }
}

fn required_str<'a>(value: &'a Value, key: &str) -> Result<&'a str> {
    value
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| Error::SchemaMismatch(format!("missing or non-string {key:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal_log() -> Value {
        json!({
            "sysid": "2024.1.0",
            "test": "Simple",
            "units": "Rotations",
            "unitsPerRotation": 1.0,
            "slow-forward":  [[0.0, 1.0, 0.0, 0.5]],
            "slow-backward": [[0.0, -1.0, 0.0, -0.5]],
            "fast-forward":  [[0.0, 6.0, 0.0, 1.0]],
            "fast-backward": [[0.0, -6.0, 0.0, -1.0]],
        })
    }

    #[test]
    fn test_parse_minimal_log() {
        let log = ExperimentLog::from_value(&minimal_log()).unwrap();
        assert_eq!(log.mechanism, MechanismTest::Simple);
        assert_eq!(log.unit, Unit::Rotations);
        assert_eq!(log.units_per_rotation, 1.0);
        assert_eq!(log.sample_count(), 4);
        assert_eq!(log.fast_forward[0][1], 6.0);
    }

    #[test]
    fn test_missing_tag_rejected() {
        let mut value = minimal_log();
        value.as_object_mut().unwrap().remove("sysid");
        assert!(matches!(
            ExperimentLog::from_value(&value),
            Err(Error::SchemaMismatch(_))
        ));
    }

    #[test]
    fn test_unknown_test_rejected() {
        let mut value = minimal_log();
        value["test"] = json!("Quadcopter");
        assert!(matches!(
            ExperimentLog::from_value(&value),
            Err(Error::UnknownAnalysisType(_))
        ));
    }

    #[test]
    fn test_wrong_arity_rejected() {
        let mut value = minimal_log();
        // Drivetrain rows must have 9 columns; these have 4
        value["test"] = json!("Drivetrain");
        assert!(matches!(
            ExperimentLog::from_value(&value),
            Err(Error::SchemaMismatch(_))
        ));
    }

    #[test]
    fn test_missing_run_rejected() {
        let mut value = minimal_log();
        value.as_object_mut().unwrap().remove("fast-backward");
        assert!(matches!(
            ExperimentLog::from_value(&value),
            Err(Error::SchemaMismatch(_))
        ));
    }
}
