//! Legacy characterization-log converter.
//!
//! Older collectors wrote a schema without the `"sysid"` tag, with wider
//! rows carrying battery voltage and the commanded autospeed alongside the
//! measurements:
//!
//! - drivetrain rows: `[t, battery, autospeed, Vl, Vr, pl, pr, vl, vr, heading]`
//! - general rows: `[t, battery, autospeed, V, p, v]`
//!
//! The converter rewrites such a file into the native schema, keeping only
//! the measurement columns. The legacy format recorded positions and
//! velocities in rotations, so the output is tagged `Rotations` with a
//! unit factor of 1. Heading is carried into the native heading column;
//! the legacy schema had no angular rate channel, so that column is
//! zeroed.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{json, Value};

use crate::core::error::{Error, Result};
use crate::core::types::RUN_LABELS;

// Legacy column indices.
const LEGACY_TIME: usize = 0;
const LEGACY_LEFT_VOLTS: usize = 3;
const LEGACY_RIGHT_VOLTS: usize = 4;
const LEGACY_LEFT_POS: usize = 5;
const LEGACY_RIGHT_POS: usize = 6;
const LEGACY_LEFT_VEL: usize = 7;
const LEGACY_RIGHT_VEL: usize = 8;
const LEGACY_HEADING: usize = 9;

const LEGACY_VOLTS: usize = 3;
const LEGACY_POS: usize = 4;
const LEGACY_VEL: usize = 5;

/// Convert a legacy log into the native schema.
///
/// Writes `<input stem>.sysid.json` next to the input and returns that
/// path. Pure translation: the input file is left untouched.
pub fn convert_legacy_log(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.display().to_string(),
        source,
    })?;
    let legacy: Value = serde_json::from_str(&text)?;

    if legacy.get("sysid").is_some() {
        return Err(Error::SchemaMismatch(
            "file is already a native log".to_string(),
        ));
    }
    let test = legacy
        .get("test")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::SchemaMismatch("missing or non-string \"test\"".to_string()))?;
    let drivetrain = test.eq_ignore_ascii_case("drivetrain");

    let mut native = json!({
        "sysid": "Converted",
        "test": if drivetrain { "Drivetrain" } else { "Simple" },
        "units": "Rotations",
        "unitsPerRotation": 1.0,
    });

    for label in RUN_LABELS {
        let raw = legacy
            .get(label)
            .ok_or_else(|| Error::SchemaMismatch(format!("missing run {label:?}")))?;
        let rows: Vec<Vec<f64>> = serde_json::from_value(raw.clone())?;

        let converted: Vec<Vec<f64>> = rows
            .iter()
            .enumerate()
            .map(|(i, row)| convert_row(row, drivetrain, label, i))
            .collect::<Result<_>>()?;
        native[label] = json!(converted);
    }

    let output = path.with_extension("sysid.json");
    let pretty = serde_json::to_string_pretty(&native)?;
    fs::write(&output, pretty).map_err(|source| Error::Io {
        path: output.display().to_string(),
        source,
    })?;

    log::info!("converted {} -> {}", path.display(), output.display());
    Ok(output)
}

fn convert_row(row: &[f64], drivetrain: bool, label: &str, index: usize) -> Result<Vec<f64>> {
    if drivetrain {
        if row.len() <= LEGACY_HEADING {
            return Err(Error::SchemaMismatch(format!(
                "run {label:?} row {index} has {} columns, legacy drivetrain rows have 10",
                row.len()
            )));
        }
        Ok(vec![
            row[LEGACY_TIME],
            row[LEGACY_LEFT_VOLTS],
            row[LEGACY_RIGHT_VOLTS],
            row[LEGACY_LEFT_POS],
            row[LEGACY_RIGHT_POS],
            row[LEGACY_LEFT_VEL],
            row[LEGACY_RIGHT_VEL],
            row[LEGACY_HEADING],
            0.0,
        ])
    } else {
        if row.len() <= LEGACY_VEL {
            return Err(Error::SchemaMismatch(format!(
                "run {label:?} row {index} has {} columns, legacy general rows have 6",
                row.len()
            )));
        }
        Ok(vec![
            row[LEGACY_TIME],
            row[LEGACY_VOLTS],
            row[LEGACY_POS],
            row[LEGACY_VEL],
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::MechanismTest;
    use crate::io::log_file::ExperimentLog;
    use serde_json::json;

    fn write_temp(name: &str, value: &Value) -> PathBuf {
        let path = std::env::temp_dir().join(name);
        fs::write(&path, serde_json::to_string(value).unwrap()).unwrap();
        path
    }

    #[test]
    fn test_drivetrain_conversion_loads_natively() {
        let row = |t: f64| vec![t, 12.0, 0.5, 3.0, 3.1, 1.0, 1.1, 2.0, 2.1, 0.25];
        let legacy = json!({
            "test": "Drivetrain",
            "units": "Rotations",
            "slow-forward":  [row(0.0), row(0.1)],
            "slow-backward": [row(0.0)],
            "fast-forward":  [row(0.0)],
            "fast-backward": [row(0.0)],
        });
        let input = write_temp("yantra_legacy_drivetrain.json", &legacy);

        let output = convert_legacy_log(&input).unwrap();
        let log = ExperimentLog::load(&output).unwrap();

        assert_eq!(log.mechanism, MechanismTest::Drivetrain);
        assert_eq!(log.units_per_rotation, 1.0);
        // [t, Vl, Vr, pl, pr, vl, vr, heading, rate]
        let first = &log.slow_forward[0];
        assert_eq!(first.len(), 9);
        assert_eq!(first[1], 3.0);
        assert_eq!(first[2], 3.1);
        assert_eq!(first[7], 0.25);
        assert_eq!(first[8], 0.0);
    }

    #[test]
    fn test_general_conversion() {
        let row = |t: f64| vec![t, 12.0, 0.5, 2.5, 10.0, 4.0];
        let legacy = json!({
            "test": "Arm",
            "slow-forward":  [row(0.0)],
            "slow-backward": [row(0.0)],
            "fast-forward":  [row(0.0)],
            "fast-backward": [row(0.0)],
        });
        let input = write_temp("yantra_legacy_arm.json", &legacy);

        let output = convert_legacy_log(&input).unwrap();
        let log = ExperimentLog::load(&output).unwrap();

        // Legacy non-drivetrain tests convert as Simple; re-tagging as
        // Arm or Elevator is up to the operator.
        assert_eq!(log.mechanism, MechanismTest::Simple);
        assert_eq!(log.slow_forward[0], vec![0.0, 2.5, 10.0, 4.0]);
    }

    #[test]
    fn test_native_input_rejected() {
        let native = json!({
            "sysid": "2024.1.0",
            "test": "Simple",
        });
        let input = write_temp("yantra_native_input.json", &native);
        assert!(matches!(
            convert_legacy_log(&input),
            Err(Error::SchemaMismatch(_))
        ));
    }

    #[test]
    fn test_short_row_rejected() {
        let legacy = json!({
            "test": "Simple",
            "slow-forward":  [[0.0, 12.0, 0.5]],
            "slow-backward": [],
            "fast-forward":  [],
            "fast-backward": [],
        });
        let input = write_temp("yantra_legacy_short.json", &legacy);
        assert!(matches!(
            convert_legacy_log(&input),
            Err(Error::SchemaMismatch(_))
        ));
    }
}
