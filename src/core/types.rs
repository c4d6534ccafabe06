//! Core data types for mechanism characterization.
//!
//! An experiment log holds four test runs (slow/fast, forward/backward).
//! Each run is conditioned into a sequence of [`PreparedData`] points, and
//! runs are paired into [`Dataset`]s keyed by [`DatasetKey`].

use serde::{Deserialize, Serialize};

use crate::core::error::{Error, Result};

/// Labels of the four canonical test runs, in storage order.
///
/// Slow runs are quasistatic voltage ramps; fast runs are voltage steps.
pub const RUN_LABELS: [&str; 4] = [
    "slow-forward",
    "slow-backward",
    "fast-forward",
    "fast-backward",
];

/// One channel of a raw test run sample.
///
/// General mechanisms log one channel per sample; drivetrain rows carry a
/// left, a right, and (for angular tests) a heading channel, each of which
/// projects to a `RawSample`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    /// Timestamp in seconds
    pub timestamp: f64,
    /// Applied voltage in volts, sign-aligned with velocity
    pub voltage: f64,
    /// Position in output units
    pub position: f64,
    /// Velocity in output units per second
    pub velocity: f64,
}

/// A conditioned sample ready for model fitting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PreparedData {
    /// Timestamp in seconds
    pub timestamp: f64,
    /// Applied voltage in volts, sign-aligned with velocity
    pub voltage: f64,
    /// Position in output units
    pub position: f64,
    /// Velocity in output units per second
    pub velocity: f64,
    /// Interval to the next sample in seconds
    pub dt: f64,
    /// Central finite-difference acceleration estimate
    pub acceleration: f64,
    /// Cosine of the position angle (arm mechanisms only, else 0)
    pub cos: f64,
}

/// A pair of conditioned runs: the quasistatic ramp and the dynamic step.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    /// Points from the slow (ramp) tests
    pub quasistatic: Vec<PreparedData>,
    /// Points from the fast (step) tests
    pub dynamic: Vec<PreparedData>,
}

impl Dataset {
    /// Create a dataset from a quasistatic and a dynamic run.
    pub fn new(quasistatic: Vec<PreparedData>, dynamic: Vec<PreparedData>) -> Self {
        Self {
            quasistatic,
            dynamic,
        }
    }

    /// Total number of points across both runs.
    pub fn len(&self) -> usize {
        self.quasistatic.len() + self.dynamic.len()
    }

    /// True when both runs are empty.
    pub fn is_empty(&self) -> bool {
        self.quasistatic.is_empty() && self.dynamic.is_empty()
    }
}

/// Key identifying a published dataset.
///
/// Every mechanism publishes `Forward`, `Backward`, and `Combined`. The
/// linear drivetrain additionally publishes the side-qualified keys, where
/// the unqualified keys hold the merged left-then-right data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatasetKey {
    Forward,
    Backward,
    Combined,
    LeftForward,
    LeftBackward,
    LeftCombined,
    RightForward,
    RightBackward,
    RightCombined,
}

impl DatasetKey {
    /// Display name matching the collector UI.
    pub fn display_name(&self) -> &'static str {
        match self {
            DatasetKey::Forward => "Forward",
            DatasetKey::Backward => "Backward",
            DatasetKey::Combined => "Combined",
            DatasetKey::LeftForward => "Left Forward",
            DatasetKey::LeftBackward => "Left Backward",
            DatasetKey::LeftCombined => "Left Combined",
            DatasetKey::RightForward => "Right Forward",
            DatasetKey::RightBackward => "Right Backward",
            DatasetKey::RightCombined => "Right Combined",
        }
    }

    /// Parse a key from a user-facing name.
    ///
    /// Accepts the display names case-insensitively, with spaces or dashes.
    pub fn from_name(name: &str) -> Result<Self> {
        let normalized = name.trim().to_ascii_lowercase().replace('-', " ");
        match normalized.as_str() {
            "forward" => Ok(DatasetKey::Forward),
            "backward" => Ok(DatasetKey::Backward),
            "combined" => Ok(DatasetKey::Combined),
            "left forward" => Ok(DatasetKey::LeftForward),
            "left backward" => Ok(DatasetKey::LeftBackward),
            "left combined" => Ok(DatasetKey::LeftCombined),
            "right forward" => Ok(DatasetKey::RightForward),
            "right backward" => Ok(DatasetKey::RightBackward),
            "right combined" => Ok(DatasetKey::RightCombined),
            _ => Err(Error::InvalidSettings(format!("unknown dataset {name:?}"))),
        }
    }
}

impl std::fmt::Display for DatasetKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// The mechanism family under test.
///
/// Each family fixes the number of independent feedforward variables and
/// the column count of the raw log rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MechanismTest {
    /// Flywheel or other simple motorized load
    Simple,
    /// Vertical elevator (constant gravity term)
    Elevator,
    /// Single-jointed arm (cosine gravity term)
    Arm,
    /// Differential drivetrain, straight-line test
    Drivetrain,
    /// Differential drivetrain, rotation-in-place test
    DrivetrainAngular,
}

impl MechanismTest {
    /// Number of independent variables in the feedforward fit.
    pub fn independent_variables(&self) -> usize {
        match self {
            MechanismTest::Simple => 3,
            MechanismTest::Elevator => 4,
            MechanismTest::Arm => 4,
            MechanismTest::Drivetrain => 3,
            MechanismTest::DrivetrainAngular => 3,
        }
    }

    /// Number of columns in each raw log row.
    pub fn raw_columns(&self) -> usize {
        match self {
            MechanismTest::Simple | MechanismTest::Elevator | MechanismTest::Arm => 4,
            MechanismTest::Drivetrain | MechanismTest::DrivetrainAngular => 9,
        }
    }

    /// Display name matching the log's `test` tag.
    pub fn display_name(&self) -> &'static str {
        match self {
            MechanismTest::Simple => "Simple",
            MechanismTest::Elevator => "Elevator",
            MechanismTest::Arm => "Arm",
            MechanismTest::Drivetrain => "Drivetrain",
            MechanismTest::DrivetrainAngular => "Drivetrain (Angular)",
        }
    }

    /// Parse the log's `test` tag.
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "Simple" => Ok(MechanismTest::Simple),
            "Elevator" => Ok(MechanismTest::Elevator),
            "Arm" => Ok(MechanismTest::Arm),
            "Drivetrain" => Ok(MechanismTest::Drivetrain),
            "Drivetrain (Angular)" => Ok(MechanismTest::DrivetrainAngular),
            _ => Err(Error::UnknownAnalysisType(name.to_string())),
        }
    }
}

impl std::fmt::Display for MechanismTest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Measurement unit of the log's position and velocity channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Radians,
    Degrees,
    Rotations,
    Meters,
    Feet,
    Inches,
}

impl Unit {
    /// Display name matching the log's `units` tag.
    pub fn display_name(&self) -> &'static str {
        match self {
            Unit::Radians => "Radians",
            Unit::Degrees => "Degrees",
            Unit::Rotations => "Rotations",
            Unit::Meters => "Meters",
            Unit::Feet => "Feet",
            Unit::Inches => "Inches",
        }
    }

    /// Parse the log's `units` tag.
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "Radians" => Ok(Unit::Radians),
            "Degrees" => Ok(Unit::Degrees),
            "Rotations" => Ok(Unit::Rotations),
            "Meters" => Ok(Unit::Meters),
            "Feet" => Ok(Unit::Feet),
            "Inches" => Ok(Unit::Inches),
            _ => Err(Error::UnknownUnit(name.to_string())),
        }
    }

    /// Convert a position in this unit to radians.
    ///
    /// Returns `None` for linear units, whose cosine term is meaningless.
    pub fn position_to_radians(&self, position: f64) -> Option<f64> {
        match self {
            Unit::Radians => Some(position),
            Unit::Degrees => Some(position.to_radians()),
            Unit::Rotations => Some(position * std::f64::consts::TAU),
            Unit::Meters | Unit::Feet | Unit::Inches => None,
        }
    }
}

impl std::fmt::Display for Unit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}
