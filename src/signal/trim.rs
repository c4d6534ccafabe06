//! Run trimming.
//!
//! Quasistatic ramps carry useful information only while the mechanism is
//! actually moving under power; step tests only during the acceleration
//! transient. Both trims cut a run down to its informative portion before
//! any model fitting sees it.

use std::cmp::Ordering;

use crate::core::error::{Error, Result};
use crate::core::types::{PreparedData, RawSample};
use crate::signal::noise::noise_floor;

/// Voltages below this are treated as an unpowered mechanism.
const VOLTAGE_EPSILON: f64 = 1e-9;

/// Whether a quasistatic point is active: powered and moving at or above
/// the motion threshold.
pub(crate) fn is_quasistatic_active(voltage: f64, velocity: f64, motion_threshold: f64) -> bool {
    voltage.abs() > VOLTAGE_EPSILON && velocity.abs() >= motion_threshold
}

/// Trim a quasistatic run in place.
///
/// Erases every point that is unpowered or slower than `motion_threshold`,
/// preserving the order of the survivors. Surviving points all satisfy
/// `|velocity| >= motion_threshold`.
pub fn trim_quasistatic(data: &mut Vec<RawSample>, motion_threshold: f64) {
    data.retain(|pt| is_quasistatic_active(pt.voltage, pt.velocity, motion_threshold));
}

/// Trim a step-test run in place to its acceleration transient.
///
/// The trim proceeds in stages:
///
/// 1. drop leading points slower than `velocity_threshold` (the mechanism
///    has not started moving yet);
/// 2. estimate the acceleration noise floor over the moving portion;
/// 3. drop everything before the acceleration peak, which marks the
///    voltage step;
/// 4. drop the tail after the last point whose acceleration still exceeds
///    the noise floor, where the transient has decayed away.
///
/// When `step_test_duration` is zero it is set to the observed transient
/// duration, measured from the start of motion; otherwise the run is
/// further truncated to `min(step_test_duration, max_step_time)` past the
/// peak. Returns the smaller of `min_step_time` and this run's delay from
/// motion start to the acceleration peak.
///
/// Fails with `InsufficientData` if any stage empties the run.
pub fn trim_step_voltage(
    data: &mut Vec<PreparedData>,
    velocity_threshold: f64,
    noise_window: usize,
    step_test_duration: &mut f64,
    min_step_time: f64,
    max_step_time: f64,
) -> Result<f64> {
    // Start of motion.
    let first_moving = data
        .iter()
        .position(|pt| pt.velocity.abs() >= velocity_threshold)
        .ok_or(Error::InsufficientData(
            "step run never crossed the velocity threshold",
        ))?;
    data.drain(..first_moving);
    let motion_start = data[0].timestamp;

    let floor = noise_floor(data, noise_window, |pt| pt.acceleration);

    // The voltage step produces the largest acceleration of the run.
    let peak = data
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| {
            a.acceleration
                .abs()
                .partial_cmp(&b.acceleration.abs())
                .unwrap_or(Ordering::Equal)
        })
        .map(|(i, _)| i)
        .ok_or(Error::InsufficientData("step run is empty"))?;
    data.drain(..peak);

    // End of the useful transient.
    let last_above = data
        .iter()
        .rposition(|pt| pt.acceleration.abs() > floor)
        .ok_or(Error::InsufficientData(
            "no acceleration transient above the noise floor",
        ))?;
    data.truncate(last_above + 1);

    let last_timestamp = match data.last() {
        Some(pt) => pt.timestamp,
        None => return Err(Error::InsufficientData("step trim emptied the run")),
    };

    if *step_test_duration > 0.0 {
        let cutoff = data[0].timestamp + step_test_duration.min(max_step_time);
        data.retain(|pt| pt.timestamp <= cutoff);
    } else {
        *step_test_duration = last_timestamp - motion_start;
    }

    Ok(min_step_time.min(data[0].timestamp - motion_start))
}
