//! Acceleration estimation from the velocity channel.

use crate::core::error::{Error, Result};
use crate::core::types::{PreparedData, RawSample};

/// Estimate acceleration for a run and produce conditioned samples.
///
/// Acceleration at index `i` is the symmetric difference quotient
/// `(v[i + s] - v[i - s]) / (t[i + s] - t[i - s])` with `s = window / 2`;
/// the first and last `s` points have no full window and are dropped.
///
/// Repeated encoder velocity readings produce exact-zero quotients that
/// carry no information about the plant, so those points are discarded
/// rather than fitted.
pub fn compute_acceleration(data: &[RawSample], window: usize) -> Result<Vec<PreparedData>> {
    let step = window / 2;
    if data.len() <= window {
        return Err(Error::InsufficientData(
            "run shorter than the acceleration window; raise the test duration \
             or lower the motion threshold",
        ));
    }

    let mut prepared = Vec::with_capacity(data.len() - 2 * step);
    for i in step..data.len() - step {
        let pt = data[i];
        let acceleration = (data[i + step].velocity - data[i - step].velocity)
            / (data[i + step].timestamp - data[i - step].timestamp);
        if acceleration == 0.0 {
            continue;
        }

        prepared.push(PreparedData {
            timestamp: pt.timestamp,
            voltage: pt.voltage,
            position: pt.position,
            velocity: pt.velocity,
            dt: data[i + 1].timestamp - pt.timestamp,
            acceleration,
            cos: 0.0,
        });
    }
    Ok(prepared)
}
