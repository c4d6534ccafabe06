//! Track-width estimation for differential drivetrains.
//!
//! During a rotation-in-place test the wheels trace arcs of the turning
//! circle, so the effective lateral wheel separation follows from the arc
//! lengths and the heading change. Differential drive kinematics give
//! `dtheta = (dr - dl) / track_width`; with the sides driven in opposite
//! directions the magnitudes add.

use crate::core::error::{Error, Result};

/// Heading changes below this cannot support a track-width estimate.
const HEADING_EPSILON: f64 = 1e-9;

/// Estimate the track width from a rotation test's endpoint deltas.
///
/// `left_delta` and `right_delta` are the wheel displacements over the
/// run; `heading_delta` is the heading change in radians. The result is
/// `(|left| + |right|) / |heading|`, invariant under reversing the
/// rotation direction.
pub fn calculate_track_width(
    left_delta: f64,
    right_delta: f64,
    heading_delta: f64,
) -> Result<f64> {
    if heading_delta.abs() < HEADING_EPSILON {
        return Err(Error::ZeroHeadingChange);
    }
    Ok((left_delta.abs() + right_delta.abs()) / heading_delta.abs())
}
