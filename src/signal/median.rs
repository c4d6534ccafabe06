//! Sliding median filter for the velocity channel.
//!
//! Encoder velocity readings carry impulsive quantization noise that a
//! moving average would smear across neighboring samples. A median filter
//! rejects isolated spikes while leaving monotone segments untouched.

use crate::core::error::{Error, Result};
use crate::core::types::RawSample;

/// Apply a sliding median filter to the velocity channel.
///
/// Each output point is the input point at the window center with its
/// velocity replaced by the median of the surrounding window. The first and
/// last `(window - 1) / 2` points have no full window and are dropped, so
/// the output is shorter than the input by `window - 1` points.
///
/// # Arguments
///
/// * `data` - Input run, in timestamp order
/// * `window` - Window width; must be odd and at least 3
pub fn apply_median_filter(data: &[RawSample], window: usize) -> Result<Vec<RawSample>> {
    if window < 3 || window % 2 == 0 {
        return Err(Error::InvalidSettings(format!(
            "median filter window must be odd and >= 3, got {window}"
        )));
    }
    if data.len() < window {
        return Err(Error::InsufficientData(
            "fewer samples than the median filter window",
        ));
    }

    let half = (window - 1) / 2;
    let mut scratch = vec![0.0f64; window];
    let mut filtered = Vec::with_capacity(data.len() - 2 * half);

    for i in half..data.len() - half {
        for (slot, pt) in scratch.iter_mut().zip(&data[i - half..=i + half]) {
            *slot = pt.velocity;
        }
        scratch.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        filtered.push(RawSample {
            velocity: scratch[half],
            ..data[i]
        });
    }

    Ok(filtered)
}
