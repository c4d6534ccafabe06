//! Noise-floor estimation.
//!
//! The step-voltage trim needs to know when an acceleration transient has
//! decayed into measurement noise. The floor is estimated as the RMS
//! deviation of the signal around a short moving average: the average
//! tracks the slow trend, so what remains is the noise amplitude.

use std::collections::VecDeque;

use crate::core::types::PreparedData;

/// Estimate the noise floor of a channel selected by `accessor`.
///
/// A `window`-wide moving average (zero-initialized history) runs over the
/// sequence; each sample `window / 2` behind the average is compared
/// against it, and the squared deviations are RMS-averaged over the run:
///
/// ```text
/// floor = sqrt( sum_{i >= s} (x[i - s] - mean_i)^2 / (n - s) ),  s = window / 2
/// ```
///
/// Returns 0 for runs too short to lag behind the average.
pub fn noise_floor<F>(data: &[PreparedData], window: usize, accessor: F) -> f64
where
    F: Fn(&PreparedData) -> f64,
{
    let step = window / 2;
    if window == 0 || data.len() <= step {
        return 0.0;
    }

    let inv_window = 1.0 / window as f64;
    let mut history = VecDeque::from(vec![0.0f64; window]);
    let mut running_sum = 0.0;
    let mut squared_deviation = 0.0;

    for i in 0..data.len() {
        let x = accessor(&data[i]);
        running_sum += x - history.pop_front().unwrap_or(0.0);
        history.push_back(x);

        if i >= step {
            let mean = running_sum * inv_window;
            let lagged = accessor(&data[i - step]);
            squared_deviation += (lagged - mean) * (lagged - mean);
        }
    }

    (squared_deviation / (data.len() - step) as f64).sqrt()
}
