//! Central finite-difference derivative filter.
//!
//! Produces the D-th derivative of a uniformly sampled signal using the
//! symmetric N-point stencil. The stencil coefficients are the closed-form
//! central-difference weights, obtained by solving the small Vandermonde
//! system for the stencil offsets.
//!
//! The derivative reported at step `k` corresponds to the center of the
//! window, `(k - (N - 1) / 2) * h`, so the output lags the input by half a
//! window. Order of accuracy is `O(h^(N - D))`.

use std::collections::VecDeque;

use crate::core::error::{Error, Result};

/// Stateful central finite-difference filter.
///
/// Feed samples spaced by `h` through [`calculate`](Self::calculate); once
/// the window has filled, each output estimates the derivative at the
/// window center.
#[derive(Debug, Clone)]
pub struct CentralFiniteDifference {
    coefficients: Vec<f64>,
    buffer: VecDeque<f64>,
}

impl CentralFiniteDifference {
    /// Create a filter computing the `derivative`-th derivative from a
    /// symmetric `samples`-point stencil over inputs spaced by `h` seconds.
    ///
    /// `samples` must be odd and greater than `derivative`; `h` must be
    /// positive.
    pub fn new(derivative: usize, samples: usize, h: f64) -> Result<Self> {
        if samples % 2 == 0 {
            return Err(Error::InvalidSettings(format!(
                "stencil size must be odd, got {samples}"
            )));
        }
        if derivative == 0 || derivative >= samples {
            return Err(Error::InvalidSettings(format!(
                "derivative order {derivative} requires a stencil larger than {samples} points"
            )));
        }
        if h <= 0.0 {
            return Err(Error::InvalidSettings(format!(
                "sample period must be positive, got {h}"
            )));
        }

        let coefficients = stencil_coefficients(derivative, samples, h).ok_or_else(|| {
            Error::InvalidSettings(format!("stencil of {samples} points is too large to solve"))
        })?;
        Ok(Self {
            coefficients,
            buffer: VecDeque::from(vec![0.0; samples]),
        })
    }

    /// Push a sample and return the current derivative estimate.
    ///
    /// The estimate is meaningful once `samples` inputs have been pushed;
    /// earlier outputs reflect the zero-initialized window.
    pub fn calculate(&mut self, input: f64) -> f64 {
        self.buffer.pop_front();
        self.buffer.push_back(input);

        self.coefficients
            .iter()
            .zip(self.buffer.iter())
            .map(|(c, x)| c * x)
            .sum()
    }

    /// Reset the window to zeros.
    pub fn reset(&mut self) {
        for slot in self.buffer.iter_mut() {
            *slot = 0.0;
        }
    }
}

/// Solve for the stencil weights.
///
/// For offsets `s_i = i - (N - 1) / 2`, the weights satisfy
/// `sum_i a_i * s_i^p = p! * [p == D]` for `p = 0..N`, which pins every
/// Taylor term below the truncation order. The Vandermonde system is tiny
/// and its nodes are distinct, so plain Gaussian elimination suffices.
fn stencil_coefficients(derivative: usize, samples: usize, h: f64) -> Option<Vec<f64>> {
    let half = (samples - 1) / 2;

    // Row-major [samples x samples] matrix of offset powers.
    let mut matrix = vec![0.0f64; samples * samples];
    let mut rhs = vec![0.0f64; samples];
    for p in 0..samples {
        for i in 0..samples {
            let offset = i as f64 - half as f64;
            matrix[p * samples + i] = offset.powi(p as i32);
        }
    }
    rhs[derivative] = factorial(derivative);

    let weights = solve_dense(&mut matrix, &mut rhs, samples)?;

    let scale = h.powi(derivative as i32);
    Some(weights.into_iter().map(|w| w / scale).collect())
}

fn factorial(n: usize) -> f64 {
    (1..=n).fold(1.0, |acc, k| acc * k as f64)
}

/// Gaussian elimination with partial pivoting on a row-major square system.
///
/// Consumes the inputs as scratch space. Returns `None` when a pivot
/// vanishes.
fn solve_dense(a: &mut [f64], b: &mut [f64], dim: usize) -> Option<Vec<f64>> {
    for col in 0..dim {
        // Pivot on the largest remaining entry in this column.
        let mut pivot_row = col;
        for row in col + 1..dim {
            if a[row * dim + col].abs() > a[pivot_row * dim + col].abs() {
                pivot_row = row;
            }
        }
        if a[pivot_row * dim + col].abs() < 1e-12 {
            return None;
        }
        if pivot_row != col {
            for k in 0..dim {
                a.swap(col * dim + k, pivot_row * dim + k);
            }
            b.swap(col, pivot_row);
        }

        for row in col + 1..dim {
            let factor = a[row * dim + col] / a[col * dim + col];
            for k in col..dim {
                a[row * dim + k] -= factor * a[col * dim + k];
            }
            b[row] -= factor * b[col];
        }
    }

    // Back substitution.
    let mut x = vec![0.0f64; dim];
    for row in (0..dim).rev() {
        let mut sum = b[row];
        for k in row + 1..dim {
            sum -= a[row * dim + k] * x[k];
        }
        x[row] = sum / a[row * dim + row];
    }
    Some(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Drive the filter over `f` sampled at `h` and check each estimate
    /// against the analytic derivative at the window center, within the
    /// stencil's order of accuracy.
    fn assert_central_results(
        derivative: usize,
        samples: usize,
        f: impl Fn(f64) -> f64,
        dfdx: impl Fn(f64) -> f64,
        h: f64,
        min: f64,
        max: f64,
    ) {
        let mut filter = CentralFiniteDifference::new(derivative, samples, h).unwrap();
        let tolerance = h.powi((samples - derivative) as i32);

        let start = (min / h) as i64;
        let end = (max / h) as i64;
        for i in start..end {
            let output = filter.calculate(f(i as f64 * h));

            // Let the window fill before checking.
            if i < start + samples as i64 {
                continue;
            }

            let center = (i - (samples as i64 - 1) / 2) as f64 * h;
            let error = (output - dfdx(center)).abs();
            assert!(
                error <= tolerance,
                "derivative {derivative} / stencil {samples} at x = {center}: \
                 error {error:.3e} exceeds {tolerance:.3e}"
            );
        }
    }

    #[test]
    fn test_first_derivative_three_point() {
        let h = 0.005;
        assert_central_results(1, 3, |x| x * x, |x| 2.0 * x, h, -20.0, 20.0);
        assert_central_results(1, 3, f64::sin, f64::cos, h, -20.0, 20.0);
        assert_central_results(1, 3, f64::ln, |x| 1.0 / x, h, 1.0, 20.0);
    }

    #[test]
    fn test_second_derivative_five_point() {
        let h = 0.005;
        assert_central_results(2, 5, |x| x * x, |_| 2.0, h, -20.0, 20.0);
        assert_central_results(2, 5, f64::sin, |x| -x.sin(), h, -20.0, 20.0);
    }

    #[test]
    fn test_three_point_weights() {
        // The classic (-1/2, 0, 1/2) / h stencil
        let coeffs = stencil_coefficients(1, 3, 0.01).unwrap();
        assert_relative_eq!(coeffs[0], -50.0, max_relative = 1e-9);
        assert_relative_eq!(coeffs[1], 0.0, epsilon = 1e-9);
        assert_relative_eq!(coeffs[2], 50.0, max_relative = 1e-9);
    }

    #[test]
    fn test_five_point_second_derivative_weights() {
        // (-1/12, 4/3, -5/2, 4/3, -1/12) / h^2
        let h: f64 = 1.0;
        let coeffs = stencil_coefficients(2, 5, h).unwrap();
        let expected = [-1.0 / 12.0, 4.0 / 3.0, -5.0 / 2.0, 4.0 / 3.0, -1.0 / 12.0];
        for (got, want) in coeffs.iter().zip(expected) {
            assert_relative_eq!(*got, want, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(CentralFiniteDifference::new(1, 4, 0.005).is_err());
        assert!(CentralFiniteDifference::new(3, 3, 0.005).is_err());
        assert!(CentralFiniteDifference::new(0, 3, 0.005).is_err());
        assert!(CentralFiniteDifference::new(1, 3, 0.0).is_err());
    }
}
