//! Ordinary least squares.
//!
//! Solves the over-determined system `X b = y` through the normal
//! equations `(X^T X) b = X^T y`. The regressor count here is at most
//! four, so a dense Cholesky factorization of the normal matrix is both
//! the simplest and the fastest option.

use crate::core::error::{Error, Result};

/// Result of a least-squares fit.
#[derive(Debug, Clone)]
pub struct OlsFit {
    /// Fitted coefficients, one per regressor column
    pub coefficients: Vec<f64>,
    /// Root-mean-square residual, in units of `y`
    pub rmse: f64,
    /// Coefficient of determination, 1 for a perfect fit
    pub r_squared: f64,
}

/// Fit `y ~ X b` by ordinary least squares.
///
/// `x` is the row-major regressor matrix with `num_vars` columns; `y` is
/// the target vector. Fails with `SingularNormalMatrix` when the regressor
/// columns are linearly dependent.
pub fn ols(x: &[f64], y: &[f64], num_vars: usize) -> Result<OlsFit> {
    let n = y.len();
    assert!(num_vars > 0, "at least one regressor column is required");
    assert_eq!(x.len(), n * num_vars, "regressor matrix shape mismatch");
    if n < num_vars {
        return Err(Error::InsufficientData("fewer samples than regressors"));
    }

    // Normal matrix X^T X (row-major, symmetric) and X^T y.
    let mut xtx = vec![0.0f64; num_vars * num_vars];
    let mut xty = vec![0.0f64; num_vars];
    for (row, &target) in x.chunks_exact(num_vars).zip(y) {
        for i in 0..num_vars {
            for j in 0..num_vars {
                xtx[i * num_vars + j] += row[i] * row[j];
            }
            xty[i] += row[i] * target;
        }
    }

    let coefficients =
        cholesky_solve(&xtx, &xty, num_vars).ok_or(Error::SingularNormalMatrix)?;

    // Fit diagnostics.
    let mean = y.iter().sum::<f64>() / n as f64;
    let mut ss_residual = 0.0;
    let mut ss_total = 0.0;
    for (row, &target) in x.chunks_exact(num_vars).zip(y) {
        let predicted: f64 = row.iter().zip(&coefficients).map(|(a, b)| a * b).sum();
        ss_residual += (target - predicted) * (target - predicted);
        ss_total += (target - mean) * (target - mean);
    }

    let rmse = (ss_residual / n as f64).sqrt();
    let r_squared = if ss_total > 0.0 {
        1.0 - ss_residual / ss_total
    } else {
        1.0
    };

    Ok(OlsFit {
        coefficients,
        rmse,
        r_squared,
    })
}

/// Solve the symmetric positive-definite system `A x = b` by Cholesky
/// decomposition `A = L L^T` with forward and backward substitution.
///
/// Returns `None` when a pivot is not positive, which for a normal matrix
/// means the regressors are linearly dependent.
fn cholesky_solve(a: &[f64], b: &[f64], dim: usize) -> Option<Vec<f64>> {
    let mut l = vec![0.0f64; dim * dim];

    for i in 0..dim {
        for j in 0..=i {
            let mut sum = a[i * dim + j];
            for k in 0..j {
                sum -= l[i * dim + k] * l[j * dim + k];
            }

            if i == j {
                if sum <= 0.0 {
                    return None;
                }
                l[i * dim + j] = sum.sqrt();
            } else {
                l[i * dim + j] = sum / l[j * dim + j];
            }
        }
    }

    // Forward substitution: L y = b
    let mut y = vec![0.0f64; dim];
    for i in 0..dim {
        let mut sum = b[i];
        for j in 0..i {
            sum -= l[i * dim + j] * y[j];
        }
        y[i] = sum / l[i * dim + i];
    }

    // Backward substitution: L^T x = y
    let mut x = vec![0.0f64; dim];
    for i in (0..dim).rev() {
        let mut sum = y[i];
        for j in i + 1..dim {
            sum -= l[j * dim + i] * x[j];
        }
        x[i] = sum / l[i * dim + i];
    }

    Some(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_exact_recovery() {
        // y = 2 + 3 x1 - x2, noise free
        let mut x = Vec::new();
        let mut y = Vec::new();
        for i in 0..20 {
            let x1 = i as f64 * 0.37;
            let x2 = (i as f64 * 1.7).sin();
            x.extend_from_slice(&[1.0, x1, x2]);
            y.push(2.0 + 3.0 * x1 - x2);
        }

        let fit = ols(&x, &y, 3).unwrap();
        assert_relative_eq!(fit.coefficients[0], 2.0, max_relative = 1e-9);
        assert_relative_eq!(fit.coefficients[1], 3.0, max_relative = 1e-9);
        assert_relative_eq!(fit.coefficients[2], -1.0, max_relative = 1e-9);
        assert_relative_eq!(fit.r_squared, 1.0, epsilon = 1e-9);
        assert!(fit.rmse < 1e-9);
    }

    #[test]
    fn test_residual_statistics() {
        // y = x with a constant +1 error on half the points
        let mut x = Vec::new();
        let mut y = Vec::new();
        for i in 0..100 {
            let xi = i as f64;
            x.push(xi);
            y.push(xi + if i % 2 == 0 { 1.0 } else { 0.0 });
        }

        let fit = ols(&x, &y, 1).unwrap();
        assert!(fit.rmse > 0.0);
        assert!(fit.r_squared > 0.99);
        assert!(fit.r_squared < 1.0);
    }

    #[test]
    fn test_duplicate_columns_singular() {
        let mut x = Vec::new();
        let mut y = Vec::new();
        for i in 0..10 {
            let xi = i as f64;
            x.extend_from_slice(&[xi, xi]);
            y.push(2.0 * xi);
        }
        assert!(matches!(
            ols(&x, &y, 2),
            Err(Error::SingularNormalMatrix)
        ));
    }

    #[test]
    fn test_underdetermined_fails() {
        let x = [1.0, 2.0, 3.0];
        let y = [1.0];
        assert!(matches!(
            ols(&x, &y, 3),
            Err(Error::InsufficientData(_))
        ));
    }
}
