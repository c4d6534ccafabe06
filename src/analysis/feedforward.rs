//! Feedforward model fitting.
//!
//! The feedforward model predicts the voltage needed for a desired motion
//! state. All mechanisms share the static-friction and viscous terms; the
//! elevator adds a constant gravity term and the arm a cosine gravity
//! term:
//!
//! ```text
//! Simple / Drivetrain:  V = Ks sgn(v) + Kv v + Ka a
//! Elevator:             V = Ks sgn(v) + Kg + Kv v + Ka a
//! Arm:                  V = Ks sgn(v) + Kcos cos(θ) + Kv v + Ka a
//! ```

use crate::analysis::ols::ols;
use crate::core::error::{Error, Result};
use crate::core::types::{Dataset, MechanismTest, PreparedData};

/// Fitted feedforward model.
///
/// `coefficients` is ordered `[Ks, Kv, Ka]` for 3-variable mechanisms and
/// `[Ks, Kg|Kcos, Kv, Ka]` for the elevator and arm; the accessors index
/// by the mechanism's layout.
#[derive(Debug, Clone)]
pub struct FeedforwardFit {
    /// Mechanism family the fit was computed for
    pub mechanism: MechanismTest,
    /// Fitted gains in the mechanism's layout order
    pub coefficients: Vec<f64>,
    /// Root-mean-square voltage residual
    pub rmse: f64,
    /// Coefficient of determination
    pub r_squared: f64,
}

impl FeedforwardFit {
    /// Static friction gain, volts.
    pub fn ks(&self) -> f64 {
        self.coefficients[0]
    }

    /// Velocity gain, volts per unit/s.
    pub fn kv(&self) -> f64 {
        self.coefficients[self.mechanism.independent_variables() - 2]
    }

    /// Acceleration gain, volts per unit/s^2.
    pub fn ka(&self) -> f64 {
        self.coefficients[self.mechanism.independent_variables() - 1]
    }

    /// Gravity gain in volts; elevator only.
    pub fn kg(&self) -> Option<f64> {
        match self.mechanism {
            MechanismTest::Elevator => Some(self.coefficients[1]),
            _ => None,
        }
    }

    /// Cosine gravity gain in volts; arm only.
    pub fn kcos(&self) -> Option<f64> {
        match self.mechanism {
            MechanismTest::Arm => Some(self.coefficients[1]),
            _ => None,
        }
    }
}

/// Sign of a velocity, with exact zero mapping to zero.
fn sign(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

fn push_regressors(row: &mut Vec<f64>, pt: &PreparedData, mechanism: MechanismTest) {
    row.push(sign(pt.velocity));
    match mechanism {
        MechanismTest::Elevator => row.push(1.0),
        MechanismTest::Arm => row.push(pt.cos),
        _ => {}
    }
    row.push(pt.velocity);
    row.push(pt.acceleration);
}

/// Fit the feedforward model over a dataset.
///
/// Both the quasistatic and the dynamic run contribute rows: the ramp
/// pins the friction and viscous terms, the step pins the acceleration
/// term.
pub fn calculate_feedforward_gains(
    dataset: &Dataset,
    mechanism: MechanismTest,
) -> Result<FeedforwardFit> {
    let num_vars = mechanism.independent_variables();
    let points = dataset.quasistatic.iter().chain(dataset.dynamic.iter());

    let mut x = Vec::with_capacity(dataset.len() * num_vars);
    let mut y = Vec::with_capacity(dataset.len());
    for pt in points {
        push_regressors(&mut x, pt, mechanism);
        y.push(pt.voltage);
    }

    if y.len() < num_vars {
        return Err(Error::InsufficientData(
            "dataset has fewer points than feedforward variables",
        ));
    }

    let fit = ols(&x, &y, num_vars)?;
    log::debug!(
        "feedforward fit for {}: rmse = {:.4} V, r^2 = {:.4}",
        mechanism,
        fit.rmse,
        fit.r_squared
    );

    Ok(FeedforwardFit {
        mechanism,
        coefficients: fit.coefficients,
        rmse: fit.rmse,
        r_squared: fit.r_squared,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Build a dataset straight from the model, splitting low and high
    /// acceleration points between the quasistatic and dynamic runs.
    fn synthetic_dataset(
        mechanism: MechanismTest,
        model: impl Fn(f64, f64, f64, f64) -> f64,
    ) -> Dataset {
        let mut quasistatic = Vec::new();
        let mut dynamic = Vec::new();

        for i in 0..240 {
            let t = i as f64 * 0.005;
            let direction = if i % 2 == 0 { 1.0 } else { -1.0 };
            let position = (i as f64 * 0.11).sin();
            let velocity = direction * (0.3 + (i % 40) as f64 * 0.12);
            let acceleration = if i < 120 {
                direction * 0.05
            } else {
                direction * (0.8 + (i % 17) as f64 * 0.31)
            };
            let cos = position.cos();

            let pt = PreparedData {
                timestamp: t,
                voltage: model(sign(velocity), cos, velocity, acceleration),
                position,
                velocity,
                dt: 0.005,
                acceleration,
                cos,
            };
            if i < 120 {
                quasistatic.push(pt);
            } else {
                dynamic.push(pt);
            }
        }

        Dataset::new(quasistatic, dynamic)
    }

    #[test]
    fn test_simple_recovery() {
        let dataset = synthetic_dataset(MechanismTest::Simple, |sgn, _cos, v, a| {
            0.6 * sgn + 2.1 * v + 0.35 * a
        });
        let fit = calculate_feedforward_gains(&dataset, MechanismTest::Simple).unwrap();

        assert_relative_eq!(fit.ks(), 0.6, max_relative = 1e-8);
        assert_relative_eq!(fit.kv(), 2.1, max_relative = 1e-8);
        assert_relative_eq!(fit.ka(), 0.35, max_relative = 1e-8);
        assert_relative_eq!(fit.r_squared, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_elevator_recovery() {
        let dataset = synthetic_dataset(MechanismTest::Elevator, |sgn, _cos, v, a| {
            0.4 * sgn + 1.1 + 1.9 * v + 0.28 * a
        });
        let fit = calculate_feedforward_gains(&dataset, MechanismTest::Elevator).unwrap();

        assert_relative_eq!(fit.ks(), 0.4, max_relative = 1e-8);
        assert_relative_eq!(fit.kg().unwrap(), 1.1, max_relative = 1e-8);
        assert_relative_eq!(fit.kv(), 1.9, max_relative = 1e-8);
        assert_relative_eq!(fit.ka(), 0.28, max_relative = 1e-8);
        assert!(fit.kcos().is_none());
    }

    #[test]
    fn test_arm_recovery() {
        let dataset = synthetic_dataset(MechanismTest::Arm, |sgn, cos, v, a| {
            0.5 * sgn + 0.9 * cos + 2.4 * v + 0.31 * a
        });
        let fit = calculate_feedforward_gains(&dataset, MechanismTest::Arm).unwrap();

        assert_relative_eq!(fit.ks(), 0.5, max_relative = 1e-8);
        assert_relative_eq!(fit.kcos().unwrap(), 0.9, max_relative = 1e-8);
        assert_relative_eq!(fit.kv(), 2.4, max_relative = 1e-8);
        assert_relative_eq!(fit.ka(), 0.31, max_relative = 1e-8);
        assert!(fit.kg().is_none());
    }

    #[test]
    fn test_empty_dataset_fails() {
        let dataset = Dataset::default();
        assert!(matches!(
            calculate_feedforward_gains(&dataset, MechanismTest::Simple),
            Err(Error::InsufficientData(_))
        ));
    }
}
