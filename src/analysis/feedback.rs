//! Feedback gain synthesis from the identified plant.
//!
//! The feedforward fit's `(Kv, Ka)` define a continuous first-order plant
//! for velocity and a double-integrator chain for position:
//!
//! ```text
//! velocity:  dv/dt = -(Kv/Ka) v + (1/Ka) u
//! position:  d/dt [p v] = [[0, 1], [0, -Kv/Ka]] [p v] + [0, 1/Ka] u
//! ```
//!
//! The plant is discretized in closed form at the controller period. The
//! gain then comes from one of two selectable methods: pole placement at
//! the preset's characteristic frequency (a critically damped pole pair),
//! or the discrete linear-quadratic regulator with Bryson-weighted costs.
//! Either way, measurement latency is compensated by decaying the gain
//! through the closed-loop dynamics over the delay.

use serde::Deserialize;

use crate::core::error::{Error, Result};

/// Which loop the feedback gains close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackLoopType {
    /// Position loop: PD on position error
    Position,
    /// Velocity loop: P on velocity error
    Velocity,
}

impl FeedbackLoopType {
    /// Parse a user-facing loop name.
    pub fn from_name(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "position" => Ok(FeedbackLoopType::Position),
            "velocity" => Ok(FeedbackLoopType::Velocity),
            _ => Err(Error::InvalidSettings(format!(
                "unknown loop type {name:?}"
            ))),
        }
    }
}

/// How the feedback gains are synthesized from the discretized plant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackGainMethod {
    /// Discrete LQR with Bryson weights from [`LqrParameters`]
    Lqr,
    /// Critically damped poles at the preset's characteristic frequency
    PolePlacement,
}

impl FeedbackGainMethod {
    /// Parse a user-facing method name.
    pub fn from_name(name: &str) -> Result<Self> {
        let normalized = name.trim().to_ascii_lowercase().replace('-', " ");
        match normalized.as_str() {
            "lqr" => Ok(FeedbackGainMethod::Lqr),
            "pole placement" => Ok(FeedbackGainMethod::PolePlacement),
            _ => Err(Error::InvalidSettings(format!(
                "unknown gain method {name:?} (expected lqr or pole-placement)"
            ))),
        }
    }
}

/// Characterization of the controller that will run the gains.
///
/// Covers the controller update period, how its output maps onto applied
/// voltage, whether its derivative term is normalized by the period, how
/// stale its measurements are, and the closed-loop bandwidth targeted by
/// pole placement.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct FeedbackControllerPreset {
    /// Multiplier from volts to the controller's output unit
    pub output_conversion_factor: f64,
    /// Controller update period in seconds
    pub period: f64,
    /// True when the derivative gain is already per-period
    pub normalized: bool,
    /// Position measurement staleness in seconds
    pub position_measurement_delay: f64,
    /// Velocity measurement staleness in seconds
    pub velocity_measurement_delay: f64,
    /// Characteristic frequency in rad/s; pole placement puts a
    /// critically damped pole pair here
    pub characteristic_frequency: f64,
}

impl FeedbackControllerPreset {
    /// Software loop commanding voltage directly at 50 Hz.
    pub fn voltage() -> Self {
        Self {
            output_conversion_factor: 1.0,
            period: 0.02,
            normalized: true,
            position_measurement_delay: 0.0,
            velocity_measurement_delay: 0.0,
            characteristic_frequency: 12.0,
        }
    }

    /// Software loop commanding duty cycle on a 12 V bus at 50 Hz.
    pub fn software() -> Self {
        Self {
            output_conversion_factor: 1.0 / 12.0,
            period: 0.02,
            normalized: true,
            position_measurement_delay: 0.0,
            velocity_measurement_delay: 0.0,
            characteristic_frequency: 12.0,
        }
    }

    /// Embedded motor-controller loop at 1 kHz with filtered measurements.
    ///
    /// The velocity delay models the controller's onboard velocity filter
    /// group delay; the derivative term is an unnormalized difference.
    /// The fast loop supports a higher placement bandwidth.
    pub fn embedded() -> Self {
        Self {
            output_conversion_factor: 1.0 / 12.0,
            period: 0.001,
            normalized: false,
            position_measurement_delay: 0.0025,
            velocity_measurement_delay: 0.010,
            characteristic_frequency: 40.0,
        }
    }
}

impl Default for FeedbackControllerPreset {
    fn default() -> Self {
        Self::voltage()
    }
}

/// Maximum acceptable excursions for the LQR cost.
///
/// Bryson's rule turns each tolerance `q` into a state weight `1/q^2` and
/// the effort bound into the control weight `1/max_effort^2`.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct LqrParameters {
    /// Maximum acceptable position error, output units
    pub q_position: f64,
    /// Maximum acceptable velocity error, output units per second
    pub q_velocity: f64,
    /// Maximum acceptable control effort, volts
    pub max_effort: f64,
}

impl Default for LqrParameters {
    fn default() -> Self {
        Self {
            q_position: 1.0,
            q_velocity: 1.5,
            max_effort: 7.0,
        }
    }
}

/// Synthesized feedback gains.
#[derive(Debug, Clone, Copy)]
pub struct FeedbackGains {
    /// Proportional gain, controller output per unit of error
    pub kp: f64,
    /// Derivative gain; zero for velocity loops
    pub kd: f64,
}

fn check_plant(kv: f64, ka: f64) -> Result<()> {
    if kv <= 0.0 || ka <= 0.0 {
        return Err(Error::NonPhysicalPlant(format!(
            "Kv = {kv:.6}, Ka = {ka:.6}; both must be positive"
        )));
    }
    Ok(())
}

/// Compute position-loop PD gains for the identified plant.
///
/// `enc_factor` converts the gains from output units to sensor counts;
/// pass 1 for gains in output units.
pub fn calculate_position_feedback_gains(
    preset: &FeedbackControllerPreset,
    method: FeedbackGainMethod,
    lqr: &LqrParameters,
    kv: f64,
    ka: f64,
    enc_factor: f64,
) -> Result<FeedbackGains> {
    check_plant(kv, ka)?;
    let t = preset.period;

    // Zero-order-hold discretization of the position chain, closed form.
    let alpha = kv / ka;
    let decay = (-alpha * t).exp();
    let a = [[1.0, (1.0 - decay) / alpha], [0.0, decay]];
    let b = [(t - (1.0 - decay) / alpha) / kv, (1.0 - decay) / kv];

    let mut k = match method {
        FeedbackGainMethod::Lqr => {
            let q = [
                1.0 / (lqr.q_position * lqr.q_position),
                1.0 / (lqr.q_velocity * lqr.q_velocity),
            ];
            let r = 1.0 / (lqr.max_effort * lqr.max_effort);
            dare_gain_two_state(a, b, q, r)?
        }
        FeedbackGainMethod::PolePlacement => {
            let pole = (-preset.characteristic_frequency * t).exp();
            place_poles_two_state(a, b, pole)?
        }
    };

    if preset.position_measurement_delay > 0.0 {
        k = compensate_latency_two_state(a, b, k, preset.position_measurement_delay / t);
    }

    let output_scale = preset.output_conversion_factor / enc_factor;
    let kd_period = if preset.normalized { 1.0 } else { t };
    Ok(FeedbackGains {
        kp: k[0] * output_scale,
        kd: k[1] * output_scale / kd_period,
    })
}

/// Compute velocity-loop P gain for the identified plant.
pub fn calculate_velocity_feedback_gains(
    preset: &FeedbackControllerPreset,
    method: FeedbackGainMethod,
    lqr: &LqrParameters,
    kv: f64,
    ka: f64,
    enc_factor: f64,
) -> Result<FeedbackGains> {
    check_plant(kv, ka)?;
    let t = preset.period;

    let a = (-kv / ka * t).exp();
    let b = (1.0 - a) / kv;

    let mut k = match method {
        FeedbackGainMethod::Lqr => {
            let q = 1.0 / (lqr.q_velocity * lqr.q_velocity);
            let r = 1.0 / (lqr.max_effort * lqr.max_effort);
            dare_gain_scalar(a, b, q, r)?
        }
        // Move the open-loop pole to the characteristic frequency.
        FeedbackGainMethod::PolePlacement => (a - (-preset.characteristic_frequency * t).exp()) / b,
    };

    if preset.velocity_measurement_delay > 0.0 {
        let closed_loop = a - b * k;
        if closed_loop > 0.0 {
            k *= closed_loop.powf(preset.velocity_measurement_delay / t);
        } else {
            log::warn!(
                "velocity loop closed-loop pole {closed_loop:.4} is not positive; \
                 skipping latency compensation"
            );
        }
    }

    Ok(FeedbackGains {
        kp: k * preset.output_conversion_factor / enc_factor,
        kd: 0.0,
    })
}

const DARE_MAX_ITERATIONS: usize = 10_000;
const DARE_TOLERANCE: f64 = 1e-12;

/// LQR gain for a scalar plant from the fixed-point Riccati iteration.
fn dare_gain_scalar(a: f64, b: f64, q: f64, r: f64) -> Result<f64> {
    let mut p = q;
    for _ in 0..DARE_MAX_ITERATIONS {
        let s = r + b * p * b;
        let next = q + a * p * a - (a * p * b) * (a * p * b) / s;
        if !next.is_finite() {
            return Err(Error::NonPhysicalPlant(
                "Riccati iteration diverged".to_string(),
            ));
        }
        let done = (next - p).abs() <= DARE_TOLERANCE * p.abs().max(1.0);
        p = next;
        if done {
            let s = r + b * p * b;
            return Ok(b * p * a / s);
        }
    }
    Err(Error::NonPhysicalPlant(
        "Riccati iteration did not converge".to_string(),
    ))
}

/// LQR gain for the two-state position chain.
///
/// Iterates `P <- Q + A'PA - A'PB (R + B'PB)^-1 B'PA` to its fixed point
/// and returns `K = (R + B'PB)^-1 B'PA` as a row vector.
fn dare_gain_two_state(
    a: [[f64; 2]; 2],
    b: [f64; 2],
    q: [f64; 2],
    r: f64,
) -> Result<[f64; 2]> {
    let mut p = [[q[0], 0.0], [0.0, q[1]]];

    for _ in 0..DARE_MAX_ITERATIONS {
        // pa = P A, bpa = B'PA, s = R + B'PB
        let pa = mat2_mul(p, a);
        let pb = [
            p[0][0] * b[0] + p[0][1] * b[1],
            p[1][0] * b[0] + p[1][1] * b[1],
        ];
        let bpa = [
            b[0] * pa[0][0] + b[1] * pa[1][0],
            b[0] * pa[0][1] + b[1] * pa[1][1],
        ];
        let s = r + b[0] * pb[0] + b[1] * pb[1];

        let atpa = mat2_mul(mat2_transpose(a), pa);
        let mut next = [[0.0f64; 2]; 2];
        for i in 0..2 {
            for j in 0..2 {
                let atpb_i = a[0][i] * pb[0] + a[1][i] * pb[1];
                next[i][j] = atpa[i][j] - atpb_i * bpa[j] / s;
            }
        }
        next[0][0] += q[0];
        next[1][1] += q[1];

        // Symmetrize against accumulated round-off.
        let off = 0.5 * (next[0][1] + next[1][0]);
        next[0][1] = off;
        next[1][0] = off;

        if !next.iter().flatten().all(|v| v.is_finite()) {
            return Err(Error::NonPhysicalPlant(
                "Riccati iteration diverged".to_string(),
            ));
        }

        let delta = (0..2)
            .flat_map(|i| (0..2).map(move |j| (i, j)))
            .map(|(i, j)| (next[i][j] - p[i][j]).abs())
            .fold(0.0f64, f64::max);
        let scale = p.iter().flatten().fold(1.0f64, |m, v| m.max(v.abs()));
        p = next;

        if delta <= DARE_TOLERANCE * scale {
            let pa = mat2_mul(p, a);
            let pb = [
                p[0][0] * b[0] + p[0][1] * b[1],
                p[1][0] * b[0] + p[1][1] * b[1],
            ];
            let s = r + b[0] * pb[0] + b[1] * pb[1];
            return Ok([
                (b[0] * pa[0][0] + b[1] * pa[1][0]) / s,
                (b[0] * pa[0][1] + b[1] * pa[1][1]) / s,
            ]);
        }
    }

    Err(Error::NonPhysicalPlant(
        "Riccati iteration did not converge".to_string(),
    ))
}

/// Place a critically damped pole pair at `pole` via Ackermann's formula.
///
/// `K = [0 1] C^-1 phi(A)` with `C = [B, AB]` the controllability matrix
/// and `phi(A) = (A - pole I)^2` the desired characteristic polynomial
/// evaluated at the plant. A vanishing controllability determinant means
/// no gain can move the poles.
fn place_poles_two_state(a: [[f64; 2]; 2], b: [f64; 2], pole: f64) -> Result<[f64; 2]> {
    let ab = [
        a[0][0] * b[0] + a[0][1] * b[1],
        a[1][0] * b[0] + a[1][1] * b[1],
    ];
    let det = b[0] * ab[1] - ab[0] * b[1];
    if det.abs() < 1e-18 {
        return Err(Error::NonPhysicalPlant(
            "plant is uncontrollable; poles cannot be placed".to_string(),
        ));
    }

    let a2 = mat2_mul(a, a);
    let phi = [
        [
            a2[0][0] - 2.0 * pole * a[0][0] + pole * pole,
            a2[0][1] - 2.0 * pole * a[0][1],
        ],
        [
            a2[1][0] - 2.0 * pole * a[1][0],
            a2[1][1] - 2.0 * pole * a[1][1] + pole * pole,
        ],
    ];

    // Last row of C^-1, scaled by 1/det.
    let row = [-b[1] / det, b[0] / det];
    Ok([
        row[0] * phi[0][0] + row[1] * phi[1][0],
        row[0] * phi[0][1] + row[1] * phi[1][1],
    ])
}

/// Decay the gain through the closed-loop dynamics over the measurement
/// delay: `K <- K (A - B K)^(delay / period)`.
///
/// The fractional matrix power needs real positive closed-loop
/// eigenvalues; otherwise compensation is skipped with a warning.
fn compensate_latency_two_state(
    a: [[f64; 2]; 2],
    b: [f64; 2],
    k: [f64; 2],
    periods: f64,
) -> [f64; 2] {
    let closed_loop = [
        [a[0][0] - b[0] * k[0], a[0][1] - b[0] * k[1]],
        [a[1][0] - b[1] * k[0], a[1][1] - b[1] * k[1]],
    ];

    match mat2_power(closed_loop, periods) {
        Some(m) => [
            k[0] * m[0][0] + k[1] * m[1][0],
            k[0] * m[0][1] + k[1] * m[1][1],
        ],
        None => {
            log::warn!(
                "closed-loop eigenvalues are complex or non-positive; \
                 skipping latency compensation"
            );
            k
        }
    }
}

fn mat2_mul(a: [[f64; 2]; 2], b: [[f64; 2]; 2]) -> [[f64; 2]; 2] {
    [
        [
            a[0][0] * b[0][0] + a[0][1] * b[1][0],
            a[0][0] * b[0][1] + a[0][1] * b[1][1],
        ],
        [
            a[1][0] * b[0][0] + a[1][1] * b[1][0],
            a[1][0] * b[0][1] + a[1][1] * b[1][1],
        ],
    ]
}

fn mat2_transpose(a: [[f64; 2]; 2]) -> [[f64; 2]; 2] {
    [[a[0][0], a[1][0]], [a[0][1], a[1][1]]]
}

/// Real fractional power of a 2x2 matrix via its eigenvalues.
///
/// Sylvester interpolation: `M^p = c0 I + c1 M` with the coefficients
/// matched on each eigenvalue, using the principal branch for complex
/// conjugate pairs. Eigenvalues on the closed negative real axis have no
/// principal power; those return `None`.
fn mat2_power(m: [[f64; 2]; 2], exponent: f64) -> Option<[[f64; 2]; 2]> {
    let trace = m[0][0] + m[1][1];
    let det = m[0][0] * m[1][1] - m[0][1] * m[1][0];
    let disc = trace * trace - 4.0 * det;

    let (c0, c1) = if disc < 0.0 {
        // Complex conjugate pair rho * exp(+/- i theta)
        let re = 0.5 * trace;
        let im = 0.5 * (-disc).sqrt();
        let rho = re.hypot(im);
        let theta = im.atan2(re);
        let scaled = rho.powf(exponent);
        let c1 = scaled * (exponent * theta).sin() / im;
        (scaled * (exponent * theta).cos() - c1 * re, c1)
    } else {
        let root = disc.sqrt();
        let l1 = 0.5 * (trace + root);
        let l2 = 0.5 * (trace - root);
        if l1 <= 0.0 || l2 <= 0.0 {
            return None;
        }
        if (l1 - l2).abs() < 1e-12 {
            // Repeated eigenvalue: M^p = l^p I + p l^(p-1) (M - l I)
            let dp = exponent * l1.powf(exponent - 1.0);
            (l1.powf(exponent) - dp * l1, dp)
        } else {
            let c1 = (l1.powf(exponent) - l2.powf(exponent)) / (l1 - l2);
            (l1.powf(exponent) - c1 * l1, c1)
        }
    };

    Some([
        [c0 + c1 * m[0][0], c1 * m[0][1]],
        [c1 * m[1][0], c0 + c1 * m[1][1]],
    ])
}
