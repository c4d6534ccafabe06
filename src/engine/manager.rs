//! The analysis manager.
//!
//! Owns a parsed experiment log and drives the full pipeline: per-run
//! signal conditioning, dataset assembly keyed by direction, and the
//! feedforward and feedback calculations. The manager is single-threaded
//! and synchronous; construct a fresh one per input file.
//!
//! # Pipeline
//!
//! ```text
//! log rows ── sign-align, unit-scale ── quasistatic trim (slow runs)
//!          ── median filter + acceleration estimate (per run)
//!          ── step-voltage trim (fast runs) ── datasets
//! datasets ── feedforward OLS fit ── feedback LQR gains
//! ```
//!
//! Raw datasets skip the median filter so the operator can compare the
//! filtered fit against unconditioned data. The angular drivetrain test
//! additionally produces a track-width estimate.

use std::collections::HashMap;
use std::path::Path;

use crate::analysis::feedback::{
    calculate_position_feedback_gains, calculate_velocity_feedback_gains, FeedbackGains,
    FeedbackLoopType,
};
use crate::analysis::feedforward::{calculate_feedforward_gains, FeedforwardFit};
use crate::analysis::track_width::calculate_track_width;
use crate::core::error::{Error, Result};
use crate::core::types::{Dataset, DatasetKey, MechanismTest, PreparedData, RawSample, Unit};
use crate::engine::settings::AnalysisSettings;
use crate::io::log_file::ExperimentLog;
use crate::signal::compute_acceleration;
use crate::signal::median::apply_median_filter;
use crate::signal::trim::{is_quasistatic_active, trim_quasistatic, trim_step_voltage};

/// Drivetrain log row columns.
mod col {
    pub const TIME: usize = 0;
    pub const LEFT_VOLTS: usize = 1;
    pub const RIGHT_VOLTS: usize = 2;
    pub const LEFT_POS: usize = 3;
    pub const RIGHT_POS: usize = 4;
    pub const LEFT_VEL: usize = 5;
    pub const RIGHT_VEL: usize = 6;
    pub const HEADING: usize = 7;
    pub const ANGULAR_RATE: usize = 8;
}

/// Output of a full analysis.
#[derive(Debug, Clone)]
pub struct Gains {
    /// Fitted feedforward model with its diagnostics
    pub feedforward: FeedforwardFit,
    /// Synthesized feedback gains
    pub feedback: FeedbackGains,
    /// Track width in output units; angular drivetrain only
    pub track_width: Option<f64>,
}

/// Everything one preparation pass produces.
#[derive(Debug)]
struct PreparedRuns {
    raw: HashMap<DatasetKey, Dataset>,
    filtered: HashMap<DatasetKey, Dataset>,
    start_times: [f64; 4],
    min_duration: f64,
    max_duration: f64,
    track_width: Option<f64>,
}

impl Default for PreparedRuns {
    fn default() -> Self {
        Self {
            raw: HashMap::new(),
            filtered: HashMap::new(),
            start_times: [0.0; 4],
            min_duration: f64::INFINITY,
            max_duration: 0.0,
            track_width: None,
        }
    }
}

/// Orchestrates the analysis of one experiment log.
#[derive(Debug)]
pub struct AnalysisManager {
    log: ExperimentLog,
    mechanism: MechanismTest,
    unit: Unit,
    factor: f64,
    settings: AnalysisSettings,
    prepared: PreparedRuns,
}

impl AnalysisManager {
    /// Build a manager over an already-parsed log and prepare its data.
    pub fn new(log: ExperimentLog, mut settings: AnalysisSettings) -> Result<Self> {
        settings.validate()?;

        // The step-test duration is learned from this log's data.
        settings.step_test_duration = 0.0;

        let mut manager = Self {
            mechanism: log.mechanism,
            unit: log.unit,
            factor: log.units_per_rotation,
            log,
            settings,
            prepared: PreparedRuns::default(),
        };
        manager.prepare_data()?;
        Ok(manager)
    }

    /// Read a log file and prepare its data.
    pub fn from_file(path: impl AsRef<Path>, settings: AnalysisSettings) -> Result<Self> {
        Self::new(ExperimentLog::load(path)?, settings)
    }

    /// Re-run the conditioning pipeline under the current settings.
    ///
    /// This is the re-entry point after a settings change. On failure the
    /// datasets are left empty, so a later [`calculate`](Self::calculate)
    /// fails rather than fitting stale data.
    pub fn prepare_data(&mut self) -> Result<()> {
        self.prepared = PreparedRuns::default();

        let prepared = match self.mechanism {
            MechanismTest::Drivetrain => self.prepare_linear_drivetrain(),
            MechanismTest::DrivetrainAngular => self.prepare_angular_drivetrain(),
            _ => self.prepare_general(),
        }?;

        log::info!(
            "prepared {} datasets for {} ({} filtered keys, step duration {:.3} s)",
            self.mechanism,
            self.unit,
            prepared.filtered.len(),
            self.settings.step_test_duration
        );
        self.prepared = prepared;
        Ok(())
    }

    /// Fit the feedforward model and synthesize feedback gains.
    pub fn calculate(&self) -> Result<Gains> {
        if self.prepared.filtered.is_empty() {
            return Err(Error::InsufficientData(
                "no prepared datasets; data preparation has not succeeded",
            ));
        }
        let dataset = self
            .prepared
            .filtered
            .get(&self.settings.dataset)
            .ok_or_else(|| {
                Error::InvalidSettings(format!(
                    "dataset {:?} is not published by the {} test",
                    self.settings.dataset.display_name(),
                    self.mechanism
                ))
            })?;

        let feedforward = calculate_feedforward_gains(dataset, self.mechanism)?;
        let enc_factor = self.settings.encoder_factor(self.factor);
        let feedback = match self.settings.loop_type {
            FeedbackLoopType::Position => calculate_position_feedback_gains(
                &self.settings.preset,
                self.settings.gain_method,
                &self.settings.lqr,
                feedforward.kv(),
                feedforward.ka(),
                enc_factor,
            )?,
            FeedbackLoopType::Velocity => calculate_velocity_feedback_gains(
                &self.settings.preset,
                self.settings.gain_method,
                &self.settings.lqr,
                feedforward.kv(),
                feedforward.ka(),
                enc_factor,
            )?,
        };

        log::info!(
            "fit over {}: Ks = {:.4}, Kv = {:.4}, Ka = {:.4} (r^2 = {:.4}); \
             Kp = {:.4}, Kd = {:.4}",
            self.settings.dataset,
            feedforward.ks(),
            feedforward.kv(),
            feedforward.ka(),
            feedforward.r_squared,
            feedback.kp,
            feedback.kd
        );

        Ok(Gains {
            feedforward,
            feedback,
            track_width: self.prepared.track_width,
        })
    }

    /// Override the measurement units and re-prepare.
    pub fn override_units(&mut self, unit: Unit, units_per_rotation: f64) -> Result<()> {
        self.unit = unit;
        self.factor = units_per_rotation;
        self.prepare_data()
    }

    /// Restore the units recorded in the log and re-prepare.
    pub fn reset_units_from_log(&mut self) -> Result<()> {
        self.unit = self.log.unit;
        self.factor = self.log.units_per_rotation;
        self.prepare_data()
    }

    /// Mechanism family under analysis.
    pub fn mechanism(&self) -> MechanismTest {
        self.mechanism
    }

    /// Measurement unit currently in effect.
    pub fn unit(&self) -> Unit {
        self.unit
    }

    /// Output units per motor-shaft rotation currently in effect.
    pub fn units_per_rotation(&self) -> f64 {
        self.factor
    }

    /// Current settings.
    pub fn settings(&self) -> &AnalysisSettings {
        &self.settings
    }

    /// Mutable settings; call [`prepare_data`](Self::prepare_data)
    /// afterwards for conditioning changes to take effect.
    pub fn settings_mut(&mut self) -> &mut AnalysisSettings {
        &mut self.settings
    }

    /// A filtered dataset by key, if the mechanism publishes it.
    pub fn filtered_dataset(&self, key: DatasetKey) -> Option<&Dataset> {
        self.prepared.filtered.get(&key)
    }

    /// A raw (unfiltered) dataset by key, if the mechanism publishes it.
    pub fn raw_dataset(&self, key: DatasetKey) -> Option<&Dataset> {
        self.prepared.raw.get(&key)
    }

    /// First timestamps of the four filtered runs, in storage order.
    pub fn start_times(&self) -> [f64; 4] {
        self.prepared.start_times
    }

    /// Shortest observed motion-to-peak delay across the step runs.
    pub fn min_duration(&self) -> f64 {
        self.prepared.min_duration
    }

    /// Longest step-run duration in the log.
    pub fn max_duration(&self) -> f64 {
        self.prepared.max_duration
    }

    /// Track width estimate; angular drivetrain only.
    pub fn track_width(&self) -> Option<f64> {
        self.prepared.track_width
    }

    // ========================================================================
    // Per-mechanism preparation
    // ========================================================================

    /// Simple, elevator, and arm mechanisms: one channel per 4-column row.
    fn prepare_general(&mut self) -> Result<PreparedRuns> {
        let factor = self.factor;
        let window = self.settings.window_size;
        let motion_threshold = self.settings.motion_threshold;
        let velocity_threshold = self.settings.velocity_threshold;

        let mut slow_forward = project_general(&self.log.slow_forward, factor);
        let mut slow_backward = project_general(&self.log.slow_backward, factor);
        let fast_forward = project_general(&self.log.fast_forward, factor);
        let fast_backward = project_general(&self.log.fast_backward, factor);

        trim_quasistatic(&mut slow_forward, motion_threshold);
        trim_quasistatic(&mut slow_backward, motion_threshold);

        let max_duration = channel_duration(&fast_forward).max(channel_duration(&fast_backward));

        let (raw_sf, mut sf) = condition(&slow_forward, window)?;
        let (raw_sb, mut sb) = condition(&slow_backward, window)?;
        let (mut raw_ff, mut ff) = condition(&fast_forward, window)?;
        let (mut raw_fb, mut fb) = condition(&fast_backward, window)?;

        if self.mechanism == MechanismTest::Arm {
            let unit = self.unit;
            for run in [&mut sf, &mut sb, &mut ff, &mut fb] {
                calculate_cosine(run, unit);
            }
        }

        // Raw trims run first and seed the auto step duration; only the
        // filtered trims feed the minimum-duration accumulator.
        let duration = &mut self.settings.step_test_duration;
        trim_step_voltage(&mut raw_ff, velocity_threshold, window, duration, 0.0, max_duration)?;
        trim_step_voltage(&mut raw_fb, velocity_threshold, window, duration, 0.0, max_duration)?;

        let mut min_duration = f64::INFINITY;
        min_duration =
            trim_step_voltage(&mut ff, velocity_threshold, window, duration, min_duration, max_duration)?;
        min_duration =
            trim_step_voltage(&mut fb, velocity_threshold, window, duration, min_duration, max_duration)?;

        let start_times = start_times_of(&sf, &sb, &ff, &fb)?;

        let mut raw = HashMap::new();
        raw.insert(
            DatasetKey::Combined,
            Dataset::new(concatenate(&raw_sf, &raw_sb), concatenate(&raw_ff, &raw_fb)),
        );
        raw.insert(DatasetKey::Forward, Dataset::new(raw_sf, raw_ff));
        raw.insert(DatasetKey::Backward, Dataset::new(raw_sb, raw_fb));

        let mut filtered = HashMap::new();
        filtered.insert(
            DatasetKey::Combined,
            Dataset::new(concatenate(&sf, &sb), concatenate(&ff, &fb)),
        );
        filtered.insert(DatasetKey::Forward, Dataset::new(sf, ff));
        filtered.insert(DatasetKey::Backward, Dataset::new(sb, fb));

        Ok(PreparedRuns {
            raw,
            filtered,
            start_times,
            min_duration,
            max_duration,
            track_width: None,
        })
    }

    /// Linear drivetrain: the general pipeline run independently over the
    /// left and right channels of each 9-column row.
    fn prepare_linear_drivetrain(&mut self) -> Result<PreparedRuns> {
        let factor = self.factor;
        let window = self.settings.window_size;
        let motion_threshold = self.settings.motion_threshold;
        let velocity_threshold = self.settings.velocity_threshold;

        let mut slow_forward = self.log.slow_forward.clone();
        let mut slow_backward = self.log.slow_backward.clone();
        let fast_forward = {
            let mut rows = self.log.fast_forward.clone();
            scale_linear_rows(&mut rows, factor);
            rows
        };
        let fast_backward = {
            let mut rows = self.log.fast_backward.clone();
            scale_linear_rows(&mut rows, factor);
            rows
        };
        scale_linear_rows(&mut slow_forward, factor);
        scale_linear_rows(&mut slow_backward, factor);

        // A quasistatic row survives only when both sides are active.
        for rows in [&mut slow_forward, &mut slow_backward] {
            rows.retain(|row| {
                is_quasistatic_active(row[col::LEFT_VOLTS], row[col::LEFT_VEL], motion_threshold)
                    && is_quasistatic_active(
                        row[col::RIGHT_VOLTS],
                        row[col::RIGHT_VEL],
                        motion_threshold,
                    )
            });
        }

        let max_duration = rows_duration(&fast_forward).max(rows_duration(&fast_backward));

        let left = Side {
            volts: col::LEFT_VOLTS,
            pos: col::LEFT_POS,
            vel: col::LEFT_VEL,
        };
        let right = Side {
            volts: col::RIGHT_VOLTS,
            pos: col::RIGHT_POS,
            vel: col::RIGHT_VEL,
        };

        let (raw_sfl, sfl) = condition(&project_side(&slow_forward, left), window)?;
        let (raw_sbl, sbl) = condition(&project_side(&slow_backward, left), window)?;
        let (mut raw_ffl, mut ffl) = condition(&project_side(&fast_forward, left), window)?;
        let (mut raw_fbl, mut fbl) = condition(&project_side(&fast_backward, left), window)?;
        let (raw_sfr, sfr) = condition(&project_side(&slow_forward, right), window)?;
        let (raw_sbr, sbr) = condition(&project_side(&slow_backward, right), window)?;
        let (mut raw_ffr, mut ffr) = condition(&project_side(&fast_forward, right), window)?;
        let (mut raw_fbr, mut fbr) = condition(&project_side(&fast_backward, right), window)?;

        let duration = &mut self.settings.step_test_duration;
        trim_step_voltage(&mut raw_ffl, velocity_threshold, window, duration, 0.0, max_duration)?;
        trim_step_voltage(&mut raw_ffr, velocity_threshold, window, duration, 0.0, max_duration)?;
        trim_step_voltage(&mut raw_fbl, velocity_threshold, window, duration, 0.0, max_duration)?;
        trim_step_voltage(&mut raw_fbr, velocity_threshold, window, duration, 0.0, max_duration)?;

        let mut min_duration = f64::INFINITY;
        for run in [&mut ffl, &mut ffr, &mut fbl, &mut fbr] {
            min_duration = trim_step_voltage(
                run,
                velocity_threshold,
                window,
                duration,
                min_duration,
                max_duration,
            )?;
        }

        // Merged runs carry left then right.
        let raw_sf = concatenate(&raw_sfl, &raw_sfr);
        let raw_sb = concatenate(&raw_sbl, &raw_sbr);
        let raw_ff = concatenate(&raw_ffl, &raw_ffr);
        let raw_fb = concatenate(&raw_fbl, &raw_fbr);
        let sf = concatenate(&sfl, &sfr);
        let sb = concatenate(&sbl, &sbr);
        let ff = concatenate(&ffl, &ffr);
        let fb = concatenate(&fbl, &fbr);

        let start_times = start_times_of(&sf, &sb, &ff, &fb)?;

        let mut raw = HashMap::new();
        raw.insert(
            DatasetKey::Combined,
            Dataset::new(concatenate(&raw_sf, &raw_sb), concatenate(&raw_ff, &raw_fb)),
        );
        raw.insert(
            DatasetKey::LeftCombined,
            Dataset::new(concatenate(&raw_sfl, &raw_sbl), concatenate(&raw_ffl, &raw_fbl)),
        );
        raw.insert(
            DatasetKey::RightCombined,
            Dataset::new(concatenate(&raw_sfr, &raw_sbr), concatenate(&raw_ffr, &raw_fbr)),
        );
        raw.insert(DatasetKey::Forward, Dataset::new(raw_sf, raw_ff));
        raw.insert(DatasetKey::Backward, Dataset::new(raw_sb, raw_fb));
        raw.insert(DatasetKey::LeftForward, Dataset::new(raw_sfl, raw_ffl));
        raw.insert(DatasetKey::LeftBackward, Dataset::new(raw_sbl, raw_fbl));
        raw.insert(DatasetKey::RightForward, Dataset::new(raw_sfr, raw_ffr));
        raw.insert(DatasetKey::RightBackward, Dataset::new(raw_sbr, raw_fbr));

        let mut filtered = HashMap::new();
        filtered.insert(
            DatasetKey::Combined,
            Dataset::new(concatenate(&sf, &sb), concatenate(&ff, &fb)),
        );
        filtered.insert(
            DatasetKey::LeftCombined,
            Dataset::new(concatenate(&sfl, &sbl), concatenate(&ffl, &fbl)),
        );
        filtered.insert(
            DatasetKey::RightCombined,
            Dataset::new(concatenate(&sfr, &sbr), concatenate(&ffr, &fbr)),
        );
        filtered.insert(DatasetKey::Forward, Dataset::new(sf, ff));
        filtered.insert(DatasetKey::Backward, Dataset::new(sb, fb));
        filtered.insert(DatasetKey::LeftForward, Dataset::new(sfl, ffl));
        filtered.insert(DatasetKey::LeftBackward, Dataset::new(sbl, fbl));
        filtered.insert(DatasetKey::RightForward, Dataset::new(sfr, ffr));
        filtered.insert(DatasetKey::RightBackward, Dataset::new(sbr, fbr));

        Ok(PreparedRuns {
            raw,
            filtered,
            start_times,
            min_duration,
            max_duration,
            track_width: None,
        })
    }

    /// Angular drivetrain: the target channel is heading and angular rate.
    ///
    /// The two sides act additively on rotation, so voltage is doubled
    /// before sign alignment. The median filter is skipped; the gyro rate
    /// channel does not show the encoder quantization the filter targets.
    fn prepare_angular_drivetrain(&mut self) -> Result<PreparedRuns> {
        let factor = self.factor;
        let window = self.settings.window_size;
        let motion_threshold = self.settings.motion_threshold;
        let velocity_threshold = self.settings.velocity_threshold;

        let mut slow_forward = self.log.slow_forward.clone();
        let mut slow_backward = self.log.slow_backward.clone();
        let fast_forward = {
            let mut rows = self.log.fast_forward.clone();
            scale_angular_rows(&mut rows, factor);
            rows
        };
        let fast_backward = {
            let mut rows = self.log.fast_backward.clone();
            scale_angular_rows(&mut rows, factor);
            rows
        };
        scale_angular_rows(&mut slow_forward, factor);
        scale_angular_rows(&mut slow_backward, factor);

        for rows in [&mut slow_forward, &mut slow_backward] {
            rows.retain(|row| {
                is_quasistatic_active(
                    row[col::LEFT_VOLTS],
                    row[col::ANGULAR_RATE],
                    motion_threshold,
                )
            });
        }

        let max_duration = rows_duration(&fast_forward).max(rows_duration(&fast_backward));

        let sf = compute_acceleration(&project_angular(&slow_forward), window)?;
        let sb = compute_acceleration(&project_angular(&slow_backward), window)?;
        let mut ff = compute_acceleration(&project_angular(&fast_forward), window)?;
        let mut fb = compute_acceleration(&project_angular(&fast_backward), window)?;

        let duration = &mut self.settings.step_test_duration;
        let mut min_duration = f64::INFINITY;
        min_duration =
            trim_step_voltage(&mut ff, velocity_threshold, window, duration, min_duration, max_duration)?;
        min_duration =
            trim_step_voltage(&mut fb, velocity_threshold, window, duration, min_duration, max_duration)?;

        // Track width from the trimmed slow-forward endpoints.
        let (first, last) = match (slow_forward.first(), slow_forward.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => {
                return Err(Error::InsufficientData(
                    "slow-forward run emptied by the quasistatic trim",
                ))
            }
        };
        let track_width = calculate_track_width(
            last[col::LEFT_POS] - first[col::LEFT_POS],
            last[col::RIGHT_POS] - first[col::RIGHT_POS],
            last[col::HEADING] - first[col::HEADING],
        )?;

        let start_times = start_times_of(&sf, &sb, &ff, &fb)?;

        let mut filtered = HashMap::new();
        filtered.insert(
            DatasetKey::Combined,
            Dataset::new(concatenate(&sf, &sb), concatenate(&ff, &fb)),
        );
        filtered.insert(DatasetKey::Forward, Dataset::new(sf, ff));
        filtered.insert(DatasetKey::Backward, Dataset::new(sb, fb));

        Ok(PreparedRuns {
            raw: HashMap::new(),
            filtered,
            start_times,
            min_duration,
            max_duration,
            track_width: Some(track_width),
        })
    }
}

// ============================================================================
// Projection and assembly helpers
// ============================================================================

/// Column selectors for one drivetrain side.
#[derive(Clone, Copy)]
struct Side {
    volts: usize,
    pos: usize,
    vel: usize,
}

/// Project 4-column general rows: sign-align voltage, scale units.
fn project_general(rows: &[Vec<f64>], factor: f64) -> Vec<RawSample> {
    rows.iter()
        .map(|row| RawSample {
            timestamp: row[0],
            voltage: row[1].copysign(row[3]),
            position: row[2] * factor,
            velocity: row[3] * factor,
        })
        .collect()
}

/// Sign-align and unit-scale 9-column rows in place for a linear test.
fn scale_linear_rows(rows: &mut [Vec<f64>], factor: f64) {
    for row in rows {
        row[col::LEFT_VOLTS] = row[col::LEFT_VOLTS].copysign(row[col::LEFT_VEL]);
        row[col::RIGHT_VOLTS] = row[col::RIGHT_VOLTS].copysign(row[col::RIGHT_VEL]);
        row[col::LEFT_POS] *= factor;
        row[col::RIGHT_POS] *= factor;
        row[col::LEFT_VEL] *= factor;
        row[col::RIGHT_VEL] *= factor;
    }
}

/// Double and sign-align voltage in place for an angular test.
///
/// Wheel positions are scaled for the track-width computation; heading
/// and angular rate are already in radians.
fn scale_angular_rows(rows: &mut [Vec<f64>], factor: f64) {
    for row in rows {
        row[col::LEFT_VOLTS] = 2.0 * row[col::LEFT_VOLTS].copysign(row[col::ANGULAR_RATE]);
        row[col::LEFT_POS] *= factor;
        row[col::RIGHT_POS] *= factor;
    }
}

fn project_side(rows: &[Vec<f64>], side: Side) -> Vec<RawSample> {
    rows.iter()
        .map(|row| RawSample {
            timestamp: row[col::TIME],
            voltage: row[side.volts],
            position: row[side.pos],
            velocity: row[side.vel],
        })
        .collect()
}

fn project_angular(rows: &[Vec<f64>]) -> Vec<RawSample> {
    rows.iter()
        .map(|row| RawSample {
            timestamp: row[col::TIME],
            voltage: row[col::LEFT_VOLTS],
            position: row[col::HEADING],
            velocity: row[col::ANGULAR_RATE],
        })
        .collect()
}

/// Raw and median-filtered acceleration estimates for one channel.
fn condition(
    channel: &[RawSample],
    window: usize,
) -> Result<(Vec<PreparedData>, Vec<PreparedData>)> {
    let raw = compute_acceleration(channel, window)?;
    let filtered = compute_acceleration(&apply_median_filter(channel, window)?, window)?;
    Ok((raw, filtered))
}

/// Fill the arm's cosine channel from the position angle.
fn calculate_cosine(run: &mut [PreparedData], unit: Unit) {
    for pt in run {
        if let Some(radians) = unit.position_to_radians(pt.position) {
            pt.cos = radians.cos();
        }
    }
}

fn concatenate(a: &[PreparedData], b: &[PreparedData]) -> Vec<PreparedData> {
    let mut merged = Vec::with_capacity(a.len() + b.len());
    merged.extend_from_slice(a);
    merged.extend_from_slice(b);
    merged
}

fn channel_duration(channel: &[RawSample]) -> f64 {
    match (channel.first(), channel.last()) {
        (Some(first), Some(last)) => last.timestamp - first.timestamp,
        _ => 0.0,
    }
}

fn rows_duration(rows: &[Vec<f64>]) -> f64 {
    match (rows.first(), rows.last()) {
        (Some(first), Some(last)) => last[col::TIME] - first[col::TIME],
        _ => 0.0,
    }
}

fn start_times_of(
    sf: &[PreparedData],
    sb: &[PreparedData],
    ff: &[PreparedData],
    fb: &[PreparedData],
) -> Result<[f64; 4]> {
    let first = |run: &[PreparedData]| {
        run.first().map(|pt| pt.timestamp).ok_or(Error::InsufficientData(
            "a conditioned run is empty",
        ))
    };
    Ok([first(sf)?, first(sb)?, first(ff)?, first(fb)?])
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const KS: f64 = 0.5;
    const KV: f64 = 2.0;
    const KA: f64 = 0.4;
    const DT: f64 = 0.05;

    fn sgn(x: f64) -> f64 {
        if x > 0.0 {
            1.0
        } else if x < 0.0 {
            -1.0
        } else {
            0.0
        }
    }

    /// Velocity profiles whose model voltages reproduce the gains exactly
    /// under the pipeline's own symmetric difference quotient.
    fn velocity_profile(n: usize, direction: f64, quasistatic: bool) -> Vec<f64> {
        (0..n)
            .map(|i| {
                let i = i as f64;
                direction
                    * if quasistatic {
                        0.25 + 0.002 * i * i
                    } else {
                        3.0 * (1.0 - (-i / 5.0).exp())
                    }
            })
            .collect()
    }

    /// Acceleration by the same quotient `compute_acceleration` uses with
    /// a window of 3.
    fn accel_at(v: &[f64], i: usize) -> f64 {
        if i == 0 {
            (v[1] - v[0]) / DT
        } else if i == v.len() - 1 {
            (v[i] - v[i - 1]) / DT
        } else {
            (v[i + 1] - v[i - 1]) / (2.0 * DT)
        }
    }

    fn general_run(direction: f64, quasistatic: bool) -> Vec<Vec<f64>> {
        let n = 60;
        let v = velocity_profile(n, direction, quasistatic);
        let mut position = 0.0;
        (0..n)
            .map(|i| {
                let a = accel_at(&v, i);
                position += v[i] * DT;
                let volts = KS * sgn(v[i]) + KV * v[i] + KA * a;
                vec![i as f64 * DT, volts, position, v[i]]
            })
            .collect()
    }

    fn simple_log() -> ExperimentLog {
        ExperimentLog {
            mechanism: MechanismTest::Simple,
            unit: Unit::Rotations,
            units_per_rotation: 1.0,
            slow_forward: general_run(1.0, true),
            slow_backward: general_run(-1.0, true),
            fast_forward: general_run(1.0, false),
            fast_backward: general_run(-1.0, false),
        }
    }

    fn test_settings() -> AnalysisSettings {
        AnalysisSettings {
            window_size: 3,
            ..Default::default()
        }
    }

    #[test]
    fn test_simple_pipeline_recovers_gains() {
        let manager = AnalysisManager::new(simple_log(), test_settings()).unwrap();
        let gains = manager.calculate().unwrap();

        assert_relative_eq!(gains.feedforward.ks(), KS, max_relative = 1e-6);
        assert_relative_eq!(gains.feedforward.kv(), KV, max_relative = 1e-6);
        assert_relative_eq!(gains.feedforward.ka(), KA, max_relative = 1e-6);
        assert_relative_eq!(gains.feedforward.r_squared, 1.0, epsilon = 1e-9);
        assert!(gains.feedback.kp > 0.0);
        assert!(gains.track_width.is_none());
    }

    #[test]
    fn test_combined_is_forward_then_backward() {
        let manager = AnalysisManager::new(simple_log(), test_settings()).unwrap();

        let filtered = [
            manager.filtered_dataset(DatasetKey::Forward).unwrap(),
            manager.filtered_dataset(DatasetKey::Backward).unwrap(),
            manager.filtered_dataset(DatasetKey::Combined).unwrap(),
        ];
        let raw = [
            manager.raw_dataset(DatasetKey::Forward).unwrap(),
            manager.raw_dataset(DatasetKey::Backward).unwrap(),
            manager.raw_dataset(DatasetKey::Combined).unwrap(),
        ];

        for [forward, backward, combined] in [filtered, raw] {
            assert_eq!(
                combined.quasistatic.len(),
                forward.quasistatic.len() + backward.quasistatic.len()
            );
            assert_eq!(
                combined.dynamic.len(),
                forward.dynamic.len() + backward.dynamic.len()
            );
            assert_eq!(combined.quasistatic[0], forward.quasistatic[0]);
            assert_eq!(
                combined.quasistatic[forward.quasistatic.len()],
                backward.quasistatic[0]
            );
        }
    }

    #[test]
    fn test_quasistatic_invariant_holds() {
        let manager = AnalysisManager::new(simple_log(), test_settings()).unwrap();
        let threshold = manager.settings().motion_threshold;

        let combined = manager.filtered_dataset(DatasetKey::Combined).unwrap();
        assert!(!combined.quasistatic.is_empty());
        for pt in &combined.quasistatic {
            assert!(pt.velocity.abs() >= threshold);
            // Sign alignment
            assert!(pt.voltage * pt.velocity > 0.0);
        }
    }

    #[test]
    fn test_unit_override_rescales_gains() {
        let mut manager = AnalysisManager::new(simple_log(), test_settings()).unwrap();
        let baseline = manager.calculate().unwrap();

        // Doubling the unit factor doubles every velocity, halving the
        // velocity and acceleration gains.
        manager.override_units(Unit::Rotations, 2.0).unwrap();
        let scaled = manager.calculate().unwrap();
        assert_relative_eq!(
            scaled.feedforward.kv(),
            baseline.feedforward.kv() / 2.0,
            max_relative = 1e-6
        );
        assert_relative_eq!(
            scaled.feedforward.ka(),
            baseline.feedforward.ka() / 2.0,
            max_relative = 1e-6
        );

        manager.reset_units_from_log().unwrap();
        let restored = manager.calculate().unwrap();
        assert_relative_eq!(
            restored.feedforward.kv(),
            baseline.feedforward.kv(),
            max_relative = 1e-9
        );
    }

    #[test]
    fn test_side_datasets_unavailable_for_general() {
        let mut settings = test_settings();
        settings.dataset = DatasetKey::LeftCombined;
        let manager = AnalysisManager::new(simple_log(), settings).unwrap();
        assert!(matches!(
            manager.calculate(),
            Err(Error::InvalidSettings(_))
        ));
    }

    #[test]
    fn test_overtight_motion_threshold_fails() {
        let mut settings = test_settings();
        settings.motion_threshold = 1e9;
        assert!(matches!(
            AnalysisManager::new(simple_log(), settings),
            Err(Error::InsufficientData(_))
        ));
    }

    // ========================================================================
    // Drivetrain pipelines
    // ========================================================================

    fn linear_drivetrain_log() -> ExperimentLog {
        let widen = |rows: Vec<Vec<f64>>| -> Vec<Vec<f64>> {
            rows.into_iter()
                .map(|row| {
                    vec![
                        row[0], row[1], row[1], row[2], row[2], row[3], row[3], 0.0, 0.0,
                    ]
                })
                .collect()
        };
        ExperimentLog {
            mechanism: MechanismTest::Drivetrain,
            unit: Unit::Meters,
            units_per_rotation: 0.478,
            slow_forward: widen(general_run(1.0, true)),
            slow_backward: widen(general_run(-1.0, true)),
            fast_forward: widen(general_run(1.0, false)),
            fast_backward: widen(general_run(-1.0, false)),
        }
    }

    #[test]
    fn test_linear_drivetrain_sides_and_merge() {
        // Identical left and right channels: the merged fit must agree
        // with each side, and merged runs hold both sides' points.
        let manager =
            AnalysisManager::new(linear_drivetrain_log(), test_settings()).unwrap();

        let left = manager.filtered_dataset(DatasetKey::LeftCombined).unwrap();
        let right = manager.filtered_dataset(DatasetKey::RightCombined).unwrap();
        let merged = manager.filtered_dataset(DatasetKey::Combined).unwrap();
        assert_eq!(merged.len(), left.len() + right.len());

        let gains = manager.calculate().unwrap();
        // The unit factor rescales the fitted gains away from the
        // generating constants; the fit itself stays exact.
        assert_relative_eq!(gains.feedforward.r_squared, 1.0, epsilon = 1e-9);
        assert_relative_eq!(
            gains.feedforward.kv(),
            KV / manager.units_per_rotation(),
            max_relative = 1e-6
        );
        assert!(gains.track_width.is_none());
    }

    fn angular_drivetrain_log() -> ExperimentLog {
        const TRACK_WIDTH: f64 = 0.6;
        let spin_run = |direction: f64, quasistatic: bool| -> Vec<Vec<f64>> {
            let n = 60;
            let omega = velocity_profile(n, direction, quasistatic);
            let mut heading = 0.0;
            let mut left_pos = 0.0;
            let mut right_pos = 0.0;
            (0..n)
                .map(|i| {
                    let alpha = accel_at(&omega, i);
                    heading += omega[i] * DT;
                    left_pos -= omega[i] * TRACK_WIDTH / 2.0 * DT;
                    right_pos += omega[i] * TRACK_WIDTH / 2.0 * DT;
                    // Both sides contribute, so each side carries half the
                    // model voltage.
                    let volts = (KS * sgn(omega[i]) + KV * omega[i] + KA * alpha) / 2.0;
                    vec![
                        i as f64 * DT,
                        volts,
                        volts,
                        left_pos,
                        right_pos,
                        -omega[i] * TRACK_WIDTH / 2.0,
                        omega[i] * TRACK_WIDTH / 2.0,
                        heading,
                        omega[i],
                    ]
                })
                .collect()
        };
        ExperimentLog {
            mechanism: MechanismTest::DrivetrainAngular,
            unit: Unit::Radians,
            units_per_rotation: 1.0,
            slow_forward: spin_run(1.0, true),
            slow_backward: spin_run(-1.0, true),
            fast_forward: spin_run(1.0, false),
            fast_backward: spin_run(-1.0, false),
        }
    }

    #[test]
    fn test_angular_drivetrain_gains_and_track_width() {
        let manager =
            AnalysisManager::new(angular_drivetrain_log(), test_settings()).unwrap();
        let gains = manager.calculate().unwrap();

        assert_relative_eq!(gains.feedforward.ks(), KS, max_relative = 1e-6);
        assert_relative_eq!(gains.feedforward.kv(), KV, max_relative = 1e-6);
        assert_relative_eq!(gains.feedforward.ka(), KA, max_relative = 1e-6);
        assert_relative_eq!(gains.track_width.unwrap(), 0.6, max_relative = 1e-9);

        // Only the direction-keyed filtered datasets exist; no raw ones.
        assert!(manager.filtered_dataset(DatasetKey::Forward).is_some());
        assert!(manager.filtered_dataset(DatasetKey::LeftForward).is_none());
        assert!(manager.raw_dataset(DatasetKey::Forward).is_none());
        assert!(manager.raw_dataset(DatasetKey::Combined).is_none());
    }
}
