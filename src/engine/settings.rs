//! Analysis configuration.

use crate::analysis::feedback::{
    FeedbackControllerPreset, FeedbackGainMethod, FeedbackLoopType, LqrParameters,
};
use crate::core::error::{Error, Result};
use crate::core::types::DatasetKey;

/// Configuration consumed by the analysis pipeline.
#[derive(Debug, Clone)]
pub struct AnalysisSettings {
    /// Minimum absolute velocity for a quasistatic point to count as
    /// active, in output units per second.
    ///
    /// Default: 0.2
    pub motion_threshold: f64,

    /// Median-filter and finite-difference window; odd, at least 3.
    ///
    /// Default: 9
    pub window_size: usize,

    /// Truncation horizon for step runs in seconds; 0 means auto, in
    /// which case the first step trim measures it from the data.
    pub step_test_duration: f64,

    /// Velocity marking the start of motion in a step run.
    ///
    /// Default: 0.05
    pub velocity_threshold: f64,

    /// Controller the feedback gains are synthesized for.
    pub preset: FeedbackControllerPreset,

    /// How the gains are synthesized: LQR weights, or pole placement at
    /// the preset's characteristic frequency.
    pub gain_method: FeedbackGainMethod,

    /// LQR state tolerances and effort bound.
    pub lqr: LqrParameters,

    /// Convert feedback gains from output units to encoder counts.
    pub convert_gains_to_enc_ticks: bool,

    /// Gear ratio between the encoder and the output, used by the count
    /// conversion.
    pub gearing: f64,

    /// Encoder counts per encoder revolution.
    pub cpr: f64,

    /// Which dataset the feedforward fit consumes.
    pub dataset: DatasetKey,

    /// Which loop the feedback gains close.
    pub loop_type: FeedbackLoopType,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            motion_threshold: 0.2,
            window_size: 9,
            step_test_duration: 0.0,
            velocity_threshold: 0.05,
            preset: FeedbackControllerPreset::default(),
            gain_method: FeedbackGainMethod::Lqr,
            lqr: LqrParameters::default(),
            convert_gains_to_enc_ticks: false,
            gearing: 1.0,
            cpr: 1440.0,
            dataset: DatasetKey::Combined,
            loop_type: FeedbackLoopType::Position,
        }
    }
}

impl AnalysisSettings {
    /// Check every field is in range.
    pub fn validate(&self) -> Result<()> {
        if self.window_size < 3 || self.window_size % 2 == 0 {
            return Err(Error::InvalidSettings(format!(
                "window size must be odd and >= 3, got {}",
                self.window_size
            )));
        }
        if self.motion_threshold < 0.0 {
            return Err(Error::InvalidSettings(
                "motion threshold must not be negative".to_string(),
            ));
        }
        if self.velocity_threshold < 0.0 {
            return Err(Error::InvalidSettings(
                "velocity threshold must not be negative".to_string(),
            ));
        }
        if self.step_test_duration < 0.0 {
            return Err(Error::InvalidSettings(
                "step test duration must not be negative".to_string(),
            ));
        }
        if self.preset.period <= 0.0 || self.preset.output_conversion_factor <= 0.0 {
            return Err(Error::InvalidSettings(
                "preset period and output conversion factor must be positive".to_string(),
            ));
        }
        if self.preset.characteristic_frequency <= 0.0 {
            return Err(Error::InvalidSettings(
                "preset characteristic frequency must be positive".to_string(),
            ));
        }
        if self.lqr.q_position <= 0.0 || self.lqr.q_velocity <= 0.0 || self.lqr.max_effort <= 0.0 {
            return Err(Error::InvalidSettings(
                "LQR tolerances and effort bound must be positive".to_string(),
            ));
        }
        if self.gearing <= 0.0 || self.cpr <= 0.0 {
            return Err(Error::InvalidSettings(
                "gearing and counts per revolution must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Factor converting gains from output units to encoder counts.
    ///
    /// Identity unless count conversion is enabled.
    pub fn encoder_factor(&self, units_per_rotation: f64) -> f64 {
        if self.convert_gains_to_enc_ticks {
            self.gearing * self.cpr * units_per_rotation
        } else {
            1.0
        }
    }
}
