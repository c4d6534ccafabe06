//! YantraSysid - Offline system identification for motorized mechanisms
//!
//! Characterizes elevators, arms, simple rotational loads, and differential
//! drivetrains from logged step and ramp experiments. Given a JSON log of
//! time, voltage, position, and velocity samples from four standardized test
//! runs, the crate conditions the raw signals, partitions them into
//! analysis-ready datasets, and fits physics-based feedforward models
//! together with closed-loop feedback gains.
//!
//! # Architecture
//!
//! The crate is organized into 5 logical layers:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                      bin/                           │  ← Executables
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                    engine/                          │  ← Orchestration
//! │              (analysis manager, settings)           │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                      io/                            │  ← Infrastructure
//! │            (log files, legacy converter)            │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                  analysis/                          │  ← Model fitting
//! │      (OLS, feedforward, feedback, track width)      │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                   signal/                           │  ← Conditioning
//! │       (median, derivative, noise floor, trims)      │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                     core/                           │  ← Foundation
//! │                  (types, errors)                    │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! # Test protocol
//!
//! Each experiment log holds four runs. The slow runs are quasistatic voltage
//! ramps that isolate the static friction and viscous terms; the fast runs
//! are voltage steps that isolate the acceleration response:
//!
//! - `slow-forward`, `slow-backward`: ramp tests
//! - `fast-forward`, `fast-backward`: step tests
//!
//! # Example
//!
//! ```ignore
//! use yantra_sysid::{AnalysisManager, AnalysisSettings};
//!
//! let settings = AnalysisSettings::default();
//! let mut manager = AnalysisManager::from_file("arm_test.json", settings)?;
//! let gains = manager.calculate()?;
//!
//! println!("Ks = {:.4}", gains.feedforward.ks());
//! println!("Kv = {:.4}", gains.feedforward.kv());
//! println!("Ka = {:.4}", gains.feedforward.ka());
//! println!("Kp = {:.4}", gains.feedback.kp);
//! ```

// ============================================================================
// Layer 1: Core foundation (no internal deps)
// ============================================================================
pub mod core;

// ============================================================================
// Layer 2: Signal conditioning (depends on core)
// ============================================================================
pub mod signal;

// ============================================================================
// Layer 3: Model fitting (depends on core, signal)
// ============================================================================
pub mod analysis;

// ============================================================================
// Layer 4: I/O infrastructure (depends on core)
// ============================================================================
pub mod io;

// ============================================================================
// Layer 5: Orchestration (depends on all layers)
// ============================================================================
pub mod engine;

// ============================================================================
// Convenience re-exports (flat namespace for common use)
// ============================================================================

// Core types
pub use core::error::{Error, Result};
pub use core::types::{
    Dataset, DatasetKey, MechanismTest, PreparedData, RawSample, Unit, RUN_LABELS,
};

// Signal conditioning
pub use signal::compute_acceleration;
pub use signal::derivative::CentralFiniteDifference;
pub use signal::median::apply_median_filter;
pub use signal::noise::noise_floor;
pub use signal::trim::{trim_quasistatic, trim_step_voltage};

// Model fitting
pub use analysis::feedback::{
    calculate_position_feedback_gains, calculate_velocity_feedback_gains,
    FeedbackControllerPreset, FeedbackGainMethod, FeedbackGains, FeedbackLoopType, LqrParameters,
};
pub use analysis::feedforward::{calculate_feedforward_gains, FeedforwardFit};
pub use analysis::ols::{ols, OlsFit};
pub use analysis::track_width::calculate_track_width;

// Orchestration
pub use engine::manager::{AnalysisManager, Gains};
pub use engine::settings::AnalysisSettings;

// I/O
pub use io::converter::convert_legacy_log;
pub use io::log_file::ExperimentLog;
