//! Error types for YantraSysid
//!
//! # Error Recovery Strategies
//!
//! Different error types require different recovery approaches:
//!
//! ## Input Errors (Fix the File)
//!
//! - **`Io`**: The experiment log could not be read. Check the path and
//!   permissions.
//!
//! - **`Json`**: The file is not well-formed JSON, or a run's rows do not
//!   deserialize as numeric arrays.
//!
//! - **`SchemaMismatch`**: The file parses but is not a native experiment
//!   log, most commonly a legacy characterization export. Run it through
//!   the converter (`convert_log`) and retry.
//!
//! - **`UnknownAnalysisType`** / **`UnknownUnit`**: The log's `test` or
//!   `units` tag is not recognized. Usually indicates a log produced by an
//!   incompatible collector version.
//!
//! ## Settings Errors (Fix and Retry)
//!
//! - **`InvalidSettings`**: A configuration value is out of range (for
//!   example an even filter window). Correct the settings and re-run
//!   [`prepare_data`](crate::engine::manager::AnalysisManager::prepare_data).
//!
//! ## Data Quality Errors (Re-collect or Loosen Thresholds)
//!
//! - **`InsufficientData`**: A run has fewer samples than the filter window
//!   requires, or a trimming step emptied it. Often caused by a motion
//!   threshold above the mechanism's actual speeds, or by a test that was
//!   stopped too early.
//!
//! - **`SingularNormalMatrix`**: The regressors are linearly dependent and
//!   the least-squares fit has no unique solution. Typically a run with no
//!   acceleration variation, or an arm log recorded in linear units.
//!
//! - **`NonPhysicalPlant`**: The fitted velocity or acceleration gain is
//!   non-positive, so no stabilizing feedback gain exists. Indicates a bad
//!   fit; inspect the feedforward diagnostics before trusting any output.
//!
//! - **`ZeroHeadingChange`**: The angular drivetrain's slow-forward run
//!   turned too little to estimate track width.
//!
//! Every error is surfaced to the caller verbatim; the analysis never
//! substitutes defaults for failed stages.

use thiserror::Error;

/// Errors that can occur during analysis.
///
/// See module-level documentation for recovery strategies.
#[derive(Error, Debug)]
pub enum Error {
    #[error("unable to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("unknown test type: {0:?}")]
    UnknownAnalysisType(String),

    #[error("unknown units: {0:?}")]
    UnknownUnit(String),

    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    #[error("insufficient data: {0}")]
    InsufficientData(&'static str),

    #[error("normal matrix is singular; the regressors are linearly dependent")]
    SingularNormalMatrix,

    #[error("non-physical plant: {0}")]
    NonPhysicalPlant(String),

    #[error("heading change too small to estimate track width")]
    ZeroHeadingChange,
}

pub type Result<T> = std::result::Result<T, Error>;
