//! Error types for the smilefit library.
//!
//! All fallible operations return `Result<T, SmileError>` rather than
//! panicking, providing meaningful diagnostics for calibration failures,
//! invalid inputs, and numerical issues. At the pipeline boundary every
//! error maps to a stable reason string; raw internals never leak.

use thiserror::Error;

/// Convenience type alias for results in this crate.
pub type Result<T> = std::result::Result<T, SmileError>;

/// Why a calibration run failed after the solver was entered.
///
/// Input problems are reported as [`SmileError::InvalidInput`] *before* any
/// solver iteration; this enum only covers failures of the solve itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationFailure {
    /// The solver exhausted its iteration budget without meeting tolerance.
    NonConvergence,
    /// A residual or step became non-finite during the solve.
    NumericalFailure,
}

impl CalibrationFailure {
    /// Stable reason string used in boundary error messages.
    pub fn as_str(self) -> &'static str {
        match self {
            CalibrationFailure::NonConvergence => "NON_CONVERGENCE",
            CalibrationFailure::NumericalFailure => "NUMERICAL_FAILURE",
        }
    }
}

/// Errors that can occur during smile calibration, sensitivity extraction,
/// and density/probability computation.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SmileError {
    /// Input data is invalid (bad ranges, non-monotonic or duplicate
    /// strikes, mismatched lengths). Raised before any numerical work.
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// Smile calibration failed after the solver ran.
    #[error("calibration failed ({}): {message}", reason.as_str())]
    Calibration {
        message: String,
        /// Model that failed (e.g., "ASV", "ZABR_CLASSICAL").
        model: &'static str,
        /// Failure class, stable across releases.
        reason: CalibrationFailure,
        /// Solver iterations performed before the failure.
        iterations: usize,
        /// Final sum-of-squares residual, if one was computed.
        residual: Option<f64>,
    },

    /// The requested model variant is not supported.
    #[error("backend unavailable: {message}")]
    BackendUnavailable { message: String },

    /// Numerical computation failed (NaN, ill-conditioned system).
    #[error("numerical error: {message}")]
    Numerical { message: String },

    /// A quantity is undefined at the requested point (e.g., implied vol
    /// from a negative time value).
    #[error("domain error: {message}")]
    Domain { message: String },
}
