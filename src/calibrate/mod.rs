//! Calibration orchestration.
//!
//! The orchestrator validates all inputs *before* any numerical work,
//! drives the chosen backend's calibrate capability, and hands back an
//! immutable [`FittedModel`] that every downstream reader (sensitivity
//! engine, density extractor, finite-difference validator) shares.
//!
//! It is stateless across invocations: each call starts fresh, nothing is
//! retried with alternate initial guesses, and the initial guess itself is
//! never mutated.

pub mod solver;

use std::sync::Arc;

pub use solver::{SolveOutcome, SolveReport, SolverConfig, SolverFamily};

use crate::error::{Result, SmileError};
use crate::quotes::{MarketQuote, QuoteSet, QuoteWeighting};
use crate::smile::{AsvParams, MixtureParams, SabrPdeParams, SmileModel, ZabrParams};
use crate::validate::validate_positive;

/// A calibrated smile bound to one backend variant.
///
/// Produced exactly once per calibration call; immutable thereafter.
/// Everything downstream is a pure function of (`FittedModel`,
/// strike grid).
#[derive(Debug, Clone)]
pub struct FittedModel {
    model: Arc<dyn SmileModel>,
    variant: &'static str,
    diagnostics: SolveReport,
}

impl FittedModel {
    /// Bind a calibrated model to its variant name and solve accounting.
    pub fn new(model: Arc<dyn SmileModel>, variant: &'static str, diagnostics: SolveReport) -> Self {
        Self {
            model,
            variant,
            diagnostics,
        }
    }

    /// The calibrated smile.
    pub fn model(&self) -> &dyn SmileModel {
        self.model.as_ref()
    }

    /// Share the smile with another reader or worker thread.
    pub fn share(&self) -> Arc<dyn SmileModel> {
        Arc::clone(&self.model)
    }

    /// Stable variant name (e.g., "ASV", "ZABR_CLASSICAL").
    pub fn variant(&self) -> &'static str {
        self.variant
    }

    /// Solve accounting: iterations, residual, RMS error.
    pub fn diagnostics(&self) -> &SolveReport {
        &self.diagnostics
    }
}

/// The calibrate capability of one model variant.
///
/// Parameter records implement this; the record doubles as the initial
/// guess. The trait is also the instrumentation seam: tests substitute a
/// counting double to verify that invalid inputs never reach a backend.
pub trait CalibrationBackend {
    /// Stable variant name.
    fn name(&self) -> &'static str;

    /// Fit to validated quotes with per-quote weights.
    fn calibrate(
        &self,
        quotes: &QuoteSet,
        weights: &[f64],
        config: &SolverConfig,
    ) -> Result<FittedModel>;
}

impl CalibrationBackend for AsvParams {
    fn name(&self) -> &'static str {
        "ASV"
    }

    fn calibrate(
        &self,
        quotes: &QuoteSet,
        weights: &[f64],
        config: &SolverConfig,
    ) -> Result<FittedModel> {
        let (smile, report) = AsvParams::calibrate(self, quotes, weights, config)?;
        Ok(FittedModel::new(Arc::new(smile), self.name(), report))
    }
}

impl CalibrationBackend for ZabrParams {
    fn name(&self) -> &'static str {
        "ZABR_CLASSICAL"
    }

    fn calibrate(
        &self,
        quotes: &QuoteSet,
        weights: &[f64],
        config: &SolverConfig,
    ) -> Result<FittedModel> {
        let (smile, report) = ZabrParams::calibrate(self, quotes, weights, config)?;
        Ok(FittedModel::new(Arc::new(smile), self.name(), report))
    }
}

impl CalibrationBackend for MixtureParams {
    fn name(&self) -> &'static str {
        "ZABR_MIXTURE"
    }

    fn calibrate(
        &self,
        quotes: &QuoteSet,
        weights: &[f64],
        config: &SolverConfig,
    ) -> Result<FittedModel> {
        let (smile, report) = MixtureParams::calibrate(self, quotes, weights, config)?;
        Ok(FittedModel::new(Arc::new(smile), self.name(), report))
    }
}

impl CalibrationBackend for SabrPdeParams {
    fn name(&self) -> &'static str {
        "SABR_PDE"
    }

    fn calibrate(
        &self,
        quotes: &QuoteSet,
        weights: &[f64],
        config: &SolverConfig,
    ) -> Result<FittedModel> {
        let (smile, report) = SabrPdeParams::calibrate(self, quotes, weights, config)?;
        Ok(FittedModel::new(Arc::new(smile), self.name(), report))
    }
}

/// Calibrate a backend against raw market quotes.
///
/// Validation happens here, before any solver iteration: quote invariants
/// (strictly increasing unique strikes, positive mids), weighting
/// requirements, and solver-configuration sanity. Only then is the
/// backend's calibrate capability invoked. On a validation failure the
/// backend is never touched — zero solver iterations are performed.
///
/// # Errors
/// [`SmileError::InvalidInput`] for bad quotes, weights, or config;
/// whatever the backend reports otherwise.
pub fn calibrate(
    backend: &dyn CalibrationBackend,
    quotes: &[MarketQuote],
    weighting: QuoteWeighting,
    config: &SolverConfig,
) -> Result<FittedModel> {
    let set = QuoteSet::new(quotes.to_vec())?;
    let weights = set.weights(weighting)?;
    validate_config(config)?;
    backend.calibrate(&set, &weights, config)
}

fn validate_config(config: &SolverConfig) -> Result<()> {
    validate_positive(config.ftol, "ftol")?;
    validate_positive(config.xtol, "xtol")?;
    Ok(())
}
