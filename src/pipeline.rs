//! The one-call pipeline boundary.
//!
//! [`run`] is the single synchronous entry the service layer invokes:
//! calibrate, extract sensitivities, derive density/probability, validate
//! by bump-and-reprice, and package everything into the
//! `{status, data, error}` envelope. It never panics, never terminates
//! the process, and never returns partial data alongside an error —
//! on failure `data` is always `None`.
//!
//! Backend selection is explicit and fails fast: an unknown model-type
//! string maps to [`SmileError::BackendUnavailable`]. There is no mock
//! fallback at runtime; test doubles exist only in the test suite.

use std::str::FromStr;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::calibrate::{self, CalibrationBackend, SolverConfig};
use crate::density;
use crate::error::{Result, SmileError};
use crate::grid::GridSpec;
use crate::quotes::{MarketQuote, QuoteWeighting};
use crate::sample::SampleData;
use crate::sensitivity;
use crate::smile::{
    AsvParams, AsvSmile, MixtureParams, SabrPdeParams, SabrPdeSmile, SmileModel, ZabrClassicalSmile,
    ZabrMixtureSmile, ZabrParams,
};

/// Supported model-variant names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelKind {
    /// Extended-SVI closed form.
    Asv,
    /// ZABR classical.
    ZabrClassical,
    /// ZABR mixture.
    ZabrMixture,
    /// SABR PDE.
    SabrPde,
}

impl FromStr for ModelKind {
    type Err = SmileError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "asv" => Ok(ModelKind::Asv),
            "classical" | "zabr_classical" => Ok(ModelKind::ZabrClassical),
            "mixture" | "zabr_mixture" => Ok(ModelKind::ZabrMixture),
            "pde" | "sabr_pde" => Ok(ModelKind::SabrPde),
            other => Err(SmileError::BackendUnavailable {
                message: format!(
                    "Unknown model type: {other} (expected asv, classical, mixture, or pde)"
                ),
            }),
        }
    }
}

/// Tagged per-variant parameter record: the model request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ModelSpec {
    /// Extended-SVI closed form.
    Asv(AsvParams),
    /// ZABR classical.
    ZabrClassical(ZabrParams),
    /// ZABR mixture.
    ZabrMixture(MixtureParams),
    /// SABR PDE.
    SabrPde(SabrPdeParams),
}

impl ModelSpec {
    /// The variant this spec names.
    pub fn kind(&self) -> ModelKind {
        match self {
            ModelSpec::Asv(_) => ModelKind::Asv,
            ModelSpec::ZabrClassical(_) => ModelKind::ZabrClassical,
            ModelSpec::ZabrMixture(_) => ModelKind::ZabrMixture,
            ModelSpec::SabrPde(_) => ModelKind::SabrPde,
        }
    }

    /// The calibrate capability of this variant.
    fn backend(&self) -> &dyn CalibrationBackend {
        match self {
            ModelSpec::Asv(p) => p,
            ModelSpec::ZabrClassical(p) => p,
            ModelSpec::ZabrMixture(p) => p,
            ModelSpec::SabrPde(p) => p,
        }
    }

    /// Bind the parameters directly to a model without calibrating.
    fn build(&self) -> Result<std::sync::Arc<dyn SmileModel>> {
        Ok(match self {
            ModelSpec::Asv(p) => std::sync::Arc::new(AsvSmile::new(*p)),
            ModelSpec::ZabrClassical(p) => std::sync::Arc::new(ZabrClassicalSmile::new(*p)),
            ModelSpec::ZabrMixture(p) => std::sync::Arc::new(ZabrMixtureSmile::new(*p)),
            ModelSpec::SabrPde(p) => std::sync::Arc::new(SabrPdeSmile::new(*p)?),
        })
    }

    /// Default spec for a variant, taken from the sample data set.
    pub fn default_for(kind: ModelKind, sample: &SampleData) -> Self {
        match kind {
            ModelKind::Asv => ModelSpec::Asv(sample.asv),
            ModelKind::ZabrClassical => ModelSpec::ZabrClassical(sample.zabr_classical),
            ModelKind::ZabrMixture => ModelSpec::ZabrMixture(sample.zabr_mixture),
            ModelKind::SabrPde => ModelSpec::SabrPde(sample.sabr_pde),
        }
    }
}

/// One full pipeline request: model, quotes, grid, solver, weighting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRequest {
    /// Which variant to fit, with its initial guess.
    pub model: ModelSpec,
    /// Raw market quotes; validated by the orchestrator before any solve.
    pub quotes: Vec<MarketQuote>,
    /// Strike grid request.
    pub grid: GridSpec,
    /// Solver configuration.
    pub solver: SolverConfig,
    /// Residual weighting scheme.
    pub weighting: QuoteWeighting,
}

/// Index-aligned output curves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveSet {
    /// Resolved strike grid.
    pub strikes: Vec<f64>,
    /// Fitted model vols on the grid.
    pub vols: Vec<f64>,
    /// Analytic risk-neutral density.
    pub density: Vec<f64>,
    /// Finite-difference density counterpart.
    pub density_bump: Vec<f64>,
    /// Analytic cumulative probability.
    pub probability: Vec<f64>,
    /// Finite-difference probability counterpart.
    pub probability_bump: Vec<f64>,
    /// Market strikes the fit consumed (empty for evaluation-only runs).
    pub market_strikes: Vec<f64>,
    /// Market vols the fit consumed (empty for evaluation-only runs).
    pub market_vols: Vec<f64>,
}

/// The boundary envelope: `status` is "success" or "error"; on error
/// `data` is always `None` and `error` carries the stable reason string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    /// "success" or "error".
    pub status: String,
    /// Output curves, present only on success.
    pub data: Option<CurveSet>,
    /// Reason string, present only on error.
    pub error: Option<String>,
}

impl PipelineReport {
    fn success(data: CurveSet) -> Self {
        Self {
            status: "success".into(),
            data: Some(data),
            error: None,
        }
    }

    fn failure(err: &SmileError) -> Self {
        Self {
            status: "error".into(),
            data: None,
            error: Some(err.to_string()),
        }
    }
}

/// Calibrate, derive, validate, and assemble. Never panics; every
/// failure is wrapped into the error taxonomy's reason string.
pub fn run(request: &PipelineRequest) -> PipelineReport {
    match run_inner(request) {
        Ok(data) => PipelineReport::success(data),
        Err(e) => PipelineReport::failure(&e),
    }
}

fn run_inner(request: &PipelineRequest) -> Result<CurveSet> {
    #[cfg(feature = "logging")]
    tracing::debug!(kind = ?request.model.kind(), n_quotes = request.quotes.len(), "pipeline run");

    let fitted = calibrate::calibrate(
        request.model.backend(),
        &request.quotes,
        request.weighting,
        &request.solver,
    )?;
    let model = fitted.model();

    let (grid, bundle) = sensitivity::compute(model, &request.grid)?;
    let curves = density::extract(model, &grid, &bundle)?;

    Ok(CurveSet {
        strikes: grid.strikes().to_vec(),
        vols: bundle.vols,
        density: curves.density,
        density_bump: curves.density_bump,
        probability: curves.probability,
        probability_bump: curves.probability_bump,
        market_strikes: request.quotes.iter().map(|q| q.strike).collect(),
        market_vols: request.quotes.iter().map(|q| q.mid).collect(),
    })
}

/// Evaluation-only path: bind the given parameters directly (no
/// calibration) and produce the same curve set on the grid. This is the
/// interactive what-if entry: move a parameter, see the smile and its
/// density respond.
pub fn evaluate_smile(spec: &ModelSpec, grid: &GridSpec) -> PipelineReport {
    let inner = || -> Result<CurveSet> {
        let model = spec.build()?;
        let (grid, bundle) = sensitivity::compute(model.as_ref(), grid)?;
        let curves = density::extract(model.as_ref(), &grid, &bundle)?;
        Ok(CurveSet {
            strikes: grid.strikes().to_vec(),
            vols: bundle.vols,
            density: curves.density,
            density_bump: curves.density_bump,
            probability: curves.probability,
            probability_bump: curves.probability_bump,
            market_strikes: Vec::new(),
            market_vols: Vec::new(),
        })
    };
    match inner() {
        Ok(data) => PipelineReport::success(data),
        Err(e) => PipelineReport::failure(&e),
    }
}

/// String-keyed entry mirroring the service layer: pick a variant by
/// name, start from the sample defaults, calibrate to the matching sample
/// market (equity-style for ASV, rates for the rest). An unknown name
/// produces the error envelope, never a fallback model.
pub fn run_named(
    model_type: &str,
    sample: &SampleData,
    grid: GridSpec,
    solver: SolverConfig,
) -> PipelineReport {
    let kind = match ModelKind::from_str(model_type) {
        Ok(kind) => kind,
        Err(e) => return PipelineReport::failure(&e),
    };
    let quotes = match kind {
        ModelKind::Asv => sample.asv_quotes.clone(),
        _ => sample.quotes.clone(),
    };
    let request = PipelineRequest {
        model: ModelSpec::default_for(kind, sample),
        quotes,
        grid,
        solver,
        weighting: QuoteWeighting::Unweighted,
    };
    run(&request)
}

/// Run independent requests concurrently. Safety follows from the
/// immutability of fitted models and quotes; each request still executes
/// its own pipeline sequentially.
pub fn run_batch(requests: &[PipelineRequest]) -> Vec<PipelineReport> {
    requests.par_iter().map(run).collect()
}
