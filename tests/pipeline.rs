//! Integration tests for the smilefit pipeline.
//!
//! Exercises the full path from market quotes through calibration,
//! sensitivity extraction, density/probability derivation, and the
//! finite-difference cross-check, for every model variant and for the
//! boundary envelope.

use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};

use approx::{assert_abs_diff_eq, assert_relative_eq};
use smilefit::calibrate::{self, CalibrationBackend, SolverConfig};
use smilefit::pipeline::{self, ModelKind, ModelSpec, PipelineRequest};
use smilefit::quotes::{MarketQuote, QuoteSet, QuoteWeighting};
use smilefit::sample::SampleData;
use smilefit::smile::{AsvParams, AsvSmile, SabrPdeSmile, SmileModel, ZabrClassicalSmile};
use smilefit::{GridSpec, SmileError, StrikeGrid};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn sample() -> SampleData {
    SampleData::new().unwrap()
}

/// Synthetic ASV market: quotes generated from known parameters.
fn asv_synthetic_quotes(truth: &AsvSmile, strikes: &[f64]) -> Vec<MarketQuote> {
    strikes
        .iter()
        .map(|&k| MarketQuote::new(k, truth.vol(k).unwrap().0))
        .collect()
}

fn asv_pipeline_request() -> PipelineRequest {
    let truth = AsvSmile::new(sample().asv);
    let strikes: Vec<f64> = (0..12).map(|i| 0.5 + 0.1 * i as f64).collect();
    PipelineRequest {
        model: ModelSpec::Asv(
            AsvParams::new(1.0, 0.333, 0.2, 0.2, 0.18, 0.0, 0.0, 0.0, 0.0).unwrap(),
        ),
        quotes: asv_synthetic_quotes(&truth, &strikes),
        grid: GridSpec::Range {
            start: 0.5,
            stop: 1.6,
            count: 23,
        },
        solver: SolverConfig::default(),
        weighting: QuoteWeighting::Unweighted,
    }
}

// ---------------------------------------------------------------------------
// Scenario 1: ZABR classical calibration on the sample rates market
// ---------------------------------------------------------------------------

#[test]
fn scenario_1_zabr_classical_calibrates_sample_market() {
    let sample = sample();
    let fitted = calibrate::calibrate(
        &sample.zabr_classical,
        &sample.quotes,
        QuoteWeighting::Unweighted,
        &SolverConfig::default(),
    )
    .unwrap();

    // The fit reproduces the seven market quotes within a reasonable RMS
    // (vols are ~5e-3, so this bounds the average miss well under 20%).
    assert!(
        fitted.diagnostics().rms_error < 1e-3,
        "RMS {} too large for the sample market",
        fitted.diagnostics().rms_error
    );
    assert!(fitted.diagnostics().iterations > 0);

    // The fitted smile's minimum sits near the forward, rising beyond.
    let grid = StrikeGrid::linspace(0.002, 0.12, 60).unwrap();
    let vols = fitted.model().evaluate(&grid).unwrap();
    let (argmin, _) = vols
        .iter()
        .enumerate()
        .fold((0, f64::INFINITY), |(bi, bv), (i, &v)| {
            if v < bv { (i, v) } else { (bi, bv) }
        });
    let min_strike = grid.strikes()[argmin];
    assert!(
        (0.002..=0.04).contains(&min_strike),
        "smile minimum at {min_strike}, expected near the 0.02 forward"
    );

    // Rising call wing beyond 0.04.
    let vol_at = |target: f64| vols[grid.nearest_index(target)];
    assert!(vol_at(0.06) > vol_at(0.045));
    assert!(vol_at(0.10) > vol_at(0.06));
}

#[test]
fn scenario_1_through_the_envelope() {
    let sample = sample();
    let report = pipeline::run_named(
        "classical",
        &sample,
        GridSpec::Range {
            start: 0.002,
            stop: 0.12,
            count: 60,
        },
        SolverConfig::default(),
    );
    assert_eq!(report.status, "success");
    let data = report.data.unwrap();
    assert_eq!(data.strikes.len(), 60);
    assert_eq!(data.market_strikes.len(), 7);
    assert!(data.vols.iter().all(|v| v.is_finite() && *v > 0.0));
}

#[test]
fn asv_sample_market_calibrates_inside_the_quoted_spread() {
    let sample = sample();
    let fitted = calibrate::calibrate(
        &sample.asv,
        &sample.asv_quotes,
        QuoteWeighting::Unweighted,
        &SolverConfig::default(),
    )
    .unwrap();
    for q in &sample.asv_quotes {
        let v = fitted.model().vol(q.strike).unwrap().0;
        assert!(
            q.bid.unwrap() <= v && v <= q.ask.unwrap(),
            "fitted vol {v} at strike {} outside the {}-{} market",
            q.strike,
            q.bid.unwrap(),
            q.ask.unwrap()
        );
    }
}

#[test]
fn inverse_spread_weighting_runs_end_to_end() {
    let sample = sample();
    let request = PipelineRequest {
        model: ModelSpec::Asv(sample.asv),
        quotes: sample.asv_quotes.clone(),
        grid: GridSpec::Range {
            start: 0.5,
            stop: 1.7,
            count: 25,
        },
        solver: SolverConfig::default(),
        weighting: QuoteWeighting::InverseSpread,
    };
    let report = pipeline::run(&request);
    assert_eq!(report.status, "success", "error: {:?}", report.error);
    assert_eq!(report.data.unwrap().market_strikes.len(), 10);
}

// ---------------------------------------------------------------------------
// Scenario 2: flat ASV smile
// ---------------------------------------------------------------------------

#[test]
fn scenario_2_flat_asv_smile_within_tolerance() {
    let params = AsvParams::new(1.0, 0.333, 0.2, 0.2, 0.1929, 0.0, 0.0, 0.0, 0.0).unwrap();
    let report = pipeline::evaluate_smile(
        &ModelSpec::Asv(params),
        &GridSpec::Range {
            start: 0.3,
            stop: 2.0,
            count: 50,
        },
    );
    assert_eq!(report.status, "success");
    let data = report.data.unwrap();
    assert_eq!(data.vols.len(), 50);
    for &v in &data.vols {
        assert_abs_diff_eq!(v, 0.1929, epsilon = 1e-4);
    }
}

// ---------------------------------------------------------------------------
// Scenario 3: unknown model type
// ---------------------------------------------------------------------------

#[test]
fn scenario_3_unknown_model_type_errors_cleanly() {
    let sample = sample();
    let report = pipeline::run_named(
        "quantum_vol",
        &sample,
        GridSpec::Range {
            start: 0.3,
            stop: 2.0,
            count: 10,
        },
        SolverConfig::default(),
    );
    assert_eq!(report.status, "error");
    assert!(report.data.is_none());
    let message = report.error.unwrap();
    assert!(
        message.contains("Unknown") || message.contains("Invalid"),
        "unexpected message: {message}"
    );
}

#[test]
fn model_kind_parse_is_the_only_gate() {
    assert!(ModelKind::from_str("asv").is_ok());
    assert!(ModelKind::from_str("mixture").is_ok());
    let err = ModelKind::from_str("bogus").unwrap_err();
    assert!(matches!(err, SmileError::BackendUnavailable { .. }));
}

// ---------------------------------------------------------------------------
// Scenario 4: invalid input stops before the backend
// ---------------------------------------------------------------------------

/// Instrumented backend: counts calibrate invocations.
struct CountingBackend {
    calls: AtomicUsize,
}

impl CalibrationBackend for CountingBackend {
    fn name(&self) -> &'static str {
        "MOCK"
    }

    fn calibrate(
        &self,
        _quotes: &QuoteSet,
        _weights: &[f64],
        _config: &SolverConfig,
    ) -> smilefit::Result<smilefit::FittedModel> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(SmileError::Numerical {
            message: "mock backend never fits".into(),
        })
    }
}

#[test]
fn scenario_4_duplicate_strike_runs_zero_solver_iterations() {
    let backend = CountingBackend {
        calls: AtomicUsize::new(0),
    };
    let quotes = vec![
        MarketQuote::new(0.01, 0.0046),
        MarketQuote::new(0.01, 0.0047),
        MarketQuote::new(0.02, 0.0048),
    ];
    let r = calibrate::calibrate(
        &backend,
        &quotes,
        QuoteWeighting::Unweighted,
        &SolverConfig::default(),
    );
    assert!(matches!(r, Err(SmileError::InvalidInput { .. })));
    assert_eq!(
        backend.calls.load(Ordering::SeqCst),
        0,
        "the backend must never be reached for invalid input"
    );
}

// ---------------------------------------------------------------------------
// Identity law and idempotence across variants
// ---------------------------------------------------------------------------

#[test]
fn bundle_vols_equal_evaluate_for_every_variant() {
    let sample = sample();

    let asv = AsvSmile::new(sample.asv);
    let grid = StrikeGrid::linspace(0.4, 1.9, 31).unwrap();
    assert_eq!(
        asv.sensitivities(&grid).unwrap().vols,
        asv.evaluate(&grid).unwrap()
    );

    let zabr = ZabrClassicalSmile::new(sample.zabr_classical);
    let grid = StrikeGrid::linspace(0.005, 0.1, 31).unwrap();
    assert_eq!(
        zabr.sensitivities(&grid).unwrap().vols,
        zabr.evaluate(&grid).unwrap()
    );

    let pde = SabrPdeSmile::new(sample.sabr_pde).unwrap();
    let grid = pde.pinned_grid().unwrap().clone();
    assert_eq!(
        pde.sensitivities(&grid).unwrap().vols,
        pde.evaluate(&grid).unwrap()
    );
}

#[test]
fn evaluate_is_bit_identical_across_calls() {
    let sample = sample();
    let zabr = ZabrClassicalSmile::new(sample.zabr_classical);
    let grid = StrikeGrid::linspace(0.005, 0.1, 20).unwrap();
    let a = zabr.evaluate(&grid).unwrap();
    let b = zabr.evaluate(&grid).unwrap();
    assert_eq!(a, b);

    let pde = SabrPdeSmile::new(sample.sabr_pde).unwrap();
    let grid = StrikeGrid::linspace(0.005, 0.1, 20).unwrap();
    assert_eq!(pde.evaluate(&grid).unwrap(), pde.evaluate(&grid).unwrap());
}

// ---------------------------------------------------------------------------
// Degenerate grids
// ---------------------------------------------------------------------------

#[test]
fn single_strike_grid_at_the_forward_survives() {
    let request = PipelineRequest {
        grid: GridSpec::Explicit(vec![1.0]),
        ..asv_pipeline_request()
    };
    let report = pipeline::run(&request);
    assert_eq!(report.status, "success");
    let data = report.data.unwrap();
    assert_eq!(data.strikes, vec![1.0]);
    assert!(data.density[0].is_finite());
    assert!(data.probability[0].is_finite());
    assert_relative_eq!(data.density[0], data.density_bump[0], max_relative = 1e-3);
}

// ---------------------------------------------------------------------------
// Calibration round-trip quality
// ---------------------------------------------------------------------------

#[test]
fn asv_round_trip_reproduces_market_vols() {
    let request = asv_pipeline_request();
    let fitted = calibrate::calibrate(
        match &request.model {
            ModelSpec::Asv(p) => p,
            _ => unreachable!(),
        },
        &request.quotes,
        QuoteWeighting::Unweighted,
        &request.solver,
    )
    .unwrap();
    assert!(fitted.diagnostics().rms_error < 1e-6);
    for q in &request.quotes {
        let v = fitted.model().vol(q.strike).unwrap().0;
        assert_abs_diff_eq!(v, q.mid, epsilon = 1e-6);
    }
}

#[test]
fn non_convergence_surfaces_as_error_envelope() {
    let mut request = asv_pipeline_request();
    request.solver.max_iterations = 0;
    let report = pipeline::run(&request);
    assert_eq!(report.status, "error");
    assert!(report.data.is_none());
    assert!(report.error.unwrap().contains("NON_CONVERGENCE"));
}

// ---------------------------------------------------------------------------
// Density agreement through the envelope
// ---------------------------------------------------------------------------

#[test]
fn analytic_and_bumped_curves_agree_for_fitted_zabr() {
    let sample = sample();
    let report = pipeline::run_named(
        "classical",
        &sample,
        GridSpec::Range {
            start: 0.008,
            stop: 0.09,
            count: 30,
        },
        SolverConfig::default(),
    );
    let data = report.data.unwrap();
    for i in 0..data.strikes.len() {
        assert_relative_eq!(data.density[i], data.density_bump[i], max_relative = 1e-3);
        assert_abs_diff_eq!(
            data.probability[i],
            data.probability_bump[i],
            epsilon = 1e-3
        );
    }
}

// ---------------------------------------------------------------------------
// SABR PDE through the pipeline (pinned grid)
// ---------------------------------------------------------------------------

#[test]
fn sabr_pde_pipeline_uses_its_pinned_mesh() {
    let sample = sample();
    let request = PipelineRequest {
        model: ModelSpec::SabrPde(sample.sabr_pde),
        quotes: sample.quotes.clone(),
        grid: GridSpec::BackendPinned,
        solver: SolverConfig::default(),
        weighting: QuoteWeighting::Unweighted,
    };
    let report = pipeline::run(&request);
    assert_eq!(report.status, "success");
    let data = report.data.unwrap();
    assert_eq!(data.strikes.len(), 101);

    // Interior of the mesh: curves finite and cross-validated. The zero
    // bound and the far edge may isolate to NaN where the time value has
    // died under the absorbing boundary.
    let finite_interior = data
        .strikes
        .iter()
        .zip(data.density.iter())
        .filter(|(&k, _)| k > 0.003 && k < 0.07)
        .all(|(_, d)| d.is_finite());
    assert!(finite_interior, "interior density must be finite");
}

#[test]
fn caller_grid_snaps_onto_the_pde_mesh() {
    let sample = sample();
    let pde = SabrPdeSmile::new(sample.sabr_pde).unwrap();
    let mesh = pde.pinned_grid().unwrap().clone();
    let spec = GridSpec::Explicit(vec![0.0051, 0.0199, 0.0703]);
    let resolved = spec.resolve(Some(&mesh)).unwrap();
    for k in resolved.iter() {
        assert!(mesh.strikes().contains(&k), "{k} is not a mesh node");
    }
}

// ---------------------------------------------------------------------------
// Concurrency: independent requests on parallel workers
// ---------------------------------------------------------------------------

#[test]
fn batch_of_mixed_variants_runs_concurrently() {
    let sample = sample();
    let requests = vec![
        asv_pipeline_request(),
        PipelineRequest {
            model: ModelSpec::ZabrClassical(sample.zabr_classical),
            quotes: sample.quotes.clone(),
            grid: GridSpec::Range {
                start: 0.005,
                stop: 0.1,
                count: 20,
            },
            solver: SolverConfig::default(),
            weighting: QuoteWeighting::Unweighted,
        },
        PipelineRequest {
            model: ModelSpec::ZabrMixture(sample.zabr_mixture),
            quotes: sample.quotes.clone(),
            grid: GridSpec::Range {
                start: 0.005,
                stop: 0.1,
                count: 20,
            },
            solver: SolverConfig::default(),
            weighting: QuoteWeighting::Unweighted,
        },
    ];
    let reports = pipeline::run_batch(&requests);
    assert_eq!(reports.len(), 3);
    for report in &reports {
        assert_eq!(report.status, "success", "error: {:?}", report.error);
    }
}

#[test]
fn fitted_model_shares_across_threads() {
    let sample = sample();
    let fitted = calibrate::calibrate(
        &sample.zabr_classical,
        &sample.quotes,
        QuoteWeighting::Unweighted,
        &SolverConfig::default(),
    )
    .unwrap();
    let reference = fitted.model().vol(0.02).unwrap().0;
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let shared = fitted.share();
            std::thread::spawn(move || shared.vol(0.02).unwrap().0)
        })
        .collect();
    for handle in handles {
        let v = handle.join().unwrap();
        assert_eq!(v.to_bits(), reference.to_bits(), "evaluation must be bit-stable");
    }
}

// ---------------------------------------------------------------------------
// Envelope serialization
// ---------------------------------------------------------------------------

#[test]
fn success_envelope_serializes_with_aligned_arrays() {
    let report = pipeline::run(&asv_pipeline_request());
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["status"], "success");
    assert!(json["error"].is_null());
    let data = &json["data"];
    let n = data["strikes"].as_array().unwrap().len();
    for field in [
        "vols",
        "density",
        "density_bump",
        "probability",
        "probability_bump",
    ] {
        assert_eq!(data[field].as_array().unwrap().len(), n, "{field} misaligned");
    }
}

#[test]
fn error_envelope_serializes_with_null_data() {
    let sample = sample();
    let report = pipeline::run_named(
        "nope",
        &sample,
        GridSpec::Range {
            start: 0.3,
            stop: 2.0,
            count: 5,
        },
        SolverConfig::default(),
    );
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["status"], "error");
    assert!(json["data"].is_null());
    assert!(json["error"].as_str().unwrap().contains("Unknown model type"));
}

// ---------------------------------------------------------------------------
// Nelder-Mead solver family end to end
// ---------------------------------------------------------------------------

#[test]
fn nelder_mead_family_calibrates_asv() {
    let mut request = asv_pipeline_request();
    request.solver = SolverConfig {
        family: smilefit::SolverFamily::NelderMead,
        max_iterations: 4000,
        ftol: 1e-14,
        xtol: 1e-10,
    };
    let report = pipeline::run(&request);
    assert_eq!(report.status, "success", "error: {:?}", report.error);
}
