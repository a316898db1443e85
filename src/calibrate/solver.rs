//! Least-squares solvers driving smile calibration.
//!
//! Two families behind one entry point: damped Gauss-Newton
//! (Levenberg-Marquardt) with a numerical Jacobian and bound projection,
//! and a derivative-free Nelder-Mead simplex for objectives whose
//! residuals are rough. Both run an explicit
//! `Initialized -> Fitting -> {Converged, Failed}` state machine: a solve
//! that leaves `Fitting` without reaching `Converged` surfaces as a
//! [`SmileError::Calibration`], never as a silently returned last iterate.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::{CalibrationFailure, Result, SmileError};

/// Solver family for the nonlinear least-squares fit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolverFamily {
    /// Damped Gauss-Newton with numerical Jacobian.
    #[default]
    LevenbergMarquardt,
    /// Derivative-free simplex search.
    NelderMead,
}

/// Solver configuration: family, iteration budget, and tolerances.
///
/// The iteration budget is the only timeout mechanism — there is no
/// mid-solve cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Which solver drives the fit.
    pub family: SolverFamily,
    /// Maximum outer iterations before the solve fails.
    pub max_iterations: usize,
    /// Function tolerance: relative cost decrease below this converges.
    pub ftol: f64,
    /// Parameter tolerance: step size below this converges.
    pub xtol: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            family: SolverFamily::LevenbergMarquardt,
            max_iterations: 200,
            ftol: 1e-12,
            xtol: 1e-12,
        }
    }
}

/// Outcome accounting for a finished solve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolveReport {
    /// Outer iterations performed.
    pub iterations: usize,
    /// Final sum of squared residuals.
    pub residual: f64,
    /// Root-mean-square residual.
    pub rms_error: f64,
}

/// A converged solve: the minimizer and its accounting.
#[derive(Debug, Clone)]
pub struct SolveOutcome {
    /// Parameter vector at the minimum.
    pub x: Vec<f64>,
    /// Iteration and residual accounting.
    pub report: SolveReport,
}

/// Lifecycle of one solve. No backward transitions; every call starts
/// fresh at `Initialized`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SolveState {
    Initialized,
    Fitting,
    Converged,
    Failed(CalibrationFailure),
}

/// Minimize the sum of squared residuals subject to box bounds.
///
/// `residuals` may fail for an inadmissible trial point; the solvers treat
/// a failing or non-finite trial as an infinitely bad step and back off.
/// A failure at the *initial* point is unrecoverable and reported as
/// `NUMERICAL_FAILURE`.
///
/// # Errors
/// [`SmileError::Calibration`] with reason `NON_CONVERGENCE` when the
/// iteration budget is exhausted (or no improving step exists), and
/// `NUMERICAL_FAILURE` when residuals become non-finite where they must
/// not.
pub fn least_squares<F>(
    model: &'static str,
    residuals: &F,
    x0: &[f64],
    bounds: &[(f64, f64)],
    config: &SolverConfig,
) -> Result<SolveOutcome>
where
    F: Fn(&[f64]) -> Result<Vec<f64>>,
{
    match config.family {
        SolverFamily::LevenbergMarquardt => {
            levenberg_marquardt(model, residuals, x0, bounds, config)
        }
        SolverFamily::NelderMead => nelder_mead(model, residuals, x0, bounds, config),
    }
}

fn project(x: &mut [f64], bounds: &[(f64, f64)]) {
    for (xi, &(lo, hi)) in x.iter_mut().zip(bounds) {
        *xi = xi.clamp(lo, hi);
    }
}

fn sum_of_squares(r: &[f64]) -> f64 {
    r.iter().map(|v| v * v).sum()
}

fn finite(r: &[f64]) -> bool {
    r.iter().all(|v| v.is_finite())
}

fn failure(
    model: &'static str,
    reason: CalibrationFailure,
    message: String,
    iterations: usize,
    residual: Option<f64>,
) -> SmileError {
    SmileError::Calibration {
        message,
        model,
        reason,
        iterations,
        residual,
    }
}

fn levenberg_marquardt<F>(
    model: &'static str,
    residuals: &F,
    x0: &[f64],
    bounds: &[(f64, f64)],
    config: &SolverConfig,
) -> Result<SolveOutcome>
where
    F: Fn(&[f64]) -> Result<Vec<f64>>,
{
    let n = x0.len();
    let mut state = SolveState::Initialized;
    debug_assert_eq!(state, SolveState::Initialized);

    let mut x = x0.to_vec();
    project(&mut x, bounds);

    let r0 = residuals(&x).map_err(|e| {
        failure(
            model,
            CalibrationFailure::NumericalFailure,
            format!("residuals undefined at initial guess: {e}"),
            0,
            None,
        )
    })?;
    if !finite(&r0) {
        return Err(failure(
            model,
            CalibrationFailure::NumericalFailure,
            "non-finite residual at initial guess".into(),
            0,
            None,
        ));
    }
    let m = r0.len();
    let mut r = DVector::from_vec(r0);
    let mut cost = r.norm_squared();
    let mut lambda = 1e-3;
    let mut iterations = 0usize;

    state = SolveState::Fitting;
    if cost <= 1e-30 {
        state = SolveState::Converged;
    }

    while state == SolveState::Fitting && iterations < config.max_iterations {
        iterations += 1;

        // Forward-difference Jacobian, bumping away from an active bound.
        let mut jac = DMatrix::<f64>::zeros(m, n);
        for j in 0..n {
            let h = 1e-7 * (1.0 + x[j].abs());
            let mut xb = x.clone();
            let forward_ok = x[j] + h <= bounds[j].1;
            if forward_ok {
                xb[j] += h;
            } else {
                xb[j] -= h;
            }
            let rb = residuals(&xb).map_err(|e| {
                failure(
                    model,
                    CalibrationFailure::NumericalFailure,
                    format!("residuals undefined while differencing parameter {j}: {e}"),
                    iterations,
                    Some(cost),
                )
            })?;
            if !finite(&rb) {
                return Err(failure(
                    model,
                    CalibrationFailure::NumericalFailure,
                    format!("non-finite residual while differencing parameter {j}"),
                    iterations,
                    Some(cost),
                ));
            }
            let sign = if forward_ok { 1.0 } else { -1.0 };
            for i in 0..m {
                jac[(i, j)] = sign * (rb[i] - r[i]) / h;
            }
        }

        let jt = jac.transpose();
        let jtj = &jt * &jac;
        let jtr = &jt * &r;

        // Adapt the damping until a step improves the cost.
        while state == SolveState::Fitting {
            let mut damped = jtj.clone();
            for j in 0..n {
                let d = jtj[(j, j)].max(1e-12);
                damped[(j, j)] += lambda * d;
            }
            let step = match damped.lu().solve(&(-&jtr)) {
                Some(s) if s.iter().all(|v| v.is_finite()) => s,
                _ => {
                    lambda *= 10.0;
                    if lambda > 1e12 {
                        state = SolveState::Failed(CalibrationFailure::NumericalFailure);
                    }
                    continue;
                }
            };

            let mut x_new: Vec<f64> = x.iter().zip(step.iter()).map(|(a, b)| a + b).collect();
            project(&mut x_new, bounds);

            // Projected step collapsed (bound-pinned or damped to nothing):
            // no admissible movement remains.
            let step_norm = x_new
                .iter()
                .zip(x.iter())
                .map(|(a, b)| (a - b) * (a - b))
                .sum::<f64>()
                .sqrt();
            let x_norm = x.iter().map(|v| v * v).sum::<f64>().sqrt();
            if step_norm <= config.xtol * (1.0 + x_norm) {
                state = SolveState::Converged;
                break;
            }

            let trial = match residuals(&x_new) {
                Ok(rn) if finite(&rn) => {
                    let rv = DVector::from_vec(rn);
                    let c = rv.norm_squared();
                    Some((rv, c))
                }
                _ => None,
            };

            match trial {
                Some((r_new, cost_new)) if cost_new < cost => {
                    let reduction = cost - cost_new;
                    x = x_new;
                    r = r_new;
                    cost = cost_new;
                    lambda = (lambda * 0.3).max(1e-12);
                    if cost <= 1e-30
                        || reduction <= config.ftol * (1.0 + cost)
                        || step_norm <= config.xtol * (1.0 + x_norm)
                    {
                        state = SolveState::Converged;
                    }
                    break;
                }
                _ => {
                    lambda *= 10.0;
                    if lambda > 1e12 {
                        // No improving step exists at any damping level.
                        state = SolveState::Failed(CalibrationFailure::NonConvergence);
                    }
                }
            }
        }
    }

    finish(model, state, x, cost, m, iterations, config)
}

fn nelder_mead<F>(
    model: &'static str,
    residuals: &F,
    x0: &[f64],
    bounds: &[(f64, f64)],
    config: &SolverConfig,
) -> Result<SolveOutcome>
where
    F: Fn(&[f64]) -> Result<Vec<f64>>,
{
    let n = x0.len();
    let mut state = SolveState::Initialized;
    debug_assert_eq!(state, SolveState::Initialized);

    // Residual count for the RMS accounting, from the initial point.
    let mut x_init = x0.to_vec();
    project(&mut x_init, bounds);
    let r0 = residuals(&x_init).map_err(|e| {
        failure(
            model,
            CalibrationFailure::NumericalFailure,
            format!("residuals undefined at initial guess: {e}"),
            0,
            None,
        )
    })?;
    let m = r0.len();

    let objective = |x: &[f64]| -> f64 {
        match residuals(x) {
            Ok(r) if finite(&r) => sum_of_squares(&r),
            _ => f64::INFINITY,
        }
    };

    // Initial simplex: perturb each coordinate by 10% (or an absolute
    // floor for coordinates near zero), staying inside the bounds.
    let mut simplex: Vec<(Vec<f64>, f64)> = Vec::with_capacity(n + 1);
    simplex.push((x_init.clone(), sum_of_squares(&r0)));
    for j in 0..n {
        let mut xj = x_init.clone();
        let pert = if xj[j].abs() > 1e-8 {
            xj[j] * 0.1
        } else {
            0.01
        };
        xj[j] += pert;
        project(&mut xj, bounds);
        let fj = objective(&xj);
        simplex.push((xj, fj));
    }

    let mut iterations = 0usize;
    state = SolveState::Fitting;
    if simplex[0].1 <= 1e-30 {
        state = SolveState::Converged;
    }

    while state == SolveState::Fitting && iterations < config.max_iterations {
        iterations += 1;
        simplex.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

        let spread = simplex[n].1 - simplex[0].1;
        let diameter = simplex
            .iter()
            .flat_map(|(a, _)| {
                simplex.iter().map(move |(b, _)| {
                    a.iter()
                        .zip(b.iter())
                        .map(|(p, q)| (p - q) * (p - q))
                        .sum::<f64>()
                        .sqrt()
                })
            })
            .fold(0.0_f64, f64::max);
        if spread.is_finite() && spread < config.ftol || diameter < config.xtol {
            state = SolveState::Converged;
            break;
        }

        // Centroid of all but the worst vertex.
        let mut centroid = vec![0.0; n];
        for (vertex, _) in simplex.iter().take(n) {
            for (c, v) in centroid.iter_mut().zip(vertex) {
                *c += v / n as f64;
            }
        }

        let worst = simplex[n].0.clone();
        let propose = |coef: f64| -> (Vec<f64>, f64) {
            let mut p: Vec<f64> = centroid
                .iter()
                .zip(worst.iter())
                .map(|(c, w)| c + coef * (c - w))
                .collect();
            project(&mut p, bounds);
            let f = objective(&p);
            (p, f)
        };

        let (reflected, fr) = propose(1.0);
        if fr < simplex[0].1 {
            let (expanded, fe) = propose(2.0);
            simplex[n] = if fe < fr { (expanded, fe) } else { (reflected, fr) };
        } else if fr < simplex[n - 1].1 {
            simplex[n] = (reflected, fr);
        } else {
            let (contracted, fc) = if fr < simplex[n].1 {
                propose(0.5)
            } else {
                propose(-0.5)
            };
            if fc < simplex[n].1.min(fr) {
                simplex[n] = (contracted, fc);
            } else {
                // Shrink toward the best vertex.
                let best = simplex[0].0.clone();
                for entry in simplex.iter_mut().skip(1) {
                    for (v, b) in entry.0.iter_mut().zip(&best) {
                        *v = b + 0.5 * (*v - b);
                    }
                    entry.1 = objective(&entry.0);
                }
            }
        }
    }

    simplex.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
    let (best_x, best_f) = simplex.swap_remove(0);
    finish(model, state, best_x, best_f, m, iterations, config)
}

fn finish(
    model: &'static str,
    state: SolveState,
    x: Vec<f64>,
    cost: f64,
    m: usize,
    iterations: usize,
    config: &SolverConfig,
) -> Result<SolveOutcome> {
    match state {
        SolveState::Converged => Ok(SolveOutcome {
            x,
            report: SolveReport {
                iterations,
                residual: cost,
                rms_error: (cost / m.max(1) as f64).sqrt(),
            },
        }),
        SolveState::Failed(CalibrationFailure::NumericalFailure) => Err(failure(
            model,
            CalibrationFailure::NumericalFailure,
            "linear solve degenerated during damping adaptation".into(),
            iterations,
            Some(cost),
        )),
        // Budget exhausted, stagnation, or still initializing.
        _ => Err(failure(
            model,
            CalibrationFailure::NonConvergence,
            format!(
                "no convergence within {} iterations (ftol {:.1e}, xtol {:.1e})",
                config.max_iterations, config.ftol, config.xtol
            ),
            iterations,
            Some(cost),
        )),
    }
}
