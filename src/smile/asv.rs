//! ASV (analytical sigma volatility) smile model.
//!
//! An extended-SVI closed form in log-moneyness x = ln(K/F):
//!
//! ```text
//! σ(x) = atm + skew·x + smile·x² + put·x²·s(−x/ctrl_p) + call·x²·s(x/ctrl_c)
//! ```
//!
//! where `s(u) = (1 + tanh u)/2` activates each wing smoothly on its own
//! side of the money. The atm/skew/smile terms set the level, tilt, and
//! curvature of the body; the put and call wings add one-sided curvature
//! controlled by the `ctrl_p`/`ctrl_c` decay scales.
//!
//! Every partial in the sensitivity bundle is analytic for this family,
//! which is what makes it the reference variant for validating the
//! finite-difference machinery.

use serde::{Deserialize, Serialize};

use crate::calibrate::solver::{self, SolveReport, SolverConfig};
use crate::conventions::log_moneyness;
use crate::error::{self, CalibrationFailure, SmileError};
use crate::grid::StrikeGrid;
use crate::quotes::QuoteSet;
use crate::sensitivity::SensitivityBundle;
use crate::smile::SmileModel;
use crate::types::{Vol, VolType};
use crate::validate::{validate_finite, validate_positive};

/// ASV parameter record: reference level, expiry, and the seven shape
/// fields. Immutable value, validated at construction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "AsvParamsRaw", into = "AsvParamsRaw")]
pub struct AsvParams {
    reference: f64,
    expiry: f64,
    /// Put-wing decay scale.
    ctrl_p: f64,
    /// Call-wing decay scale.
    ctrl_c: f64,
    /// At-the-money vol level.
    atm: f64,
    /// Linear tilt in log-moneyness.
    skew: f64,
    /// Symmetric curvature.
    smile: f64,
    /// Put-wing weight.
    put: f64,
    /// Call-wing weight.
    call: f64,
}

#[derive(Serialize, Deserialize)]
struct AsvParamsRaw {
    reference: f64,
    expiry: f64,
    ctrl_p: f64,
    ctrl_c: f64,
    atm: f64,
    skew: f64,
    smile: f64,
    put: f64,
    call: f64,
}

impl TryFrom<AsvParamsRaw> for AsvParams {
    type Error = SmileError;
    fn try_from(raw: AsvParamsRaw) -> Result<Self, Self::Error> {
        Self::new(
            raw.reference,
            raw.expiry,
            raw.ctrl_p,
            raw.ctrl_c,
            raw.atm,
            raw.skew,
            raw.smile,
            raw.put,
            raw.call,
        )
    }
}

impl From<AsvParams> for AsvParamsRaw {
    fn from(p: AsvParams) -> Self {
        Self {
            reference: p.reference,
            expiry: p.expiry,
            ctrl_p: p.ctrl_p,
            ctrl_c: p.ctrl_c,
            atm: p.atm,
            skew: p.skew,
            smile: p.smile,
            put: p.put,
            call: p.call,
        }
    }
}

impl AsvParams {
    /// Create a validated parameter record.
    ///
    /// # Errors
    /// Returns [`SmileError::InvalidInput`] if reference, expiry, control
    /// points, or atm are non-positive, or any shape field is non-finite.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        reference: f64,
        expiry: f64,
        ctrl_p: f64,
        ctrl_c: f64,
        atm: f64,
        skew: f64,
        smile: f64,
        put: f64,
        call: f64,
    ) -> error::Result<Self> {
        validate_positive(reference, "reference")?;
        validate_positive(expiry, "expiry")?;
        validate_positive(ctrl_p, "ctrl_p")?;
        validate_positive(ctrl_c, "ctrl_c")?;
        validate_positive(atm, "atm")?;
        validate_finite(skew, "skew")?;
        validate_finite(smile, "smile")?;
        validate_finite(put, "put")?;
        validate_finite(call, "call")?;
        Ok(Self {
            reference,
            expiry,
            ctrl_p,
            ctrl_c,
            atm,
            skew,
            smile,
            put,
            call,
        })
    }

    /// Reference (forward) level.
    pub fn reference(&self) -> f64 {
        self.reference
    }

    /// Time to expiry in years.
    pub fn expiry(&self) -> f64 {
        self.expiry
    }

    /// At-the-money vol level.
    pub fn atm(&self) -> f64 {
        self.atm
    }

    /// Linear tilt coefficient.
    pub fn skew(&self) -> f64 {
        self.skew
    }

    /// Curvature coefficient.
    pub fn smile(&self) -> f64 {
        self.smile
    }

    /// Put-wing weight.
    pub fn put(&self) -> f64 {
        self.put
    }

    /// Call-wing weight.
    pub fn call(&self) -> f64 {
        self.call
    }

    /// Copy with the five shape fields replaced; control points, reference,
    /// and expiry are kept. Used by calibration to propose iterates.
    fn with_shape(
        &self,
        atm: f64,
        skew: f64,
        smile: f64,
        put: f64,
        call: f64,
    ) -> error::Result<Self> {
        Self::new(
            self.reference,
            self.expiry,
            self.ctrl_p,
            self.ctrl_c,
            atm,
            skew,
            smile,
            put,
            call,
        )
    }

    /// Calibrate the shape fields (atm, skew, smile, put, call) to market
    /// quotes, keeping reference, expiry, and control points fixed.
    ///
    /// Least squares on weighted vol residuals, driven by the configured
    /// solver family. Never returns a low-quality fit silently: a solve
    /// that exhausts its budget surfaces as
    /// [`SmileError::Calibration`].
    pub fn calibrate(
        &self,
        quotes: &QuoteSet,
        weights: &[f64],
        config: &SolverConfig,
    ) -> error::Result<(AsvSmile, SolveReport)> {
        #[cfg(feature = "logging")]
        tracing::debug!(
            reference = self.reference,
            expiry = self.expiry,
            n_quotes = quotes.len(),
            "ASV calibration started"
        );

        let strikes = quotes.strikes();
        let mids = quotes.mids();
        let base = *self;
        let w = weights.to_vec();

        let residuals = move |theta: &[f64]| -> error::Result<Vec<f64>> {
            let trial = base.with_shape(theta[0], theta[1], theta[2], theta[3], theta[4])?;
            let smile = AsvSmile::new(trial);
            strikes
                .iter()
                .zip(mids.iter())
                .zip(w.iter())
                .map(|((&k, &mid), &wi)| smile.vol(k).map(|v| wi * (v.0 - mid)))
                .collect()
        };

        let x0 = [self.atm, self.skew, self.smile, self.put, self.call];
        let bounds = [
            (1e-8, f64::INFINITY),
            (f64::NEG_INFINITY, f64::INFINITY),
            (f64::NEG_INFINITY, f64::INFINITY),
            (f64::NEG_INFINITY, f64::INFINITY),
            (f64::NEG_INFINITY, f64::INFINITY),
        ];
        let outcome = solver::least_squares("ASV", &residuals, &x0, &bounds, config)?;

        let fitted = self
            .with_shape(
                outcome.x[0],
                outcome.x[1],
                outcome.x[2],
                outcome.x[3],
                outcome.x[4],
            )
            .map_err(|e| SmileError::Calibration {
                message: format!("calibrated params invalid: {e}"),
                model: "ASV",
                reason: CalibrationFailure::NumericalFailure,
                iterations: outcome.report.iterations,
                residual: Some(outcome.report.residual),
            })?;

        #[cfg(feature = "logging")]
        tracing::debug!(
            atm = fitted.atm,
            skew = fitted.skew,
            smile = fitted.smile,
            put = fitted.put,
            call = fitted.call,
            iterations = outcome.report.iterations,
            residual = outcome.report.residual,
            "ASV calibration complete"
        );

        Ok((AsvSmile::new(fitted), outcome.report))
    }
}

/// Smooth wing activation s(u) = (1 + tanh u)/2 with its first two
/// derivatives in u.
fn activation(u: f64) -> (f64, f64, f64) {
    let t = u.tanh();
    let s = 0.5 * (1.0 + t);
    let sech2 = 1.0 - t * t;
    (s, 0.5 * sech2, -t * sech2)
}

/// An ASV smile bound to validated parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AsvSmile {
    params: AsvParams,
}

impl AsvSmile {
    /// Wrap validated parameters.
    pub fn new(params: AsvParams) -> Self {
        Self { params }
    }

    /// The parameter record.
    pub fn params(&self) -> &AsvParams {
        &self.params
    }

    /// σ and its first two derivatives with respect to x = ln(K/F).
    fn sigma_x(&self, x: f64) -> (f64, f64, f64) {
        let p = &self.params;
        let x2 = x * x;

        // Put wing: u = -x/ctrl_p, du/dx = -1/ctrl_p.
        let (sp, sp1, sp2) = activation(-x / p.ctrl_p);
        let gp = x2 * sp;
        let gp1 = 2.0 * x * sp - x2 * sp1 / p.ctrl_p;
        let gp2 = 2.0 * sp - 4.0 * x * sp1 / p.ctrl_p + x2 * sp2 / (p.ctrl_p * p.ctrl_p);

        // Call wing: v = x/ctrl_c, dv/dx = 1/ctrl_c.
        let (sc, sc1, sc2) = activation(x / p.ctrl_c);
        let gc = x2 * sc;
        let gc1 = 2.0 * x * sc + x2 * sc1 / p.ctrl_c;
        let gc2 = 2.0 * sc + 4.0 * x * sc1 / p.ctrl_c + x2 * sc2 / (p.ctrl_c * p.ctrl_c);

        let sigma = p.atm + p.skew * x + p.smile * x2 + p.put * gp + p.call * gc;
        let sigma1 = p.skew + 2.0 * p.smile * x + p.put * gp1 + p.call * gc1;
        let sigma2 = 2.0 * p.smile + p.put * gp2 + p.call * gc2;
        (sigma, sigma1, sigma2)
    }

    /// The two wing basis functions at x, used for the parameter partials.
    fn wing_bases(&self, x: f64) -> (f64, f64) {
        let p = &self.params;
        let x2 = x * x;
        let (sp, _, _) = activation(-x / p.ctrl_p);
        let (sc, _, _) = activation(x / p.ctrl_c);
        (x2 * sp, x2 * sc)
    }
}

impl SmileModel for AsvSmile {
    fn forward(&self) -> f64 {
        self.params.reference
    }

    fn expiry(&self) -> f64 {
        self.params.expiry
    }

    fn vol_type(&self) -> VolType {
        VolType::LogNormal
    }

    fn vol(&self, strike: f64) -> error::Result<Vol> {
        validate_positive(strike, "strike")?;
        let x = log_moneyness(strike, self.params.reference);
        let (sigma, _, _) = self.sigma_x(x);
        if sigma <= 0.0 {
            return Err(SmileError::Numerical {
                message: format!("ASV vol is non-positive at strike {strike}: {sigma}"),
            });
        }
        Ok(Vol(sigma))
    }

    /// Fully analytic bundle: strike and reference partials chain-rule
    /// through x = ln(K/F); shape partials are the basis functions.
    fn sensitivities(&self, grid: &StrikeGrid) -> error::Result<SensitivityBundle> {
        let f = self.params.reference;
        let mut bundle = SensitivityBundle::zeroed(Vec::with_capacity(grid.len()));
        for k in grid.iter() {
            validate_positive(k, "strike")?;
            let x = log_moneyness(k, f);
            let (sigma, sigma1, sigma2) = self.sigma_x(x);
            if sigma <= 0.0 {
                return Err(SmileError::Numerical {
                    message: format!("ASV vol is non-positive at strike {k}: {sigma}"),
                });
            }
            let (gp, gc) = self.wing_bases(x);

            bundle.vols.push(sigma);
            bundle.datm.push(1.0);
            bundle.dskew.push(x);
            bundle.dsmile.push(x * x);
            bundle.dput.push(gp);
            bundle.dcall.push(gc);
            // dx/dK = 1/K, d²x/dK² = -1/K².
            bundle.dstrike.push(sigma1 / k);
            bundle.dstrike2.push((sigma2 - sigma1) / (k * k));
            // dx/dF = -1/F, d²x/dF² = 1/F².
            bundle.dref.push(-sigma1 / f);
            bundle.dref2.push((sigma2 + sigma1) / (f * f));
        }
        Ok(bundle)
    }
}
