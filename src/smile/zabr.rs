//! ZABR smile models (normal quoting).
//!
//! ZABR generalizes SABR with a CEV exponent γ on the vol-of-vol process:
//!
//! ```text
//! dF = z·(F + shift)^β dW      dz = ν·z^γ dV      dW·dV = ρ dt
//! ```
//!
//! The normal implied vol comes from Hagan's expansion applied to the
//! shifted forward/strike, with the γ exponent folded in through the
//! effective vol-of-vol ν_eff = ν·α^(γ−1) (γ = 1 recovers SABR exactly).
//! The `vol_adjustment` flag gates the O(T) correction factor.
//!
//! Two variants live here: the classical single-backbone model and the
//! mixture model, which blends two displaced backbones with CEV exponents
//! β₁/β₂ across a strike band so very low (and negative) strikes can carry
//! their own regime.
//!
//! # References
//! - Hagan, P. et al. "Managing Smile Risk" (2002)
//! - Andreasen, J. & Huge, B. "ZABR — Expansions for the Masses" (2011)

use serde::{Deserialize, Serialize};

use crate::calibrate::solver::{self, SolveReport, SolverConfig};
use crate::error::{self, SmileError};
use crate::grid::StrikeGrid;
use crate::quotes::QuoteSet;
use crate::sensitivity::SensitivityBundle;
use crate::smile::{strike_partials_by_difference, SmileModel};
use crate::types::{Vol, VolType};
use crate::validate::{
    validate_correlation, validate_finite, validate_non_negative, validate_positive,
};

/// Hagan normal (Bachelier) vol for a shifted SABR backbone.
///
/// `f` and `k` are already shifted and positive.
fn hagan_normal_vol(
    f: f64,
    k: f64,
    expiry: f64,
    alpha: f64,
    beta: f64,
    rho: f64,
    nu: f64,
    with_adjustment: bool,
) -> f64 {
    let log_fk = (f / k).ln();
    let fk = f * k;
    let fk_beta_mid = fk.powf(beta / 2.0);

    let zeta = (nu / alpha) * (f - k) / fk_beta_mid;
    let zeta_over_x = if zeta.abs() < 1e-8 {
        1.0
    } else {
        let x_hat = (((1.0 - 2.0 * rho * zeta + zeta * zeta).sqrt() + zeta - rho) / (1.0 - rho)).ln();
        zeta / x_hat
    };

    let l2 = log_fk * log_fk;
    let l4 = l2 * l2;
    let omb = 1.0 - beta;
    let numer = 1.0 + l2 / 24.0 + l4 / 1920.0;
    let denom = 1.0 + omb * omb * l2 / 24.0 + omb.powi(4) * l4 / 1920.0;

    let adjustment = if with_adjustment {
        let term1 = -beta * (2.0 - beta) * alpha * alpha / (24.0 * fk.powf(omb));
        let term2 = rho * alpha * nu * beta / (4.0 * fk.powf(omb / 2.0));
        let term3 = (2.0 - 3.0 * rho * rho) * nu * nu / 24.0;
        1.0 + (term1 + term2 + term3) * expiry
    } else {
        1.0
    };

    alpha * fk_beta_mid * (numer / denom) * zeta_over_x * adjustment
}

/// Floor for a shifted strike so the expansion stays defined at and below
/// the zero bound.
fn clamp_shifted(k_shifted: f64, f_shifted: f64) -> f64 {
    k_shifted.max(1e-6 * f_shifted)
}

// ---------------------------------------------------------------------------
// Classical
// ---------------------------------------------------------------------------

/// ZABR classical parameters. Immutable value, validated at construction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZabrParams {
    expiry: f64,
    forward: f64,
    /// Backbone CEV exponent β ∈ \[0, 1\].
    beta: f64,
    /// Displacement of the backbone, shift ≥ 0.
    shift: f64,
    /// Initial vol level α > 0.
    alpha: f64,
    /// Vol-of-vol ν ≥ 0.
    nu: f64,
    /// Spot-vol correlation ρ ∈ (−1, 1).
    rho: f64,
    /// Vol-of-vol CEV exponent γ ≥ 0.
    gamma: f64,
    /// Apply the O(T) vol adjustment factor.
    vol_adjustment: bool,
}

impl ZabrParams {
    /// Create validated ZABR classical parameters.
    ///
    /// # Errors
    /// [`SmileError::InvalidInput`] when a field is outside its admissible
    /// range (β ∈ \[0,1\], ρ ∈ (−1,1), ν ≥ 0, α > 0, expiry > 0,
    /// forward + shift > 0).
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        expiry: f64,
        forward: f64,
        beta: f64,
        shift: f64,
        alpha: f64,
        nu: f64,
        rho: f64,
        gamma: f64,
        vol_adjustment: bool,
    ) -> error::Result<Self> {
        validate_positive(expiry, "expiry")?;
        validate_finite(forward, "forward")?;
        validate_non_negative(shift, "shift")?;
        if !(0.0..=1.0).contains(&beta) || beta.is_nan() {
            return Err(SmileError::InvalidInput {
                message: format!("beta must be in [0, 1], got {beta}"),
            });
        }
        validate_positive(alpha, "alpha")?;
        validate_non_negative(nu, "nu")?;
        validate_correlation(rho, "rho")?;
        validate_non_negative(gamma, "gamma")?;
        if forward + shift <= 0.0 {
            return Err(SmileError::InvalidInput {
                message: format!(
                    "shifted forward must be positive, got forward {forward} with shift {shift}"
                ),
            });
        }
        Ok(Self {
            expiry,
            forward,
            beta,
            shift,
            alpha,
            nu,
            rho,
            gamma,
            vol_adjustment,
        })
    }

    /// Initial vol level α.
    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Vol-of-vol ν.
    pub fn nu(&self) -> f64 {
        self.nu
    }

    /// Spot-vol correlation ρ.
    pub fn rho(&self) -> f64 {
        self.rho
    }

    /// Backbone CEV exponent β.
    pub fn beta(&self) -> f64 {
        self.beta
    }

    /// Vol-of-vol CEV exponent γ.
    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    fn with_free(&self, alpha: f64, nu: f64, rho: f64) -> error::Result<Self> {
        Self::new(
            self.expiry,
            self.forward,
            self.beta,
            self.shift,
            alpha,
            nu,
            rho,
            self.gamma,
            self.vol_adjustment,
        )
    }

    /// Calibrate (α, ν, ρ) to market quotes; β, γ, and shift stay pinned.
    pub fn calibrate(
        &self,
        quotes: &QuoteSet,
        weights: &[f64],
        config: &SolverConfig,
    ) -> error::Result<(ZabrClassicalSmile, SolveReport)> {
        #[cfg(feature = "logging")]
        tracing::debug!(
            forward = self.forward,
            expiry = self.expiry,
            n_quotes = quotes.len(),
            "ZABR classical calibration started"
        );

        let strikes = quotes.strikes();
        let mids = quotes.mids();
        let base = *self;
        let w = weights.to_vec();

        let residuals = move |theta: &[f64]| -> error::Result<Vec<f64>> {
            let trial = ZabrClassicalSmile::new(base.with_free(theta[0], theta[1], theta[2])?);
            strikes
                .iter()
                .zip(mids.iter())
                .zip(w.iter())
                .map(|((&k, &mid), &wi)| trial.vol(k).map(|v| wi * (v.0 - mid)))
                .collect()
        };

        let x0 = [self.alpha, self.nu, self.rho];
        let bounds = [(1e-10, f64::INFINITY), (0.0, f64::INFINITY), (-0.999, 0.999)];
        let outcome = solver::least_squares("ZABR_CLASSICAL", &residuals, &x0, &bounds, config)?;

        let fitted = self.with_free(outcome.x[0], outcome.x[1], outcome.x[2])?;

        #[cfg(feature = "logging")]
        tracing::debug!(
            alpha = fitted.alpha,
            nu = fitted.nu,
            rho = fitted.rho,
            iterations = outcome.report.iterations,
            residual = outcome.report.residual,
            "ZABR classical calibration complete"
        );

        Ok((ZabrClassicalSmile::new(fitted), outcome.report))
    }
}

/// A ZABR classical smile bound to validated parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZabrClassicalSmile {
    params: ZabrParams,
}

impl ZabrClassicalSmile {
    /// Wrap validated parameters.
    pub fn new(params: ZabrParams) -> Self {
        Self { params }
    }

    /// The parameter record.
    pub fn params(&self) -> &ZabrParams {
        &self.params
    }
}

impl SmileModel for ZabrClassicalSmile {
    fn forward(&self) -> f64 {
        self.params.forward
    }

    fn expiry(&self) -> f64 {
        self.params.expiry
    }

    fn vol_type(&self) -> VolType {
        VolType::Normal
    }

    fn vol(&self, strike: f64) -> error::Result<Vol> {
        validate_finite(strike, "strike")?;
        let p = &self.params;
        let fs = p.forward + p.shift;
        let ks = clamp_shifted(strike + p.shift, fs);
        let nu_eff = p.nu * p.alpha.powf(p.gamma - 1.0);
        let vol = hagan_normal_vol(
            fs,
            ks,
            p.expiry,
            p.alpha,
            p.beta,
            p.rho,
            nu_eff,
            p.vol_adjustment,
        );
        if !vol.is_finite() || vol <= 0.0 {
            return Err(SmileError::Numerical {
                message: format!("ZABR vol is undefined at strike {strike}: {vol}"),
            });
        }
        Ok(Vol(vol))
    }

    /// Shape partials (atm/skew/smile/put/call) are structural zeros: this
    /// family has no such parameters. Strike and reference partials come
    /// from central differences of the model's own closed form.
    fn sensitivities(&self, grid: &StrikeGrid) -> error::Result<SensitivityBundle> {
        let vols = self.evaluate(grid)?;
        let (dstrike, dstrike2) = strike_partials_by_difference(self, grid, &vols)?;
        let (dref, dref2) = forward_partials(self.params, grid, &vols)?;
        let mut bundle = SensitivityBundle::zeroed(vols);
        bundle.dstrike = dstrike;
        bundle.dstrike2 = dstrike2;
        bundle.dref = dref;
        bundle.dref2 = dref2;
        Ok(bundle)
    }
}

/// Central-difference forward partials for the classical model.
fn forward_partials(
    params: ZabrParams,
    grid: &StrikeGrid,
    vols: &[f64],
) -> error::Result<(Vec<f64>, Vec<f64>)> {
    let h = 1e-4 * (params.forward + params.shift).abs().max(1e-3);
    let bump = |forward: f64| -> error::Result<Vec<f64>> {
        let p = ZabrParams::new(
            params.expiry,
            forward,
            params.beta,
            params.shift,
            params.alpha,
            params.nu,
            params.rho,
            params.gamma,
            params.vol_adjustment,
        )?;
        ZabrClassicalSmile::new(p).evaluate(grid)
    };
    let up = bump(params.forward + h)?;
    let dn = bump(params.forward - h)?;
    let dref = up
        .iter()
        .zip(dn.iter())
        .map(|(u, d)| (u - d) / (2.0 * h))
        .collect();
    let dref2 = up
        .iter()
        .zip(vols.iter())
        .zip(dn.iter())
        .map(|((u, v), d)| (u - 2.0 * v + d) / (h * h))
        .collect();
    Ok((dref, dref2))
}

// ---------------------------------------------------------------------------
// Mixture
// ---------------------------------------------------------------------------

/// ZABR mixture parameters: two displaced backbones blended across a
/// strike band. Immutable value, validated at construction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MixtureParams {
    expiry: f64,
    forward: f64,
    /// Initial vol level α > 0.
    alpha: f64,
    /// Low-strike backbone exponent β₁ ≥ 0.
    beta1: f64,
    /// High-strike backbone exponent β₂ ≥ 0 (may exceed one).
    beta2: f64,
    /// Displacement applied to both backbones; forward + d must be
    /// positive so negative strikes remain admissible.
    d: f64,
    /// Floor on the blended vol.
    vol_low: f64,
    /// Vol-of-vol ν ≥ 0.
    nu: f64,
    /// Spot-vol correlation ρ ∈ (−1, 1).
    rho: f64,
    /// Vol-of-vol CEV exponent γ ≥ 0.
    gamma: f64,
    /// Apply the O(T) vol adjustment factor.
    vol_adjustment: bool,
    /// Upper edge of the blend band.
    high_strike: f64,
    /// Lower edge of the blend band.
    low_strike: f64,
    /// Below this strike the low-beta backbone applies alone.
    forward_cut_off: f64,
    /// Width of the logistic blend.
    smoothing_factor: f64,
}

impl MixtureParams {
    /// Create validated mixture parameters.
    ///
    /// The effective upper edge of the blend band is
    /// `max(high_strike, low_strike + smoothing_factor)`, so a degenerate
    /// band is widened rather than rejected.
    ///
    /// # Errors
    /// [`SmileError::InvalidInput`] for out-of-range fields.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        expiry: f64,
        forward: f64,
        alpha: f64,
        beta1: f64,
        beta2: f64,
        d: f64,
        vol_low: f64,
        nu: f64,
        rho: f64,
        gamma: f64,
        vol_adjustment: bool,
        high_strike: f64,
        low_strike: f64,
        forward_cut_off: f64,
        smoothing_factor: f64,
    ) -> error::Result<Self> {
        validate_positive(expiry, "expiry")?;
        validate_finite(forward, "forward")?;
        validate_positive(alpha, "alpha")?;
        validate_non_negative(beta1, "beta1")?;
        validate_non_negative(beta2, "beta2")?;
        validate_finite(d, "displacement")?;
        validate_non_negative(vol_low, "vol_low")?;
        validate_non_negative(nu, "nu")?;
        validate_correlation(rho, "rho")?;
        validate_non_negative(gamma, "gamma")?;
        validate_finite(high_strike, "high_strike")?;
        validate_finite(low_strike, "low_strike")?;
        validate_finite(forward_cut_off, "forward_cut_off")?;
        validate_positive(smoothing_factor, "smoothing_factor")?;
        if forward + d <= 0.0 {
            return Err(SmileError::InvalidInput {
                message: format!(
                    "displaced forward must be positive, got forward {forward} with displacement {d}"
                ),
            });
        }
        Ok(Self {
            expiry,
            forward,
            alpha,
            beta1,
            beta2,
            d,
            vol_low,
            nu,
            rho,
            gamma,
            vol_adjustment,
            high_strike,
            low_strike,
            forward_cut_off,
            smoothing_factor,
        })
    }

    /// Initial vol level α.
    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Vol-of-vol ν.
    pub fn nu(&self) -> f64 {
        self.nu
    }

    /// Spot-vol correlation ρ.
    pub fn rho(&self) -> f64 {
        self.rho
    }

    fn with_free(&self, alpha: f64, nu: f64, rho: f64) -> error::Result<Self> {
        let mut p = *self;
        validate_positive(alpha, "alpha")?;
        validate_non_negative(nu, "nu")?;
        validate_correlation(rho, "rho")?;
        p.alpha = alpha;
        p.nu = nu;
        p.rho = rho;
        Ok(p)
    }

    /// Calibrate (α, ν, ρ) to market quotes; the remaining fields stay
    /// pinned.
    pub fn calibrate(
        &self,
        quotes: &QuoteSet,
        weights: &[f64],
        config: &SolverConfig,
    ) -> error::Result<(ZabrMixtureSmile, SolveReport)> {
        #[cfg(feature = "logging")]
        tracing::debug!(
            forward = self.forward,
            expiry = self.expiry,
            n_quotes = quotes.len(),
            "ZABR mixture calibration started"
        );

        let strikes = quotes.strikes();
        let mids = quotes.mids();
        let base = *self;
        let w = weights.to_vec();

        let residuals = move |theta: &[f64]| -> error::Result<Vec<f64>> {
            let trial = ZabrMixtureSmile::new(base.with_free(theta[0], theta[1], theta[2])?);
            strikes
                .iter()
                .zip(mids.iter())
                .zip(w.iter())
                .map(|((&k, &mid), &wi)| trial.vol(k).map(|v| wi * (v.0 - mid)))
                .collect()
        };

        let x0 = [self.alpha, self.nu, self.rho];
        let bounds = [(1e-10, f64::INFINITY), (0.0, f64::INFINITY), (-0.999, 0.999)];
        let outcome = solver::least_squares("ZABR_MIXTURE", &residuals, &x0, &bounds, config)?;

        let fitted = self.with_free(outcome.x[0], outcome.x[1], outcome.x[2])?;
        Ok((ZabrMixtureSmile::new(fitted), outcome.report))
    }
}

/// A ZABR mixture smile bound to validated parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZabrMixtureSmile {
    params: MixtureParams,
}

impl ZabrMixtureSmile {
    /// Wrap validated parameters.
    pub fn new(params: MixtureParams) -> Self {
        Self { params }
    }

    /// The parameter record.
    pub fn params(&self) -> &MixtureParams {
        &self.params
    }

    /// Blend weight of the high-beta backbone at a strike.
    fn blend_weight(&self, strike: f64) -> f64 {
        let p = &self.params;
        if strike <= p.forward_cut_off {
            return 0.0;
        }
        let high_eff = p.high_strike.max(p.low_strike + p.smoothing_factor);
        let mid = 0.5 * (p.low_strike + high_eff);
        0.5 * (1.0 + ((strike - mid) / p.smoothing_factor).tanh())
    }
}

impl SmileModel for ZabrMixtureSmile {
    fn forward(&self) -> f64 {
        self.params.forward
    }

    fn expiry(&self) -> f64 {
        self.params.expiry
    }

    fn vol_type(&self) -> VolType {
        VolType::Normal
    }

    fn vol(&self, strike: f64) -> error::Result<Vol> {
        validate_finite(strike, "strike")?;
        let p = &self.params;
        let fs = p.forward + p.d;
        let ks = clamp_shifted(strike + p.d, fs);
        let nu_eff = p.nu * p.alpha.powf(p.gamma - 1.0);

        let low = hagan_normal_vol(fs, ks, p.expiry, p.alpha, p.beta1, p.rho, nu_eff, p.vol_adjustment);
        let high = hagan_normal_vol(fs, ks, p.expiry, p.alpha, p.beta2, p.rho, nu_eff, p.vol_adjustment);
        let w = self.blend_weight(strike);
        let vol = ((1.0 - w) * low + w * high).max(p.vol_low);
        if !vol.is_finite() || vol <= 0.0 {
            return Err(SmileError::Numerical {
                message: format!("mixture vol is undefined at strike {strike}: {vol}"),
            });
        }
        Ok(Vol(vol))
    }

    fn sensitivities(&self, grid: &StrikeGrid) -> error::Result<SensitivityBundle> {
        let vols = self.evaluate(grid)?;
        let (dstrike, dstrike2) = strike_partials_by_difference(self, grid, &vols)?;
        let (dref, dref2) = mixture_forward_partials(self.params, grid, &vols)?;
        let mut bundle = SensitivityBundle::zeroed(vols);
        bundle.dstrike = dstrike;
        bundle.dstrike2 = dstrike2;
        bundle.dref = dref;
        bundle.dref2 = dref2;
        Ok(bundle)
    }
}

/// Central-difference forward partials for the mixture model.
fn mixture_forward_partials(
    params: MixtureParams,
    grid: &StrikeGrid,
    vols: &[f64],
) -> error::Result<(Vec<f64>, Vec<f64>)> {
    let h = 1e-4 * (params.forward + params.d).abs().max(1e-3);
    let bump = |forward: f64| -> error::Result<Vec<f64>> {
        let mut p = params;
        p.forward = forward;
        validate_finite(forward, "forward")?;
        ZabrMixtureSmile::new(p).evaluate(grid)
    };
    let up = bump(params.forward + h)?;
    let dn = bump(params.forward - h)?;
    let dref = up
        .iter()
        .zip(dn.iter())
        .map(|(u, d)| (u - d) / (2.0 * h))
        .collect();
    let dref2 = up
        .iter()
        .zip(vols.iter())
        .zip(dn.iter())
        .map(|((u, v), d)| (u - 2.0 * v + d) / (h * h))
        .collect();
    Ok((dref, dref2))
}
