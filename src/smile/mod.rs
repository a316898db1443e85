//! Smile model backends.
//!
//! A smile represents how implied volatility varies with strike at a fixed
//! expiry. Every backend implements the [`SmileModel`] capability set;
//! calibration, sensitivity extraction, and density derivation depend only
//! on this trait, never on concrete variant identity.
//!
//! ## Variants
//!
//! - [`AsvSmile`] — extended-SVI closed form, lognormal quoting
//! - [`ZabrClassicalSmile`] — ZABR short-maturity expansion, normal quoting
//! - [`ZabrMixtureSmile`] — displaced two-beta ZABR blend, normal quoting
//! - [`SabrPdeSmile`] — SABR terminal-density PDE, normal quoting, pinned grid

pub mod asv;
pub mod sabr_pde;
pub mod zabr;

pub use asv::{AsvParams, AsvSmile};
pub use sabr_pde::{SabrPdeParams, SabrPdeSmile};
pub use zabr::{MixtureParams, ZabrClassicalSmile, ZabrMixtureSmile, ZabrParams};

use std::fmt;

use crate::error::{self, Result};
use crate::grid::StrikeGrid;
use crate::pricing;
use crate::sensitivity::SensitivityBundle;
use crate::types::{Vol, VolType};

/// A calibrated (or directly parameterized) single-expiry smile.
///
/// # Thread Safety
/// All implementations must be `Send + Sync`; fitted models are shared
/// across readers behind `Arc` without further synchronization.
///
/// # Error Handling
/// Methods return `Result` so implementations can report numerical
/// failures rather than panicking.
pub trait SmileModel: Send + Sync + fmt::Debug {
    /// Forward (reference) level of the underlying at expiry.
    fn forward(&self) -> f64;

    /// Time to expiry in years.
    fn expiry(&self) -> f64;

    /// Quoting convention of the vols this model produces.
    fn vol_type(&self) -> VolType;

    /// Implied volatility at the given strike.
    fn vol(&self, strike: f64) -> error::Result<Vol>;

    /// Implied vols across a grid. Deterministic and idempotent: repeated
    /// calls with the same grid are bit-identical.
    fn evaluate(&self, grid: &StrikeGrid) -> Result<Vec<f64>> {
        grid.iter().map(|k| self.vol(k).map(|v| v.0)).collect()
    }

    /// The uniform sensitivity bundle on the grid. The bundle's `vols`
    /// must equal [`evaluate`](Self::evaluate) exactly for the same grid.
    fn sensitivities(&self, grid: &StrikeGrid) -> Result<SensitivityBundle>;

    /// Undiscounted call price at the strike, in the model's quoting
    /// convention. Used only by the finite-difference validator and the
    /// probability/density transforms.
    fn price(&self, strike: f64) -> Result<f64> {
        let vol = self.vol(strike)?;
        Ok(pricing::call_price(
            self.vol_type(),
            self.forward(),
            strike,
            self.expiry(),
            vol.0,
        ))
    }

    /// The backend-pinned strike mesh, if this variant fixes its own.
    fn pinned_grid(&self) -> Option<&StrikeGrid> {
        None
    }
}

/// Central-difference strike partials of a model's own vol function.
///
/// Used by variants whose closed form has no tractable analytic strike
/// derivative. The step scales with the larger of strike and forward so
/// rates-sized and equity-sized grids both stay well conditioned.
pub(crate) fn strike_partials_by_difference(
    model: &dyn SmileModel,
    grid: &StrikeGrid,
    vols: &[f64],
) -> Result<(Vec<f64>, Vec<f64>)> {
    let mut dstrike = Vec::with_capacity(grid.len());
    let mut dstrike2 = Vec::with_capacity(grid.len());
    for (i, k) in grid.iter().enumerate() {
        let h = 1e-4 * k.abs().max(model.forward().abs()).max(1e-3);
        let up = model.vol(k + h)?.0;
        let dn = model.vol(k - h)?.0;
        dstrike.push((up - dn) / (2.0 * h));
        dstrike2.push((up - 2.0 * vols[i] + dn) / (h * h));
    }
    Ok((dstrike, dstrike2))
}
