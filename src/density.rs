//! Risk-neutral density and probability extraction, with independent
//! finite-difference validation.
//!
//! The analytic path converts vols and their strike partials into
//! density/probability through the Breeden–Litzenberger transforms in
//! [`crate::pricing`]. The validator re-derives both curves from bumped
//! prices alone — it exercises only `vol`/`price`, never the analytic
//! sensitivity path, so chain-rule and sign errors in the bundle cannot
//! hide from it.
//!
//! Both curves are always returned together and never merged; bounding
//! their disagreement is the test suite's job, not the extractor's.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SmileError};
use crate::grid::StrikeGrid;
use crate::pricing;
use crate::sensitivity::SensitivityBundle;
use crate::smile::SmileModel;

/// Fixed strike bump for the finite-difference validator.
pub const FD_BUMP: f64 = 1e-6;

/// Density and probability curves, analytic and bumped, index-aligned
/// with the strike grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DensityCurves {
    /// Analytic risk-neutral density.
    pub density: Vec<f64>,
    /// Finite-difference density, independent of the analytic path.
    pub density_bump: Vec<f64>,
    /// Analytic cumulative probability P(F_T ≤ K).
    pub probability: Vec<f64>,
    /// Finite-difference probability, independent of the analytic path.
    pub probability_bump: Vec<f64>,
}

/// Analytic curves from the sensitivity bundle plus the independent
/// bump-and-reprice counterparts.
///
/// A grid point where a transform or a bumped price is undefined yields a
/// NaN at that index only — partial failure never aborts the whole curve.
///
/// # Errors
/// Propagates bundle misalignment and non-domain evaluation failures.
pub fn extract(
    model: &dyn SmileModel,
    grid: &StrikeGrid,
    bundle: &SensitivityBundle,
) -> Result<DensityCurves> {
    bundle.check_alignment(grid.len())?;

    let vol_type = model.vol_type();
    let forward = model.forward();
    let expiry = model.expiry();

    let mut density = Vec::with_capacity(grid.len());
    let mut probability = Vec::with_capacity(grid.len());
    for (i, k) in grid.iter().enumerate() {
        let q = pricing::density(
            vol_type,
            forward,
            k,
            expiry,
            bundle.vols[i],
            bundle.dstrike[i],
            bundle.dstrike2[i],
        );
        let p = pricing::probability(
            vol_type,
            forward,
            k,
            expiry,
            bundle.vols[i],
            bundle.dstrike[i],
        );
        density.push(isolate(q, k)?);
        probability.push(isolate(p, k)?);
    }

    let (density_bump, probability_bump) = fd_validate(model, grid);

    Ok(DensityCurves {
        density,
        density_bump,
        probability,
        probability_bump,
    })
}

/// Map a per-point domain failure to NaN; propagate anything else.
fn isolate(value: Result<f64>, strike: f64) -> Result<f64> {
    match value {
        Ok(v) => Ok(v),
        Err(SmileError::Domain { .. }) => {
            #[cfg(feature = "logging")]
            tracing::warn!(strike, "transform undefined; isolating to NaN");
            let _ = strike;
            Ok(f64::NAN)
        }
        Err(e) => Err(e),
    }
}

/// Independent bump-and-reprice validation.
///
/// For each grid strike k, prices at {k−ε, k, k+ε} with ε = [`FD_BUMP`]
/// give:
///
/// ```text
/// density_bump     = (p(k+ε) + p(k−ε) − 2p(k)) / ε²
/// probability_bump = 1 + (p(k+ε) − p(k−ε)) / (2ε)
/// ```
///
/// Any strike whose bumped price is undefined, non-finite, or negative
/// yields NaN at that index only.
pub fn fd_validate(model: &dyn SmileModel, grid: &StrikeGrid) -> (Vec<f64>, Vec<f64>) {
    let mut density_bump = Vec::with_capacity(grid.len());
    let mut probability_bump = Vec::with_capacity(grid.len());

    for k in grid.iter() {
        let mut prices = [0.0_f64; 3];
        let mut defined = true;
        for (slot, strike) in prices
            .iter_mut()
            .zip([k - FD_BUMP, k, k + FD_BUMP])
        {
            match model.price(strike) {
                Ok(p) if p.is_finite() && p >= 0.0 => *slot = p,
                _ => {
                    defined = false;
                    break;
                }
            }
        }
        if !defined {
            #[cfg(feature = "logging")]
            tracing::warn!(strike = k, "bumped price undefined; isolating to NaN");
            density_bump.push(f64::NAN);
            probability_bump.push(f64::NAN);
            continue;
        }
        let [lo, mid, hi] = prices;
        density_bump.push((hi + lo - 2.0 * mid) / (FD_BUMP * FD_BUMP));
        probability_bump.push(1.0 + (hi - lo) / (2.0 * FD_BUMP));
    }

    (density_bump, probability_bump)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error;
    use crate::smile::{AsvParams, AsvSmile, ZabrClassicalSmile, ZabrParams};
    use crate::types::{Vol, VolType};
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    fn asv_smile() -> AsvSmile {
        AsvSmile::new(
            AsvParams::new(1.0, 0.333, 0.2, 0.2, 0.1929, 0.02268, 0.003, 0.0384, 0.0001).unwrap(),
        )
    }

    fn flat_asv() -> AsvSmile {
        AsvSmile::new(AsvParams::new(1.0, 0.333, 0.2, 0.2, 0.1929, 0.0, 0.0, 0.0, 0.0).unwrap())
    }

    fn zabr_smile() -> ZabrClassicalSmile {
        ZabrClassicalSmile::new(
            ZabrParams::new(10.0, 0.0325, 0.7, 0.0, 0.0873, 0.47, -0.48, 1.0, true).unwrap(),
        )
    }

    fn curves_for(model: &dyn SmileModel, grid: &StrikeGrid) -> DensityCurves {
        let bundle = model.sensitivities(grid).unwrap();
        extract(model, grid, &bundle).unwrap()
    }

    #[test]
    fn analytic_density_matches_bump_for_asv() {
        let smile = asv_smile();
        let grid = StrikeGrid::linspace(0.5, 1.8, 40).unwrap();
        let curves = curves_for(&smile, &grid);
        for i in 0..grid.len() {
            // Relative agreement plus an absolute floor: the ε = 1e-6
            // second difference of O(1) prices carries ~1e-4 of rounding
            // noise, which dominates in the far wings where the true
            // density is vanishing.
            let tol = 1e-3 * curves.density[i].abs() + 1e-3;
            assert!(
                (curves.density[i] - curves.density_bump[i]).abs() <= tol,
                "density mismatch at strike {}: {} vs {}",
                grid.strikes()[i],
                curves.density[i],
                curves.density_bump[i]
            );
        }
    }

    #[test]
    fn analytic_probability_matches_bump_for_asv() {
        let smile = asv_smile();
        let grid = StrikeGrid::linspace(0.5, 1.8, 40).unwrap();
        let curves = curves_for(&smile, &grid);
        for i in 0..grid.len() {
            assert_abs_diff_eq!(
                curves.probability[i],
                curves.probability_bump[i],
                epsilon = 1e-3
            );
        }
    }

    #[test]
    fn analytic_curves_match_bump_for_zabr() {
        let smile = zabr_smile();
        let grid = StrikeGrid::linspace(0.01, 0.1, 25).unwrap();
        let curves = curves_for(&smile, &grid);
        for i in 0..grid.len() {
            assert_relative_eq!(
                curves.density[i],
                curves.density_bump[i],
                max_relative = 1e-3
            );
            assert_abs_diff_eq!(
                curves.probability[i],
                curves.probability_bump[i],
                epsilon = 1e-4
            );
        }
    }

    #[test]
    fn flat_smile_density_integrates_to_one() {
        let smile = flat_asv();
        let grid = StrikeGrid::linspace(0.05, 8.0, 400).unwrap();
        let curves = curves_for(&smile, &grid);
        let strikes = grid.strikes();
        let mut integral = 0.0;
        for i in 1..strikes.len() {
            integral +=
                0.5 * (curves.density[i] + curves.density[i - 1]) * (strikes[i] - strikes[i - 1]);
        }
        assert_abs_diff_eq!(integral, 1.0, epsilon = 1e-3);
    }

    #[test]
    fn flat_smile_probability_is_monotone_from_zero_to_one() {
        let smile = flat_asv();
        let grid = StrikeGrid::linspace(0.05, 8.0, 100).unwrap();
        let curves = curves_for(&smile, &grid);
        assert!(curves.probability[0] < 1e-6);
        assert!(curves.probability[grid.len() - 1] > 1.0 - 1e-6);
        for w in curves.probability.windows(2) {
            assert!(w[1] >= w[0] - 1e-12);
        }
    }

    #[test]
    fn single_point_grid_at_the_forward() {
        let smile = asv_smile();
        let grid = StrikeGrid::new(vec![1.0]).unwrap();
        let curves = curves_for(&smile, &grid);
        assert_eq!(curves.density.len(), 1);
        assert!(curves.density[0].is_finite());
        assert!(curves.probability[0].is_finite());
        assert_relative_eq!(
            curves.density[0],
            curves.density_bump[0],
            max_relative = 1e-3
        );
    }

    /// Test double: well-behaved except at one poisoned strike.
    #[derive(Debug)]
    struct PoisonedModel {
        inner: AsvSmile,
        poisoned: f64,
    }

    impl SmileModel for PoisonedModel {
        fn forward(&self) -> f64 {
            self.inner.forward()
        }
        fn expiry(&self) -> f64 {
            self.inner.expiry()
        }
        fn vol_type(&self) -> VolType {
            self.inner.vol_type()
        }
        fn vol(&self, strike: f64) -> error::Result<Vol> {
            self.inner.vol(strike)
        }
        fn sensitivities(&self, grid: &StrikeGrid) -> error::Result<SensitivityBundle> {
            self.inner.sensitivities(grid)
        }
        fn price(&self, strike: f64) -> error::Result<f64> {
            if (strike - self.poisoned).abs() < 1e-3 {
                return Err(SmileError::Domain {
                    message: "poisoned strike".into(),
                });
            }
            self.inner.price(strike)
        }
    }

    #[test]
    fn failing_price_isolates_to_nan_at_that_index_only() {
        let model = PoisonedModel {
            inner: asv_smile(),
            poisoned: 1.0,
        };
        let grid = StrikeGrid::new(vec![0.8, 0.9, 1.0, 1.1, 1.2]).unwrap();
        let curves = curves_for(&model, &grid);
        for (i, k) in grid.iter().enumerate() {
            if (k - 1.0_f64).abs() < 1e-12 {
                assert!(curves.density_bump[i].is_nan());
                assert!(curves.probability_bump[i].is_nan());
            } else {
                assert!(curves.density_bump[i].is_finite(), "index {i} should survive");
                assert!(curves.probability_bump[i].is_finite());
            }
        }
        // The analytic side is untouched by the poisoned pricing path.
        assert!(curves.density.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn dead_vol_isolates_analytic_curves_to_nan() {
        // A zero vol in the bundle makes the transform undefined at that
        // point; the rest of the curve survives.
        let smile = asv_smile();
        let grid = StrikeGrid::new(vec![0.8, 1.0, 1.2]).unwrap();
        let mut bundle = smile.sensitivities(&grid).unwrap();
        bundle.vols[1] = 0.0;
        let curves = extract(&smile, &grid, &bundle).unwrap();
        assert!(curves.density[0].is_finite());
        assert!(curves.density[1].is_nan());
        assert!(curves.density[2].is_finite());
        assert!(curves.probability[1].is_nan());
    }
}
