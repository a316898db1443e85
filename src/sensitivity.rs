//! The uniform sensitivity bundle every model variant produces.
//!
//! Downstream consumers (density extraction, risk reports) read one fixed
//! named set of partials regardless of backend, so they never special-case
//! variant identity. A variant that lacks a parameter reports a structural
//! zero for it — an explicit array of zeros, not an omission.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SmileError};
use crate::grid::{GridSpec, StrikeGrid};
use crate::smile::SmileModel;

/// Implied vols plus the fixed named partial set, each index-aligned with
/// the strike grid that produced them.
///
/// Invariant: `vols` equals `evaluate(grid)` exactly for the same grid —
/// the bundle is built by calling the same evaluation path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensitivityBundle {
    /// Implied vols in the model's quoting convention.
    pub vols: Vec<f64>,
    /// ∂σ/∂reference (spot/forward sensitivity).
    pub dref: Vec<f64>,
    /// ∂σ/∂atm.
    pub datm: Vec<f64>,
    /// ∂σ/∂skew.
    pub dskew: Vec<f64>,
    /// ∂σ/∂smile.
    pub dsmile: Vec<f64>,
    /// ∂σ/∂put-wing.
    pub dput: Vec<f64>,
    /// ∂σ/∂call-wing.
    pub dcall: Vec<f64>,
    /// ∂σ/∂K.
    pub dstrike: Vec<f64>,
    /// ∂²σ/∂K².
    pub dstrike2: Vec<f64>,
    /// ∂²σ/∂reference².
    pub dref2: Vec<f64>,
}

impl SensitivityBundle {
    /// Bundle with the given vols and structural zeros for every partial.
    pub fn zeroed(vols: Vec<f64>) -> Self {
        let n = vols.len();
        Self {
            vols,
            dref: vec![0.0; n],
            datm: vec![0.0; n],
            dskew: vec![0.0; n],
            dsmile: vec![0.0; n],
            dput: vec![0.0; n],
            dcall: vec![0.0; n],
            dstrike: vec![0.0; n],
            dstrike2: vec![0.0; n],
            dref2: vec![0.0; n],
        }
    }

    /// Grid size the bundle is aligned with.
    pub fn len(&self) -> usize {
        self.vols.len()
    }

    /// Whether the bundle is empty.
    pub fn is_empty(&self) -> bool {
        self.vols.is_empty()
    }

    /// Check that every array has the expected length.
    ///
    /// # Errors
    /// [`SmileError::Numerical`] on any misalignment; a misaligned bundle
    /// is a backend bug, not a user input problem.
    pub fn check_alignment(&self, expected: usize) -> Result<()> {
        let lens = [
            self.vols.len(),
            self.dref.len(),
            self.datm.len(),
            self.dskew.len(),
            self.dsmile.len(),
            self.dput.len(),
            self.dcall.len(),
            self.dstrike.len(),
            self.dstrike2.len(),
            self.dref2.len(),
        ];
        if lens.iter().any(|&l| l != expected) {
            return Err(SmileError::Numerical {
                message: format!(
                    "sensitivity bundle misaligned: expected {expected} entries, got {lens:?}"
                ),
            });
        }
        Ok(())
    }
}

/// Resolve the caller's grid request against the model, then compute the
/// bundle on the resolved grid.
///
/// This is the single entry the pipeline uses: grid reconciliation
/// (including pinned-mesh snapping) happens here, so backends only ever
/// see grids they can evaluate.
pub fn compute(
    model: &dyn SmileModel,
    spec: &GridSpec,
) -> Result<(StrikeGrid, SensitivityBundle)> {
    let grid = spec.resolve(model.pinned_grid())?;
    let bundle = model.sensitivities(&grid)?;
    bundle.check_alignment(grid.len())?;
    Ok((grid, bundle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zeroed_bundle_is_aligned() {
        let b = SensitivityBundle::zeroed(vec![0.1, 0.2, 0.3]);
        assert_eq!(b.len(), 3);
        assert!(b.check_alignment(3).is_ok());
        assert!(b.dskew.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn misaligned_bundle_detected() {
        let mut b = SensitivityBundle::zeroed(vec![0.1, 0.2]);
        b.dput.pop();
        assert!(matches!(
            b.check_alignment(2),
            Err(SmileError::Numerical { .. })
        ));
    }
}
