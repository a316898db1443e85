//! Strike grids and the pinned-mesh snapping policy.
//!
//! Closed-form models evaluate on any caller grid; PDE-class models pin
//! their own mesh. Reconciling a caller grid against a pinned mesh snaps
//! each requested strike to the nearest mesh point, with exact ties
//! resolved to the lower index. That rule is deterministic and uniform —
//! it is a policy of this crate, not backend-specific behavior.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SmileError};
use crate::validate::validate_finite;

/// An ordered, ascending sequence of strikes, size ≥ 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct StrikeGrid {
    strikes: Vec<f64>,
}

impl TryFrom<Vec<f64>> for StrikeGrid {
    type Error = SmileError;
    fn try_from(strikes: Vec<f64>) -> Result<Self> {
        Self::new(strikes)
    }
}

impl From<StrikeGrid> for Vec<f64> {
    fn from(grid: StrikeGrid) -> Self {
        grid.strikes
    }
}

impl StrikeGrid {
    /// Build a grid from explicit strikes.
    ///
    /// # Errors
    /// [`SmileError::InvalidInput`] if the sequence is empty, contains a
    /// non-finite value, or is not strictly increasing.
    pub fn new(strikes: Vec<f64>) -> Result<Self> {
        if strikes.is_empty() {
            return Err(SmileError::InvalidInput {
                message: "strike grid must contain at least one strike".into(),
            });
        }
        for &k in &strikes {
            validate_finite(k, "grid strike")?;
        }
        for pair in strikes.windows(2) {
            if pair[1] <= pair[0] {
                return Err(SmileError::InvalidInput {
                    message: format!(
                        "grid strikes must be strictly increasing, got {} after {}",
                        pair[1], pair[0]
                    ),
                });
            }
        }
        Ok(Self { strikes })
    }

    /// Uniform grid of `count` strikes over `[start, stop]` inclusive.
    ///
    /// `count == 1` yields the single strike `start`.
    ///
    /// # Errors
    /// [`SmileError::InvalidInput`] if `count` is zero, a bound is
    /// non-finite, or `stop <= start` when `count > 1`.
    pub fn linspace(start: f64, stop: f64, count: usize) -> Result<Self> {
        validate_finite(start, "grid start")?;
        validate_finite(stop, "grid stop")?;
        if count == 0 {
            return Err(SmileError::InvalidInput {
                message: "grid count must be at least 1".into(),
            });
        }
        if count == 1 {
            return Self::new(vec![start]);
        }
        if stop <= start {
            return Err(SmileError::InvalidInput {
                message: format!("grid stop {stop} must exceed start {start}"),
            });
        }
        let step = (stop - start) / (count - 1) as f64;
        let strikes = (0..count).map(|i| start + step * i as f64).collect();
        Self::new(strikes)
    }

    /// Number of strikes.
    pub fn len(&self) -> usize {
        self.strikes.len()
    }

    /// Always false for a constructed grid.
    pub fn is_empty(&self) -> bool {
        self.strikes.is_empty()
    }

    /// The strikes, ascending.
    pub fn strikes(&self) -> &[f64] {
        &self.strikes
    }

    /// Iterate over the strikes.
    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.strikes.iter().copied()
    }

    /// Index of the mesh point nearest to `strike`; exact distance ties
    /// pick the lower index.
    pub fn nearest_index(&self, strike: f64) -> usize {
        let mut best = 0usize;
        let mut best_dist = (self.strikes[0] - strike).abs();
        for (i, &k) in self.strikes.iter().enumerate().skip(1) {
            let dist = (k - strike).abs();
            // Strict inequality keeps the lower index on exact ties.
            if dist < best_dist {
                best = i;
                best_dist = dist;
            }
        }
        best
    }

    /// Snap every strike of `requested` onto this mesh.
    ///
    /// The result may contain repeated mesh points if two requested
    /// strikes snap to the same node; it is returned as raw strikes, not a
    /// `StrikeGrid`, because strict monotonicity is no longer guaranteed.
    pub fn snap(&self, requested: &[f64]) -> Vec<f64> {
        requested
            .iter()
            .map(|&k| self.strikes[self.nearest_index(k)])
            .collect()
    }
}

/// Caller-facing grid request, resolved against the fitted model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GridSpec {
    /// Uniform grid over `[start, stop]` with `count` points.
    Range { start: f64, stop: f64, count: usize },
    /// Explicit strikes, validated on resolution.
    Explicit(Vec<f64>),
    /// Use the backend-pinned mesh; an error for closed-form backends.
    BackendPinned,
}

impl GridSpec {
    /// Resolve this request against an optional backend-pinned mesh.
    ///
    /// With a pinned mesh, `Range`/`Explicit` requests are built and then
    /// snapped node-by-node (deduplicated, order preserved);
    /// `BackendPinned` returns the mesh itself. Without one,
    /// `BackendPinned` is an [`SmileError::InvalidInput`].
    pub fn resolve(&self, pinned: Option<&StrikeGrid>) -> Result<StrikeGrid> {
        let requested = match self {
            GridSpec::Range { start, stop, count } => StrikeGrid::linspace(*start, *stop, *count)?,
            GridSpec::Explicit(strikes) => StrikeGrid::new(strikes.clone())?,
            GridSpec::BackendPinned => {
                return match pinned {
                    Some(mesh) => Ok(mesh.clone()),
                    None => Err(SmileError::InvalidInput {
                        message: "this model variant does not pin a strike grid; supply one".into(),
                    }),
                };
            }
        };
        match pinned {
            None => Ok(requested),
            Some(mesh) => {
                let mut snapped = mesh.snap(requested.strikes());
                snapped.dedup();
                StrikeGrid::new(snapped)
            }
        }
    }
}
