//! Core domain types for the calibration pipeline.
//!
//! # Newtype Strategy
//!
//! **Scalar outputs use a newtype** — [`Vol`] wraps returned vols so
//! callers can't silently mix them with strikes or variances.
//!
//! **Inputs and array pipelines use bare `f64`** — API methods like
//! `vol(strike: f64)` accept raw floats for ergonomics, and grid-shaped
//! results ([`crate::sensitivity::SensitivityBundle`], curve arrays) stay
//! `Vec<f64>` so they index-align without unwrapping ceremony.
//!
//! # Why no `Eq` or `Ord`?
//! [`Vol`] wraps `f64`, which does not implement `Eq` or `Ord` because
//! `NaN` breaks total ordering. We derive `PartialEq` and `PartialOrd` only.

use serde::{Deserialize, Serialize};

/// Implied volatility at a strike, in the model's quoting convention.
///
/// For lognormal quoting this is the annualized Black volatility; for
/// normal quoting the Bachelier (absolute) volatility.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Vol(pub f64);

/// Quoting convention of a smile model's implied volatilities.
///
/// Determines which pricing primitive ([`crate::pricing`]) converts vols
/// to undiscounted option prices and which density/probability transform
/// applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VolType {
    /// Black (lognormal) volatility. Standard for equity/FX smiles.
    LogNormal,
    /// Bachelier (normal) volatility. Standard for rates smiles.
    Normal,
}
