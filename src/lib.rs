//! # smilefit
//!
//! Volatility smile calibration, sensitivities, and risk-neutral density
//! extraction for rates and equity smiles.
//!
//! Provides the full pipeline: market quotes → nonlinear least-squares
//! calibration of a smile-model family → analytic sensitivity bundle on a
//! strike grid → density/probability via Breeden–Litzenberger → an
//! independent bump-and-reprice cross-check of the same curves.
//!
//! ## Architecture
//!
//! - **`smile`** — model backends (ASV extended-SVI, ZABR classical and
//!   mixture, SABR PDE) behind the [`SmileModel`] capability set
//! - **`calibrate`** — the orchestrator and least-squares solvers
//! - **`sensitivity`** — the uniform named partial bundle
//! - **`density`** — analytic curves plus the finite-difference validator
//! - **`pipeline`** — the one-call boundary with the
//!   `{status, data, error}` envelope
//!
//! ## Design
//!
//! - **One contract, many backends.** Calibration, sensitivities, and
//!   density extraction depend only on [`SmileModel`]; closed-form and
//!   PDE variants satisfy it identically. PDE variants pin their own
//!   strike mesh; caller grids snap to the nearest node (ties to the
//!   lower index).
//! - **Validate first, solve second.** Quote and parameter validation
//!   happens before any solver iteration; a convergence failure is an
//!   error, never a silently returned last iterate.
//! - **No panics.** Every fallible operation returns [`Result`]. Library
//!   code never calls `unwrap()` or `expect()`.
//! - **Immutable fits.** A [`FittedModel`] is produced once and shared by
//!   all downstream readers; independent requests can run on parallel
//!   workers with no further synchronization.
//! - **Serializable.** Parameter records and the output envelope
//!   implement Serde `Serialize`/`Deserialize`, with validation on
//!   deserialization where invariants exist.

pub mod calibrate;
pub mod conventions;
pub mod density;
pub mod error;
pub mod grid;
pub mod pipeline;
pub mod pricing;
pub mod quotes;
pub mod sample;
pub mod sensitivity;
pub mod smile;
pub mod types;
mod validate;

#[doc(inline)]
pub use calibrate::{FittedModel, SolverConfig, SolverFamily};
#[doc(inline)]
pub use error::{Result, SmileError};
#[doc(inline)]
pub use grid::{GridSpec, StrikeGrid};
#[doc(inline)]
pub use pipeline::{ModelKind, ModelSpec, PipelineReport, PipelineRequest};
#[doc(inline)]
pub use quotes::{MarketQuote, QuoteSet, QuoteWeighting};
#[doc(inline)]
pub use sensitivity::SensitivityBundle;
#[doc(inline)]
pub use smile::SmileModel;
#[doc(inline)]
pub use types::{Vol, VolType};
