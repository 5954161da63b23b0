//! Distribution fitting
//!
//! The fitting engine is an explicit, stateless strategy object handed to
//! the analyzer. There is no process-wide fitter and no ambient output
//! suppression: iteration detail is emitted at `trace` level and a summary
//! at `debug` level.
//!
//! ## Usage
//!
//! ```rust
//! use simchar::fit::{FitStrategy, GaussianLeastSquares};
//! use simchar::histogram::Histogram1D;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let values: Vec<f64> = (0..1000).map(|i| ((i * 37) % 101) as f64 / 10.0).collect();
//! let histogram = Histogram1D::from_values("v_new", "v", 20, &values);
//! let result = GaussianLeastSquares::default().fit(&histogram)?;
//! assert!(result.spread >= 0.0);
//! # Ok(())
//! # }
//! ```

mod gaussian;

pub use gaussian::{gaussian, GaussianLeastSquares};

use crate::histogram::Histogram1D;
use crate::Result;
use serde::{Deserialize, Serialize};

/// Outcome classification of a fit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FitStatus {
    /// Minimizer converged to finite, physical parameters
    Converged,
    /// Iteration limit reached before convergence
    IterationLimit,
    /// Fitted amplitude is negative
    NegativeAmplitude,
    /// Fitted spread collapsed to zero
    ZeroSpread,
    /// A parameter is NaN or infinite
    NonFinite,
    /// Centroid outside the histogram range, or spread far wider than it
    Implausible,
}

impl FitStatus {
    /// Whether the parameters can be trusted without inspection
    #[must_use]
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Converged)
    }

    /// Short human-readable description
    #[must_use]
    pub const fn describe(self) -> &'static str {
        match self {
            Self::Converged => "converged",
            Self::IterationLimit => "did not converge within the iteration limit",
            Self::NegativeAmplitude => "negative amplitude",
            Self::ZeroSpread => "zero spread",
            Self::NonFinite => "non-finite parameters",
            Self::Implausible => "parameters implausible for the histogram range",
        }
    }
}

impl std::fmt::Display for FitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.describe())
    }
}

/// Parameters of a fitted Gaussian `A * exp(-(x-μ)²/(2σ²))`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    /// Peak height `A` (parameter 0)
    pub amplitude: f64,
    /// Mean `μ` (parameter 1)
    pub centroid: f64,
    /// Standard deviation `σ` (parameter 2), reported as `|σ|`
    pub spread: f64,
    /// Sum of squared residuals at the minimum
    pub chi2: f64,
    /// Non-empty bins minus free parameters
    pub ndf: usize,
    /// Minimizer iterations used
    pub iterations: usize,
    /// Quality classification
    pub status: FitStatus,
}

impl FitResult {
    /// Parameters in model order (amplitude, centroid, spread)
    #[must_use]
    pub const fn params(&self) -> [f64; 3] {
        [self.amplitude, self.centroid, self.spread]
    }

    /// Evaluate the fitted model at `x`
    #[must_use]
    pub fn evaluate(&self, x: f64) -> f64 {
        gaussian(x, self.amplitude, self.centroid, self.spread)
    }
}

/// A fitting engine for 1D histograms
pub trait FitStrategy: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Fit the model to a histogram
    ///
    /// Non-convergence is reported through [`FitResult::status`], not as an
    /// error; best-effort parameters are always returned when a fit could be
    /// attempted.
    ///
    /// # Errors
    /// Returns [`crate::Error::Fit`] if the histogram cannot be fitted at all
    /// (for example, no in-range entries)
    fn fit(&self, histogram: &Histogram1D) -> Result<FitResult>;
}
