//! Gaussian least-squares fit (Levenberg–Marquardt)
//!
//! Minimizes `Σ (n_i - f(x_i))²` over all bins, `f` evaluated at bin
//! centers. Seeds come from the histogram itself: peak content, mean and
//! standard deviation. Only steps that lower the residual and keep every
//! parameter finite are accepted, so the returned parameters are always
//! finite.

use super::{FitResult, FitStatus, FitStrategy};
use crate::histogram::{Axis, Histogram1D};
use crate::{Error, Result};
use nalgebra::{Matrix3, Vector3};

const LAMBDA_START: f64 = 1e-3;
const LAMBDA_MIN: f64 = 1e-12;
const LAMBDA_MAX: f64 = 1e16;

/// Widest plausible spread, in units of the histogram range
const MAX_SPREAD_PER_RANGE: f64 = 10.0;

/// Gaussian `a * exp(-(x-mu)²/(2 sigma²))`
#[must_use]
pub fn gaussian(x: f64, a: f64, mu: f64, sigma: f64) -> f64 {
    let d = (x - mu) / sigma;
    a * (-0.5 * d * d).exp()
}

/// Levenberg–Marquardt least-squares estimator for a 3-parameter Gaussian
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussianLeastSquares {
    max_iterations: usize,
    tolerance: f64,
}

impl Default for GaussianLeastSquares {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            tolerance: 1e-10,
        }
    }
}

impl GaussianLeastSquares {
    /// Create an estimator with explicit limits
    #[must_use]
    pub const fn new(max_iterations: usize, tolerance: f64) -> Self {
        Self {
            max_iterations,
            tolerance,
        }
    }

    /// Iteration limit
    #[must_use]
    pub const fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// Seed parameters from histogram moments
    fn seed(histogram: &Histogram1D) -> Vector3<f64> {
        let mut sigma = histogram.std_dev();
        if !(sigma.is_finite() && sigma > 0.0) {
            sigma = histogram.axis().width();
        }
        Vector3::new(histogram.max_content(), histogram.mean(), sigma)
    }
}

fn residual(points: &[(f64, f64)], p: &Vector3<f64>) -> f64 {
    points
        .iter()
        .map(|&(x, y)| {
            let r = y - gaussian(x, p[0], p[1], p[2]);
            r * r
        })
        .sum()
}

/// `JᵀJ` and `Jᵀr` at `p`
fn normal_equations(points: &[(f64, f64)], p: &Vector3<f64>) -> (Matrix3<f64>, Vector3<f64>) {
    let (a, mu, sigma) = (p[0], p[1], p[2]);
    let mut jtj = Matrix3::zeros();
    let mut jtr = Vector3::zeros();
    for &(x, y) in points {
        let d = x - mu;
        let e = (-0.5 * d * d / (sigma * sigma)).exp();
        let f = a * e;
        let j = Vector3::new(e, f * d / (sigma * sigma), f * d * d / (sigma * sigma * sigma));
        jtj += j * j.transpose();
        jtr += j * (y - f);
    }
    (jtj, jtr)
}

fn all_finite(p: &Vector3<f64>) -> bool {
    p.iter().all(|v| v.is_finite())
}

/// Quality of fitted parameters against the histogram they describe
fn classify(axis: &Axis, amplitude: f64, centroid: f64, spread: f64, converged: bool) -> FitStatus {
    let range = axis.high() - axis.low();
    if !(amplitude.is_finite() && centroid.is_finite() && spread.is_finite()) {
        FitStatus::NonFinite
    } else if !converged {
        FitStatus::IterationLimit
    } else if amplitude < 0.0 {
        FitStatus::NegativeAmplitude
    } else if spread == 0.0 {
        FitStatus::ZeroSpread
    } else if centroid < axis.low()
        || centroid > axis.high()
        || spread > MAX_SPREAD_PER_RANGE * range
    {
        FitStatus::Implausible
    } else {
        FitStatus::Converged
    }
}

impl FitStrategy for GaussianLeastSquares {
    fn name(&self) -> &'static str {
        "gaus-lsq"
    }

    fn fit(&self, histogram: &Histogram1D) -> Result<FitResult> {
        if histogram.integral() <= 0.0 {
            return Err(Error::Fit(format!(
                "histogram '{}' has no entries in range",
                histogram.name()
            )));
        }

        let points: Vec<(f64, f64)> = histogram.points().collect();
        let mut p = Self::seed(histogram);
        if !all_finite(&p) {
            return Err(Error::Fit(format!(
                "histogram '{}' has non-finite moments",
                histogram.name()
            )));
        }

        let mut chi2 = residual(&points, &p);
        let mut lambda = LAMBDA_START;
        let mut converged = false;
        let mut iterations = 0;

        while iterations < self.max_iterations {
            iterations += 1;
            let (jtj, jtr) = normal_equations(&points, &p);

            let mut improved = false;
            while lambda <= LAMBDA_MAX {
                let mut damped = jtj;
                for i in 0..3 {
                    damped[(i, i)] += lambda * jtj[(i, i)].max(LAMBDA_MIN);
                }

                let candidate = damped.lu().solve(&jtr).map(|step| (p + step, step));
                if let Some((next, step)) = candidate {
                    let next_chi2 = residual(&points, &next);
                    if all_finite(&next) && next_chi2.is_finite() && next_chi2 <= chi2 {
                        let decrease = chi2 - next_chi2;
                        let small_step = step.norm() <= self.tolerance * (next.norm() + self.tolerance);
                        p = next;
                        chi2 = next_chi2;
                        lambda = (lambda * 0.1).max(LAMBDA_MIN);
                        improved = true;
                        converged = decrease <= self.tolerance * chi2.max(f64::MIN_POSITIVE) || small_step;
                        break;
                    }
                }
                lambda *= 10.0;
            }

            tracing::trace!(iterations, chi2, lambda, "gaussian fit step");

            if !improved {
                // No damped step lowers the residual: stationary point
                converged = true;
            }
            if converged {
                break;
            }
        }

        let amplitude = p[0];
        let centroid = p[1];
        let spread = p[2].abs();

        let status = classify(histogram.axis(), amplitude, centroid, spread, converged);

        tracing::debug!(
            histogram = histogram.name(),
            amplitude,
            centroid,
            spread,
            chi2,
            iterations,
            %status,
            "gaussian fit finished"
        );

        Ok(FitResult {
            amplitude,
            centroid,
            spread,
            chi2,
            ndf: histogram.nonempty_bins().saturating_sub(3),
            iterations,
            status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Histogram whose bins hold an exact Gaussian profile
    fn exact_profile(a: f64, mu: f64, sigma: f64) -> Histogram1D {
        let axis = Axis::new(100, mu - 5.0 * sigma, mu + 5.0 * sigma).unwrap();
        let contents: Vec<f64> = (0..100).map(|i| gaussian(axis.center(i), a, mu, sigma)).collect();
        Histogram1D::from_parts(
            "profile",
            "profile",
            axis,
            contents,
            0,
            crate::histogram::Moments::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_gaussian_peak_and_width() {
        assert!((gaussian(2.0, 3.0, 2.0, 1.0) - 3.0).abs() < f64::EPSILON);
        let half = gaussian(2.0 + (2.0 * 2f64.ln()).sqrt(), 3.0, 2.0, 1.0);
        assert!((half - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_recovers_exact_profile() {
        let h = exact_profile(250.0, -3.0, 0.7);
        let result = GaussianLeastSquares::default().fit(&h).unwrap();
        assert_eq!(result.status, FitStatus::Converged);
        assert!((result.amplitude - 250.0).abs() < 1e-6);
        assert!((result.centroid - -3.0).abs() < 1e-8);
        assert!((result.spread - 0.7).abs() < 1e-8);
        assert!(result.chi2 < 1e-12);
    }

    #[test]
    fn test_empty_histogram_is_error() {
        let h = Histogram1D::new("empty", "empty", Axis::new(10, 0.0, 1.0).unwrap());
        let err = GaussianLeastSquares::default().fit(&h).unwrap_err();
        assert!(err.to_string().contains("no entries"));
    }

    #[test]
    fn test_single_bin_gives_finite_non_negative_spread() {
        let h = Histogram1D::from_values("spike", "spike", 100, &[4.2; 50]);
        let result = GaussianLeastSquares::default().fit(&h).unwrap();
        assert!(result.spread.is_finite());
        assert!(result.spread >= 0.0);
        assert!(result.amplitude.is_finite());
    }

    #[test]
    fn test_iteration_limit_is_flagged() {
        let h = exact_profile(100.0, 0.0, 1.0);
        let result = GaussianLeastSquares::new(1, 1e-30).fit(&h).unwrap();
        assert_eq!(result.iterations, 1);
        assert_eq!(result.status, FitStatus::IterationLimit);
        assert!(!result.status.is_ok());
    }

    #[test]
    fn test_classify_flags_parameters_outside_range() {
        let axis = Axis::new(100, 0.0, 10.0).unwrap();
        assert_eq!(classify(&axis, 20.0, 5.0, 2.0, true), FitStatus::Converged);
        assert_eq!(classify(&axis, 20.0, 5.04, 8.9e7, true), FitStatus::Implausible);
        assert_eq!(classify(&axis, 20.0, 12.0, 2.0, true), FitStatus::Implausible);
        assert_eq!(classify(&axis, 20.0, -0.5, 2.0, true), FitStatus::Implausible);
        assert_eq!(classify(&axis, 20.0, 5.0, 100.0, true), FitStatus::Converged);
        assert_eq!(classify(&axis, 20.0, 5.0, 2.0, false), FitStatus::IterationLimit);
    }

    #[test]
    fn test_two_separated_spikes_are_not_trusted() {
        let values: Vec<f64> = (0..2000_i32)
            .map(|i| {
                let jitter = f64::from(i % 10) * 0.01;
                if i < 1000 { jitter } else { 10.0 + jitter }
            })
            .collect();
        let h = Histogram1D::from_values("split", "split", 100, &values);
        let result = GaussianLeastSquares::default().fit(&h).unwrap();
        // the best single Gaussian is a flat line far wider than the data
        assert_eq!(result.status, FitStatus::Implausible, "{result:?}");
        assert!(!result.status.is_ok());
    }

    #[test]
    fn test_deterministic() {
        let values: Vec<f64> = (0..2000_i32).map(|i| f64::from((i * 7919) % 613) / 61.3).collect();
        let h = Histogram1D::from_values("det", "det", 100, &values);
        let a = GaussianLeastSquares::default().fit(&h).unwrap();
        let b = GaussianLeastSquares::default().fit(&h).unwrap();
        assert_eq!(a, b);
    }
}
