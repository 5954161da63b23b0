//! # simchar: Trajectory-Simulation Output Characterizer
//!
//! **Version**: 0.1.0
//!
//! simchar ingests the text export of a particle-trajectory simulator
//! (per-particle time of flight, position, velocity and kinetic energy),
//! fits a Gaussian to the distribution of every variable, draws position
//! correlation and emittance plots, and appends a summary of the fit
//! parameters to a text report.
//!
//! ## Pipeline
//!
//! - **Dataset**: header-stripped text export materialized as Arrow batches,
//!   persisted as Parquet ([`storage`])
//! - **Histograms**: auto-ranged 1D (100 bins) and 2D (40x40 bins) draws
//!   over the first rows of the dataset ([`histogram`])
//! - **Fitting**: Levenberg-Marquardt least-squares Gaussian fit behind the
//!   [`fit::FitStrategy`] trait ([`fit`])
//! - **Analysis**: characterization, correlation and emittance, run in
//!   parallel into a [`analysis::ResultsRecord`] ([`analysis`])
//! - **Report**: append-only text report and JSON sidecar ([`report`])
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use simchar::run::{run, RunOptions};
//!
//! let summary = run(&RunOptions::new("data/beam_run.txt"))?;
//! for entry in summary.record.entries() {
//!     if let Some(fit) = entry.result.fit() {
//!         println!("{}: mean {} sigma {}", entry.variable, fit.centroid, fit.spread);
//!     }
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod analysis;
pub mod config;
pub mod error;
pub mod fit;
pub mod histogram;
pub mod plot;
pub mod report;
pub mod run;
pub mod selection;
pub mod storage;

pub use analysis::{Analyzer, Characterization, ResultsRecord};
pub use config::AnalysisConfig;
pub use error::{Error, Result};
pub use fit::{FitResult, FitStatus, FitStrategy, GaussianLeastSquares};
pub use storage::{Dataset, DrawOptions, HistogramStore};
