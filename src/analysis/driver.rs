//! Batch driver and the Results Record

use super::Analyzer;
use crate::fit::FitResult;
use crate::Result;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Outcome of characterizing one variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Characterization {
    /// Fit parameters (possibly flagged by their status)
    Fitted(FitResult),
    /// The variable could not be characterized
    Failed {
        /// Error message
        reason: String,
    },
}

impl Characterization {
    /// Fit parameters, if the fit ran
    #[must_use]
    pub const fn fit(&self) -> Option<&FitResult> {
        match self {
            Self::Fitted(fit) => Some(fit),
            Self::Failed { .. } => None,
        }
    }

    /// Whether the fit ran
    #[must_use]
    pub const fn is_fitted(&self) -> bool {
        matches!(self, Self::Fitted(_))
    }
}

impl From<Result<FitResult>> for Characterization {
    fn from(result: Result<FitResult>) -> Self {
        match result {
            Ok(fit) => Self::Fitted(fit),
            Err(e) => Self::Failed {
                reason: e.to_string(),
            },
        }
    }
}

/// One variable of the record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableEntry {
    /// Column name
    pub variable: String,
    /// What happened
    #[serde(flatten)]
    pub result: Characterization,
}

/// A correlation or emittance plot that could not be produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisFailure {
    /// Artifact stem, e.g. `x_vs_vx` or `xemittance`
    pub artifact: String,
    /// Error message
    pub reason: String,
}

/// Per-run mapping from variable to its characterization
///
/// Holds exactly one entry per configured variable, in configuration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultsRecord {
    entries: Vec<VariableEntry>,
    failures: Vec<AnalysisFailure>,
}

impl ResultsRecord {
    /// Number of variables
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the record has no variables
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in configuration order
    #[must_use]
    pub fn entries(&self) -> &[VariableEntry] {
        &self.entries
    }

    /// Characterization of `variable`
    #[must_use]
    pub fn get(&self, variable: &str) -> Option<&Characterization> {
        self.entries
            .iter()
            .find(|e| e.variable == variable)
            .map(|e| &e.result)
    }

    /// Fit parameters of `variable`, if it was fitted
    #[must_use]
    pub fn fit(&self, variable: &str) -> Option<&FitResult> {
        self.get(variable).and_then(Characterization::fit)
    }

    /// Variable names in configuration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.variable.as_str())
    }

    /// Failed correlation and emittance plots
    #[must_use]
    pub fn failures(&self) -> &[AnalysisFailure] {
        &self.failures
    }

    /// Every variable fitted and every plot produced
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.entries.iter().all(|e| e.result.is_fitted())
    }

    /// Record a variable outcome
    pub fn insert(&mut self, variable: impl Into<String>, result: Characterization) {
        let variable = variable.into();
        match self.entries.iter_mut().find(|e| e.variable == variable) {
            Some(entry) => entry.result = result,
            None => self.entries.push(VariableEntry { variable, result }),
        }
    }

    /// Record a failed plot
    pub fn push_failure(&mut self, artifact: impl Into<String>, reason: impl Into<String>) {
        self.failures.push(AnalysisFailure {
            artifact: artifact.into(),
            reason: reason.into(),
        });
    }
}

impl Analyzer<'_> {
    /// Characterize every configured variable, then draw every configured
    /// correlation and emittance plot
    ///
    /// Failures are recorded, never propagated: the record always holds
    /// one entry per configured variable.
    #[must_use]
    pub fn run_all(&self) -> ResultsRecord {
        let variables = self.config().variables();
        let parallel = self.config().parallel() && cfg!(feature = "rayon");
        info!(variables = variables.len(), parallel, "characterizing");

        let outcomes = if parallel {
            self.characterize_parallel(variables)
        } else {
            variables.iter().map(|v| self.characterize(v)).collect()
        };

        let mut record = ResultsRecord::default();
        for (variable, outcome) in variables.iter().zip(outcomes) {
            if let Err(e) = &outcome {
                warn!(%variable, error = %e, "characterization failed");
            }
            record.insert(variable.as_str(), outcome.into());
        }

        for (x, y) in self.config().correlations() {
            if let Err(e) = self.correlate(x, y) {
                warn!(%x, %y, error = %e, "correlation failed");
                record.push_failure(format!("{x}_vs_{y}"), e.to_string());
            }
        }

        for plane in self.config().emittance() {
            if let Err(e) = self.emittance(plane) {
                warn!(position = %plane.position, error = %e, "emittance plot failed");
                record.push_failure(format!("{}emittance", plane.position), e.to_string());
            }
        }

        record
    }

    #[cfg(feature = "rayon")]
    fn characterize_parallel(&self, variables: &[String]) -> Vec<Result<FitResult>> {
        use rayon::prelude::*;
        variables.par_iter().map(|v| self.characterize(v)).collect()
    }

    #[cfg(not(feature = "rayon"))]
    fn characterize_parallel(&self, variables: &[String]) -> Vec<Result<FitResult>> {
        variables.iter().map(|v| self.characterize(v)).collect()
    }
}
