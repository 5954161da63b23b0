//! Analysis configuration
//!
//! Everything the batch driver iterates over is data: the variables to
//! characterize, the correlation pairs and the emittance planes. The
//! defaults reproduce the standard characterization of a trajectory
//! export; a JSON file can override any subset of fields.
//!
//! ```json
//! {
//!   "variables": ["tof", "ke"],
//!   "correlations": [["x", "vx"], ["y", "vy"]],
//!   "sample_cap": 5000,
//!   "selection": "ke > 10"
//! }
//! ```

use crate::selection::Selection;
use crate::storage::{DrawOptions, VALUE_COLUMNS};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Default number of rows drawn per histogram
pub const DEFAULT_SAMPLE_CAP: usize = 2000;

/// One transverse plane for an emittance plot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmittancePlane {
    /// Position column (`x`)
    pub position: String,
    /// Transverse velocity column (`vx`)
    pub transverse: String,
    /// Longitudinal velocity column
    #[serde(default = "default_longitudinal")]
    pub longitudinal: String,
}

fn default_longitudinal() -> String {
    "vz".to_string()
}

impl EmittancePlane {
    /// Plane with the default longitudinal velocity column `vz`
    #[must_use]
    pub fn new(position: impl Into<String>, transverse: impl Into<String>) -> Self {
        Self {
            position: position.into(),
            transverse: transverse.into(),
            longitudinal: default_longitudinal(),
        }
    }

    /// Override the longitudinal velocity column
    #[must_use]
    pub fn with_longitudinal(mut self, longitudinal: impl Into<String>) -> Self {
        self.longitudinal = longitudinal.into();
        self
    }
}

/// What a run analyzes and how
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    variables: Vec<String>,
    correlations: Vec<(String, String)>,
    emittance: Vec<EmittancePlane>,
    sample_cap: usize,
    first_entry: usize,
    selection: Option<String>,
    parallel: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            variables: VALUE_COLUMNS.iter().map(ToString::to_string).collect(),
            correlations: vec![("x".to_string(), "vx".to_string())],
            emittance: vec![EmittancePlane::new("x", "vx"), EmittancePlane::new("y", "vy")],
            sample_cap: DEFAULT_SAMPLE_CAP,
            first_entry: 0,
            selection: None,
            parallel: true,
        }
    }
}

impl AnalysisConfig {
    /// Start from the defaults
    #[must_use]
    pub fn builder() -> AnalysisConfigBuilder {
        AnalysisConfigBuilder::default()
    }

    /// Continue building from this configuration
    #[must_use]
    pub fn into_builder(self) -> AnalysisConfigBuilder {
        AnalysisConfigBuilder { config: self }
    }

    /// Parse and validate a JSON document
    ///
    /// # Errors
    /// Returns error if the JSON is malformed or the configuration is invalid
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file
    ///
    /// # Errors
    /// Returns error if the file cannot be read, is malformed, or is invalid
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json_str(&json)
    }

    /// Serialize as pretty JSON
    ///
    /// # Errors
    /// Returns error if serialization fails
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Variables to characterize, in report order
    #[must_use]
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    /// Correlation pairs `(x, y)`
    #[must_use]
    pub fn correlations(&self) -> &[(String, String)] {
        &self.correlations
    }

    /// Emittance planes
    #[must_use]
    pub fn emittance(&self) -> &[EmittancePlane] {
        &self.emittance
    }

    /// Maximum rows drawn per histogram
    #[must_use]
    pub const fn sample_cap(&self) -> usize {
        self.sample_cap
    }

    /// First row drawn
    #[must_use]
    pub const fn first_entry(&self) -> usize {
        self.first_entry
    }

    /// Row selection applied to every draw
    #[must_use]
    pub fn selection(&self) -> Option<&str> {
        self.selection.as_deref()
    }

    /// Whether characterizations run on the rayon pool
    #[must_use]
    pub const fn parallel(&self) -> bool {
        self.parallel
    }

    /// Check internal consistency
    ///
    /// Column names are checked later, against the dataset.
    ///
    /// # Errors
    /// Returns [`Error::Config`] describing the first problem found, or
    /// [`Error::Selection`] if the selection does not parse
    pub fn validate(&self) -> Result<()> {
        if self.variables.is_empty() {
            return Err(Error::Config("no variables to characterize".to_string()));
        }
        let mut seen = HashSet::new();
        for variable in &self.variables {
            if variable.trim().is_empty() {
                return Err(Error::Config("empty variable name".to_string()));
            }
            if !seen.insert(variable.as_str()) {
                return Err(Error::Config(format!("variable '{variable}' listed twice")));
            }
        }
        for (x, y) in &self.correlations {
            if x.is_empty() || y.is_empty() {
                return Err(Error::Config(format!(
                    "correlation pair ('{x}', '{y}') has an empty column"
                )));
            }
        }
        for plane in &self.emittance {
            if plane.position.is_empty()
                || plane.transverse.is_empty()
                || plane.longitudinal.is_empty()
            {
                return Err(Error::Config(format!(
                    "emittance plane {plane:?} has an empty column"
                )));
            }
        }
        if self.sample_cap == 0 {
            return Err(Error::Config("sample_cap must be at least 1".to_string()));
        }
        if let Some(selection) = &self.selection {
            Selection::parse(selection)?;
        }
        Ok(())
    }

    /// Draw options for every histogram of the run
    ///
    /// # Errors
    /// Returns [`Error::Selection`] if the selection does not parse
    pub fn draw_options(&self) -> Result<DrawOptions> {
        let options = DrawOptions::first(self.sample_cap).starting_at(self.first_entry);
        Ok(match &self.selection {
            Some(text) => options.with_selection(Selection::parse(text)?),
            None => options,
        })
    }
}

/// Builder for [`AnalysisConfig`]
#[derive(Debug, Default)]
pub struct AnalysisConfigBuilder {
    config: AnalysisConfig,
}

impl AnalysisConfigBuilder {
    /// Replace the variable list
    #[must_use]
    pub fn variables<I, S>(mut self, variables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.variables = variables.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the correlation pairs
    #[must_use]
    pub fn correlations<I, S>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, S)>,
        S: Into<String>,
    {
        self.config.correlations = pairs.into_iter().map(|(x, y)| (x.into(), y.into())).collect();
        self
    }

    /// Replace the emittance planes
    #[must_use]
    pub fn emittance(mut self, planes: Vec<EmittancePlane>) -> Self {
        self.config.emittance = planes;
        self
    }

    /// Set the per-histogram row cap
    #[must_use]
    pub const fn sample_cap(mut self, cap: usize) -> Self {
        self.config.sample_cap = cap;
        self
    }

    /// Set the first row drawn
    #[must_use]
    pub const fn first_entry(mut self, first: usize) -> Self {
        self.config.first_entry = first;
        self
    }

    /// Set the row selection
    #[must_use]
    pub fn selection(mut self, selection: impl Into<String>) -> Self {
        self.config.selection = Some(selection.into());
        self
    }

    /// Enable or disable parallel characterization
    #[must_use]
    pub const fn parallel(mut self, parallel: bool) -> Self {
        self.config.parallel = parallel;
        self
    }

    /// Validate and build
    ///
    /// # Errors
    /// Returns error if the configuration is invalid
    pub fn build(self) -> Result<AnalysisConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
