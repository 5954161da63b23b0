//! Error types for simchar
//!
//! Every failure names the thing that went wrong and, where possible, what
//! the caller can do about it.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// simchar error types
#[derive(Error, Debug)]
pub enum Error {
    /// Input export does not exist
    #[error("Input file not found: {}\nPass the path of a simulator text export", .0.display())]
    InputMissing(PathBuf),

    /// Requested variable is not a column of the dataset
    #[error("Schema error: no column named '{column}' (available: {})", available.join(", "))]
    Schema {
        /// Requested column name
        column: String,
        /// Columns present in the dataset
        available: Vec<String>,
    },

    /// Fit could not be attempted or solved
    #[error("Fit error: {0}")]
    Fit(String),

    /// Malformed row in the text export
    #[error("Parse error at line {line}: {message}")]
    Parse {
        /// 1-based line number in the source text
        line: usize,
        /// What was wrong with the row
        message: String,
    },

    /// Invalid selection expression
    #[error("Selection error: {0}")]
    Selection(String),

    /// Storage error (Parquet/Arrow)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Plot rendering failed
    #[error("Plot error: {0}")]
    Plot(String),

    /// Invalid analysis configuration
    #[error("Config error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Arrow error
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Build a schema error for `column` against the given available names
    pub(crate) fn schema<S: AsRef<str>>(column: &str, available: &[S]) -> Self {
        Self::Schema {
            column: column.to_string(),
            available: available.iter().map(|s| s.as_ref().to_string()).collect(),
        }
    }
}
