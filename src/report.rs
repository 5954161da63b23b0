//! Text report of fit parameters
//!
//! The report is an append-only log: each run adds one timestamped block
//! and never rewrites earlier ones.
//!
//! ```text
//! 2026-10-17 14:03:11.482113
//!
//! Variable	Peak maximum		Centroid		Sigma
//! -------------------------------------------------------------------------
//! tof		87.1		100.02		4.98
//! bogus		FAILED: Schema error: no column named 'bogus' (...)
//! -------------------------------------------------------------------------
//!
//! ```

use crate::analysis::{Characterization, ResultsRecord};
use crate::Result;
use chrono::{DateTime, Local};
use std::fmt::Write as _;
use std::io::Write as _;
use std::path::Path;

/// Column header of a report block
pub const HEADER: &str = "Variable\tPeak maximum\t\tCentroid\t\tSigma";

/// Separator line (73 dashes)
pub const SEPARATOR: &str =
    "-------------------------------------------------------------------------";

/// Timestamp format of a report block
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Format one report block
///
/// Variables are listed in `order`; a variable missing from the record is
/// reported as not characterized.
#[must_use]
pub fn render_report<S: AsRef<str>>(
    record: &ResultsRecord,
    order: &[S],
    timestamp: DateTime<Local>,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", timestamp.format(TIMESTAMP_FORMAT));
    let _ = writeln!(out);
    let _ = writeln!(out, "{HEADER}");
    let _ = writeln!(out, "{SEPARATOR}");
    for variable in order {
        let variable = variable.as_ref();
        let _ = match record.get(variable) {
            Some(Characterization::Fitted(fit)) => writeln!(
                out,
                "{variable}\t\t{}\t\t{}\t\t{}",
                fit.amplitude, fit.centroid, fit.spread
            ),
            Some(Characterization::Failed { reason }) => {
                writeln!(out, "{variable}\t\tFAILED: {reason}")
            }
            None => writeln!(out, "{variable}\t\tFAILED: not characterized"),
        };
    }
    let _ = writeln!(out, "{SEPARATOR}");
    let _ = writeln!(out);
    out
}

/// Append a timestamped block to the report at `path`
///
/// Creates the file if needed; existing content is never truncated.
///
/// # Errors
/// Returns [`crate::Error::Io`] if the file cannot be opened or written
pub fn append_report<P: AsRef<Path>, S: AsRef<str>>(
    path: P,
    record: &ResultsRecord,
    order: &[S],
) -> Result<()> {
    let block = render_report(record, order, Local::now());
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path.as_ref())?;
    file.write_all(block.as_bytes())?;
    file.flush()?;
    tracing::info!(path = %path.as_ref().display(), variables = order.len(), "report appended");
    Ok(())
}

/// Write the record as pretty JSON, replacing any previous file
///
/// # Errors
/// Returns error if serialization or writing fails
pub fn write_json<P: AsRef<Path>>(path: P, record: &ResultsRecord) -> Result<()> {
    let json = serde_json::to_string_pretty(record)?;
    std::fs::write(path.as_ref(), json)?;
    Ok(())
}
