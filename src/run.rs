//! Run orchestration: one simulator export in, one working directory out
//!
//! For an input `<dir>/<stem>.<ext>` a run:
//! 1. creates `<dir>/<stem>/` (idempotent)
//! 2. copies the export to `<dir>/<stem>/read_<stem>.<ext>` with the header
//!    lines commented out
//! 3. materializes the dataset and persists it as `<stem>.parquet`
//! 4. runs every configured analysis, histograms going to
//!    `<stem>_hist.parquet`
//! 5. appends a block to `results_<stem>.<ext>`

use crate::analysis::{Analyzer, ResultsRecord};
use crate::config::AnalysisConfig;
use crate::report;
use crate::storage::{Dataset, HistogramStore};
use crate::{Error, Result};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// Header lines in a simulator text export
pub const DEFAULT_HEADER_LINES: usize = 56;

/// Prefix of the header-stripped working copy
const READ_PREFIX: &str = "read_";

/// Prefix of the report file
const RESULTS_PREFIX: &str = "results_";

/// Inputs of one run
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Simulator text export
    pub input: PathBuf,
    /// What to analyze
    pub config: AnalysisConfig,
    /// Leading lines to comment out
    pub header_lines: usize,
    /// Also write `<source>_results.json`
    pub write_json: bool,
}

impl RunOptions {
    /// Default options for `input`
    #[must_use]
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            config: AnalysisConfig::default(),
            header_lines: DEFAULT_HEADER_LINES,
            write_json: false,
        }
    }
}

/// What a run produced
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Working directory holding every artifact
    pub workdir: PathBuf,
    /// Artifact name prefix
    pub source: String,
    /// Rows in the materialized dataset
    pub rows: usize,
    /// Appended report
    pub report: PathBuf,
    /// JSON sidecar, if written
    pub json: Option<PathBuf>,
    /// Per-variable outcomes
    pub record: ResultsRecord,
}

impl RunSummary {
    /// Every characterization and plot succeeded
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.record.is_complete()
    }
}

/// Create the working directory `<parent>/<stem>` for `input`
///
/// # Errors
/// Returns error if the input has no file stem or the directory cannot be
/// created
pub fn prepare_workdir(input: &Path) -> Result<PathBuf> {
    let stem = input
        .file_stem()
        .ok_or_else(|| Error::Config(format!("{} has no file name", input.display())))?;
    let workdir = input.parent().unwrap_or_else(|| Path::new("")).join(stem);
    std::fs::create_dir_all(&workdir)?;
    Ok(workdir)
}

/// Copy `src` to `dst`, prefixing the first `header_lines` lines with `#`
///
/// Lines are copied as raw bytes, so a header in any encoding passes
/// through untouched. Returns the number of lines copied.
///
/// # Errors
/// Returns error if either file cannot be read or written
pub fn strip_header(src: &Path, dst: &Path, header_lines: usize) -> Result<usize> {
    let mut reader = BufReader::new(std::fs::File::open(src)?);
    let mut writer = BufWriter::new(std::fs::File::create(dst)?);
    let mut line = Vec::new();
    let mut count = 0;
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            break;
        }
        if count < header_lines {
            writer.write_all(b"#")?;
        }
        writer.write_all(&line)?;
        if !line.ends_with(b"\n") {
            writer.write_all(b"\n")?;
        }
        count += 1;
    }
    writer.flush()?;
    Ok(count)
}

/// Report file name for a working copy: `read_<name>` becomes `results_<name>`
#[must_use]
pub fn report_file_name(read_name: &str) -> String {
    read_name.strip_prefix(READ_PREFIX).map_or_else(
        || format!("{RESULTS_PREFIX}{read_name}"),
        |rest| format!("{RESULTS_PREFIX}{rest}"),
    )
}

/// Run the whole pipeline for one export
///
/// Per-variable and per-plot failures are recorded in the returned
/// summary; only failures that stop the run are errors.
///
/// # Errors
/// - [`Error::InputMissing`] if the input is not a file
/// - [`Error::Parse`] if the export is malformed
/// - [`Error::Io`] / [`Error::Storage`] if the working directory, dataset,
///   store or report cannot be written
#[tracing::instrument(skip(options), fields(input = %options.input.display()))]
pub fn run(options: &RunOptions) -> Result<RunSummary> {
    let input = &options.input;
    if !input.is_file() {
        return Err(Error::InputMissing(input.clone()));
    }
    options.config.validate()?;

    let workdir = prepare_workdir(input)?;
    let file_name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| Error::Config(format!("{} has no file name", input.display())))?;
    let source = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.clone());

    let read_name = format!("{READ_PREFIX}{file_name}");
    let read_path = workdir.join(&read_name);
    let lines = strip_header(input, &read_path, options.header_lines)?;
    info!(lines, header = options.header_lines, "header stripped");

    let dataset = Dataset::from_text_file(&read_path)?;
    dataset.write_parquet(workdir.join(format!("{source}.parquet")))?;
    info!(rows = dataset.num_rows(), "dataset materialized");

    let store = HistogramStore::open(workdir.join(format!("{source}_hist.parquet")))?;
    let analyzer = Analyzer::new(&dataset, options.config.clone(), store, &workdir, &source)?;
    let record = analyzer.run_all();
    let store = analyzer.into_store()?;
    info!(objects = store.len(), path = %store.path().display(), "histograms stored");

    let report_path = workdir.join(report_file_name(&read_name));
    report::append_report(&report_path, &record, options.config.variables())?;

    let json = if options.write_json {
        let path = workdir.join(format!("{source}_results.json"));
        report::write_json(&path, &record)?;
        Some(path)
    } else {
        None
    };

    Ok(RunSummary {
        workdir,
        source,
        rows: dataset.num_rows(),
        report: report_path,
        json,
        record,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_file_name() {
        assert_eq!(report_file_name("read_run1.txt"), "results_run1.txt");
        assert_eq!(report_file_name("thread.txt"), "results_thread.txt");
    }

    #[test]
    fn test_prepare_workdir_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("beam.txt");
        let first = prepare_workdir(&input).unwrap();
        let second = prepare_workdir(&input).unwrap();
        assert_eq!(first, dir.path().join("beam"));
        assert_eq!(first, second);
        assert!(first.is_dir());
    }

    #[test]
    fn test_strip_header_comments_leading_lines() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("in.txt");
        let dst = dir.path().join("out.txt");
        std::fs::write(&src, "h1\nh2\n1 2 3\n4 5 6").unwrap();

        assert_eq!(strip_header(&src, &dst, 2).unwrap(), 4);
        assert_eq!(
            std::fs::read_to_string(&dst).unwrap(),
            "#h1\n#h2\n1 2 3\n4 5 6\n"
        );
    }

    #[test]
    fn test_strip_header_keeps_raw_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("in.txt");
        let dst = dir.path().join("out.txt");
        std::fs::write(&src, b"units \xb5s\r\n1 2 3\n").unwrap();

        assert_eq!(strip_header(&src, &dst, 1).unwrap(), 2);
        assert_eq!(std::fs::read(&dst).unwrap(), b"#units \xb5s\r\n1 2 3\n");
    }

    #[test]
    fn test_missing_input() {
        let err = run(&RunOptions::new("/nonexistent-simchar/run.txt")).unwrap_err();
        assert!(matches!(err, Error::InputMissing(_)));
    }
}
