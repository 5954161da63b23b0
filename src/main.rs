//! simchar command-line interface
//!
//! Exit status: 0 when every characterization and plot succeeded, 2 when
//! the run finished with recorded failures, 1 when the run could not
//! complete.

use anyhow::{Context, Result};
use clap::{Parser, ValueHint};
use simchar::config::AnalysisConfig;
use simchar::run::{run, RunOptions, RunSummary, DEFAULT_HEADER_LINES};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "simchar")]
#[command(version, about = "Gaussian characterization of trajectory-simulation output")]
struct Cli {
    /// Simulator text export
    #[arg(value_hint = ValueHint::FilePath)]
    input: PathBuf,

    /// JSON analysis configuration (variables, pairs, planes, selection)
    #[arg(long, value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,

    /// Leading header lines to comment out
    #[arg(long, default_value_t = DEFAULT_HEADER_LINES)]
    header_lines: usize,

    /// Rows drawn per histogram (overrides the configuration)
    #[arg(long)]
    sample_cap: Option<usize>,

    /// Row selection applied to every draw, e.g. "ke > 10"
    #[arg(long)]
    selection: Option<String>,

    /// Characterize variables one at a time
    #[arg(long)]
    serial: bool,

    /// Also write <source>_results.json
    #[arg(long)]
    json: bool,

    /// Log filter (falls back to RUST_LOG, then "info")
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn analysis_config(&self) -> Result<AnalysisConfig> {
        let base = match &self.config {
            Some(path) => AnalysisConfig::from_json_file(path)
                .with_context(|| format!("loading configuration {}", path.display()))?,
            None => AnalysisConfig::default(),
        };
        let mut builder = base.into_builder();
        if let Some(cap) = self.sample_cap {
            builder = builder.sample_cap(cap);
        }
        if let Some(selection) = &self.selection {
            builder = builder.selection(selection.as_str());
        }
        if self.serial {
            builder = builder.parallel(false);
        }
        Ok(builder.build()?)
    }
}

fn init_logging(level: Option<&str>) {
    let filter = level.map_or_else(
        || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        EnvFilter::new,
    );
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn execute(cli: &Cli) -> Result<RunSummary> {
    let options = RunOptions {
        input: cli.input.clone(),
        config: cli.analysis_config()?,
        header_lines: cli.header_lines,
        write_json: cli.json,
    };
    Ok(run(&options)?)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    match execute(&cli) {
        Ok(summary) if summary.is_complete() => {
            println!("{}", summary.report.display());
            ExitCode::SUCCESS
        }
        Ok(summary) => {
            for entry in summary.record.entries() {
                if let simchar::Characterization::Failed { reason } = &entry.result {
                    eprintln!("simchar: {}: {reason}", entry.variable);
                }
            }
            for failure in summary.record.failures() {
                eprintln!("simchar: {}: {}", failure.artifact, failure.reason);
            }
            println!("{}", summary.report.display());
            ExitCode::from(2)
        }
        Err(e) => {
            eprintln!("simchar: {e:#}");
            ExitCode::FAILURE
        }
    }
}
