//! Exit status of the simchar binary

mod common;

use common::write_export;
use std::process::Command;

fn simchar() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_simchar"));
    command.env_remove("RUST_LOG");
    command
}

#[test]
fn test_missing_input_exits_with_one() {
    let dir = tempfile::tempdir().unwrap();
    let output = simchar()
        .arg(dir.path().join("absent.txt"))
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Input file not found"), "{stderr}");
}

#[test]
fn test_complete_run_exits_with_zero() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_export(dir.path(), "beam.txt", 400);

    let output = simchar()
        .arg(&input)
        .args(["--serial", "--json", "--log-level", "warn"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.trim_end().ends_with("results_beam.txt"), "{stdout}");
    assert!(dir.path().join("beam").join("beam_results.json").is_file());
}

#[test]
fn test_recorded_failure_exits_with_two() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_export(dir.path(), "beam.txt", 400);
    let config = dir.path().join("analysis.json");
    std::fs::write(&config, r#"{"variables": ["tof", "bogus"]}"#).unwrap();

    let output = simchar()
        .arg(&input)
        .arg("--config")
        .arg(&config)
        .args(["--sample-cap", "300"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("bogus"), "{stderr}");

    let report = std::fs::read_to_string(dir.path().join("beam").join("results_beam.txt")).unwrap();
    assert!(report.contains("tof\t\t"));
    assert!(report.contains("bogus\t\tFAILED:"));
}

#[test]
fn test_invalid_config_exits_with_one() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_export(dir.path(), "beam.txt", 50);

    let output = simchar()
        .arg(&input)
        .args(["--sample-cap", "0"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("sample_cap"));
}
