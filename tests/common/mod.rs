//! Deterministic simulator exports for integration tests
//!
//! Every column of the first `SAMPLED` rows holds the exact normal
//! quantiles `(k + 0.5) / SAMPLED` in a stride permutation, so binned
//! distributions are close to their parent Gaussians without any
//! randomness. Rows past `SAMPLED` carry a far outlier in `tof`.

#![allow(dead_code)]

use simchar::storage::{read_text_export, Dataset};
use statrs::distribution::{ContinuousCDF, Normal};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// Rows drawn by the default sample cap
pub const SAMPLED: usize = 2000;

/// Time of flight of rows past `SAMPLED`
pub const OUTLIER_TOF: f64 = 1000.0;

/// Header lines written before the data
pub const HEADER_LINES: usize = 56;

/// `(mean, sigma, stride)` per value column except the correlated ones
const TOF: (f64, f64, usize) = (100.0, 5.0, 7);
const X: (f64, f64, usize) = (0.0, 2.0, 11);
const Y: (f64, f64, usize) = (0.0, 2.0, 13);
const Z: (f64, f64, usize) = (50.0, 1.0, 17);
const VX_NOISE: (f64, f64, usize) = (0.0, 0.5, 19);
const VY_NOISE: (f64, f64, usize) = (0.0, 0.5, 23);
const VZ: (f64, f64, usize) = (400.0, 10.0, 29);
const KE: (f64, f64, usize) = (20.0, 1.0, 31);

#[allow(clippy::cast_precision_loss)]
fn quantile((mean, sigma, stride): (f64, f64, usize), row: usize) -> f64 {
    let k = (row * stride) % SAMPLED;
    let p = (k as f64 + 0.5) / SAMPLED as f64;
    Normal::new(mean, sigma).unwrap().inverse_cdf(p)
}

/// Data lines (no header) for `rows` particles
pub fn data_lines(rows: usize) -> String {
    let mut text = String::new();
    for row in 0..rows {
        let tof = if row < SAMPLED { quantile(TOF, row) } else { OUTLIER_TOF };
        let x = quantile(X, row);
        let y = quantile(Y, row);
        let vx = 0.5 * x + quantile(VX_NOISE, row);
        let vy = 0.5 * y + quantile(VY_NOISE, row);
        writeln!(
            text,
            "{} {tof:.6} {x:.6} {y:.6} {:.6} {vx:.6} {vy:.6} {:.6} {:.6}",
            row + 1,
            quantile(Z, row),
            quantile(VZ, row),
            quantile(KE, row),
        )
        .unwrap();
    }
    text
}

/// Full export: header followed by `rows` data lines
pub fn export_text(rows: usize) -> String {
    let mut text = String::new();
    for i in 0..HEADER_LINES {
        writeln!(text, "------ Ion data record header line {i} : Ion N TOF X Y Z Vx Vy Vz KE ------").unwrap();
    }
    text.push_str(&data_lines(rows));
    text
}

/// Write an export named `name` into `dir`
pub fn write_export(dir: &Path, name: &str, rows: usize) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, export_text(rows)).unwrap();
    path
}

/// Dataset of `rows` particles, materialized in memory
pub fn dataset(rows: usize) -> Dataset {
    Dataset::new(read_text_export(data_lines(rows).as_bytes()).unwrap()).unwrap()
}
