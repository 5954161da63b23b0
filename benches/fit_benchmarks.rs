//! Histogramming and fitting benchmarks
//!
//! Benchmarks for the per-variable characterization path:
//! - Text export materialization
//! - 1D auto-ranged histogram fill
//! - Gaussian least-squares fit
//! - Windowed draw with a selection

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use simchar::fit::{FitStrategy, GaussianLeastSquares};
use simchar::histogram::{Histogram1D, BINS_1D};
use simchar::selection::Selection;
use simchar::storage::{read_text_export, Dataset, DrawOptions};
use std::fmt::Write as _;

/// Normal sample with a fixed seed
fn normal_sample(n: usize, mean: f64, sigma: f64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(42);
    let normal = Normal::new(mean, sigma).unwrap();
    (0..n).map(|_| normal.sample(&mut rng)).collect()
}

/// Text export body with `rows` random particles
fn export_text(rows: usize) -> String {
    let mut rng = StdRng::seed_from_u64(7);
    let normal = Normal::new(0.0, 1.0).unwrap();
    let mut text = String::with_capacity(rows * 96);
    for n in 0..rows {
        let mut fields = [0.0f64; 8];
        for field in &mut fields {
            *field = normal.sample(&mut rng);
        }
        fields[0] += 100.0;
        fields[6] += rng.gen_range(300.0..500.0);
        writeln!(
            text,
            "{n} {:.6} {:.6} {:.6} {:.6} {:.6} {:.6} {:.6} {:.6}",
            fields[0], fields[1], fields[2], fields[3], fields[4], fields[5], fields[6], fields[7]
        )
        .unwrap();
    }
    text
}

/// Benchmark text export materialization
fn bench_materialize(c: &mut Criterion) {
    let mut group = c.benchmark_group("materialize_text");

    for rows in [1_000, 10_000, 100_000].iter() {
        let text = export_text(*rows);

        group.bench_with_input(BenchmarkId::from_parameter(rows), rows, |b, _| {
            b.iter(|| {
                let batches = read_text_export(text.as_bytes()).unwrap();
                black_box(batches);
            });
        });
    }

    group.finish();
}

/// Benchmark histogram fill
fn bench_histogram_fill(c: &mut Criterion) {
    let mut group = c.benchmark_group("histogram_fill");

    for size in [2_000, 20_000, 200_000].iter() {
        let values = normal_sample(*size, 100.0, 5.0);

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                let h = Histogram1D::from_values("tof_new", "tof", BINS_1D, &values);
                black_box(h);
            });
        });
    }

    group.finish();
}

/// Benchmark the Gaussian fit
fn bench_gaussian_fit(c: &mut Criterion) {
    let mut group = c.benchmark_group("gaussian_fit");
    let fitter = GaussianLeastSquares::default();

    for size in [200, 2_000, 20_000].iter() {
        let values = normal_sample(*size, 100.0, 5.0);
        let h = Histogram1D::from_values("tof_new", "tof", BINS_1D, &values);

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                let fit = fitter.fit(black_box(&h)).unwrap();
                black_box(fit);
            });
        });
    }

    group.finish();
}

/// Benchmark a capped draw with and without a selection
fn bench_draw(c: &mut Criterion) {
    let mut group = c.benchmark_group("draw_1d");
    let dataset = Dataset::new(read_text_export(export_text(100_000).as_bytes()).unwrap()).unwrap();

    let plain = DrawOptions::first(2_000);
    let selected = DrawOptions::first(2_000).with_selection(Selection::parse("x > 0 AND ke < 1").unwrap());

    group.bench_function("first_2000", |b| {
        b.iter(|| black_box(dataset.draw_1d("tof", &plain).unwrap()));
    });
    group.bench_function("first_2000_selected", |b| {
        b.iter(|| black_box(dataset.draw_1d("tof", &selected).unwrap()));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_materialize,
    bench_histogram_fill,
    bench_gaussian_fit,
    bench_draw
);
criterion_main!(benches);
