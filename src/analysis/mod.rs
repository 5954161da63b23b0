//! Distribution characterization, correlation and emittance analysis
//!
//! An [`Analyzer`] binds one dataset to its collaborators: the fitting
//! strategy, the renderer and the histogram store. Every operation draws
//! from the same row window (first entry, sample cap, selection) so the
//! results of one run are mutually consistent.
//!
//! The store sits behind a mutex and is the only shared mutable state;
//! characterizations of different variables may run concurrently.

mod driver;

pub use driver::{AnalysisFailure, Characterization, ResultsRecord, VariableEntry};

use crate::config::{AnalysisConfig, EmittancePlane};
use crate::fit::{FitResult, FitStrategy, GaussianLeastSquares};
use crate::histogram::{Histogram2D, BINS_2D};
use crate::plot::{PlotRenderer, SvgRenderer};
use crate::storage::{Dataset, DrawOptions, HistogramStore, StoredObject};
use crate::{Error, Result};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Runs the analyses of one dataset
pub struct Analyzer<'a> {
    dataset: &'a Dataset,
    config: AnalysisConfig,
    options: DrawOptions,
    fitter: Arc<dyn FitStrategy>,
    renderer: Arc<dyn PlotRenderer>,
    store: Mutex<HistogramStore>,
    output_dir: PathBuf,
    source: String,
}

impl<'a> Analyzer<'a> {
    /// Create an analyzer with the default fitter and SVG renderer
    ///
    /// `source` prefixes every artifact written to `output_dir`.
    ///
    /// # Errors
    /// Returns error if the configured selection does not parse
    pub fn new(
        dataset: &'a Dataset,
        config: AnalysisConfig,
        store: HistogramStore,
        output_dir: impl Into<PathBuf>,
        source: impl Into<String>,
    ) -> Result<Self> {
        let options = config.draw_options()?;
        Ok(Self {
            dataset,
            config,
            options,
            fitter: Arc::new(GaussianLeastSquares::default()),
            renderer: Arc::new(SvgRenderer::new()),
            store: Mutex::new(store),
            output_dir: output_dir.into(),
            source: source.into(),
        })
    }

    /// Use a different fitting strategy
    #[must_use]
    pub fn with_fitter(mut self, fitter: Arc<dyn FitStrategy>) -> Self {
        self.fitter = fitter;
        self
    }

    /// Use a different renderer
    #[must_use]
    pub fn with_renderer(mut self, renderer: Arc<dyn PlotRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Configuration in effect
    #[must_use]
    pub const fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Artifact name prefix
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Release the histogram store
    ///
    /// # Errors
    /// Returns error if a writer panicked while holding the store
    pub fn into_store(self) -> Result<HistogramStore> {
        self.store.into_inner().map_err(|_| poisoned())
    }

    /// Fit a Gaussian to the distribution of `variable`
    ///
    /// Draws `<variable>_new`, fits it, renders
    /// `<source>_<variable>_fit_gaus.svg` and persists the histogram. A fit
    /// that does not converge cleanly still returns its parameters; the
    /// problem is logged as a warning and carried in
    /// [`FitResult::status`].
    ///
    /// # Errors
    /// - [`Error::Schema`] if `variable` is not a column (nothing is written)
    /// - [`Error::Fit`] if no drawn value falls in range
    /// - [`Error::Plot`] / [`Error::Storage`] if an artifact cannot be written
    #[tracing::instrument(skip(self), fields(source = %self.source))]
    pub fn characterize(&self, variable: &str) -> Result<FitResult> {
        let histogram = self.dataset.draw_1d(variable, &self.options)?;
        debug!(entries = histogram.entries(), "histogram drawn");

        let fit = self.fitter.fit(&histogram)?;
        if !fit.status.is_ok() {
            warn!(
                variable,
                status = %fit.status,
                amplitude = fit.amplitude,
                centroid = fit.centroid,
                spread = fit.spread,
                "Gaussian fit is not trustworthy"
            );
        }

        let path = self.artifact(&format!("{variable}_fit_gaus"));
        self.renderer.render_fit(&path, &histogram, &fit)?;
        self.persist(histogram)?;

        info!(
            variable,
            amplitude = fit.amplitude,
            centroid = fit.centroid,
            spread = fit.spread,
            fitter = self.fitter.name(),
            "characterized"
        );
        Ok(fit)
    }

    /// Histogram `y` against `x` and render it as a color map
    ///
    /// Writes `<source>_<x>_vs_<y>.svg` and persists `<x>_<y>`. No fit is
    /// performed.
    ///
    /// # Errors
    /// - [`Error::Schema`] if either column is missing
    /// - [`Error::Plot`] / [`Error::Storage`] if an artifact cannot be written
    #[tracing::instrument(skip(self), fields(source = %self.source))]
    pub fn correlate(&self, x: &str, y: &str) -> Result<Histogram2D> {
        let histogram = self.dataset.draw_2d(x, y, &self.options)?;

        let path = self.artifact(&format!("{x}_vs_{y}"));
        self.renderer.render_color_map(&path, &histogram, x, y)?;
        self.persist(histogram.clone())?;

        info!(x, y, entries = histogram.entries(), "correlated");
        Ok(histogram)
    }

    /// Position against divergence angle for one transverse plane
    ///
    /// The angle is `atan(v / v_long)` in mrad. Rows with a zero or
    /// non-finite angle input are dropped. Writes
    /// `<source>_<position>emittance.svg` and persists `<position>_<position>'`.
    ///
    /// # Errors
    /// - [`Error::Schema`] if a plane column is missing
    /// - [`Error::Plot`] / [`Error::Storage`] if an artifact cannot be written
    #[tracing::instrument(skip(self), fields(source = %self.source))]
    pub fn emittance(&self, plane: &EmittancePlane) -> Result<Histogram2D> {
        let drawn = self.dataset.draw_columns(
            &[
                plane.position.as_str(),
                plane.transverse.as_str(),
                plane.longitudinal.as_str(),
            ],
            &self.options,
        )?;
        let (positions, angles) = divergence(&drawn[0], &drawn[1], &drawn[2]);
        let dropped = drawn[0].len() - positions.len();
        if dropped > 0 {
            debug!(dropped, "rows without a finite divergence angle skipped");
        }

        let pos = &plane.position;
        let histogram = Histogram2D::from_pairs(
            format!("{pos}_{pos}'"),
            format!("{pos}':{pos}"),
            BINS_2D,
            &positions,
            &angles,
        );

        let path = self.artifact(&format!("{pos}emittance"));
        self.renderer.render_scatter(
            &path,
            &histogram,
            &format!("{pos} [mm]"),
            &format!("{pos}' [mrad]"),
        )?;
        self.persist(histogram.clone())?;

        info!(plane = %pos, entries = histogram.entries(), "emittance drawn");
        Ok(histogram)
    }

    /// Path of an artifact in the output directory
    fn artifact(&self, stem: &str) -> PathBuf {
        artifact_path(
            &self.output_dir,
            &self.source,
            stem,
            self.renderer.extension(),
        )
    }

    fn persist(&self, object: impl Into<StoredObject>) -> Result<()> {
        self.store.lock().map_err(|_| poisoned())?.persist(object)
    }
}

/// `<dir>/<source>_<stem>.<extension>`
#[must_use]
pub fn artifact_path(dir: &Path, source: &str, stem: &str, extension: &str) -> PathBuf {
    dir.join(format!("{source}_{stem}.{extension}"))
}

/// Positions and divergence angles (mrad) of rows with a finite angle
fn divergence(position: &[f64], transverse: &[f64], longitudinal: &[f64]) -> (Vec<f64>, Vec<f64>) {
    position
        .iter()
        .zip(transverse)
        .zip(longitudinal)
        .filter(|((_, _), &vl)| vl != 0.0)
        .map(|((&p, &vt), &vl)| (p, (vt / vl).atan() * 1000.0))
        .filter(|(p, angle)| p.is_finite() && angle.is_finite())
        .unzip()
}

fn poisoned() -> Error {
    Error::Storage("histogram store lock poisoned".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::histogram::Histogram1D;
    use crate::storage::read_text_export;
    use std::io::Cursor;

    /// Renderer that only records what it was asked to draw
    #[derive(Default)]
    struct Recorder {
        paths: Mutex<Vec<PathBuf>>,
    }

    impl Recorder {
        fn paths(&self) -> Vec<PathBuf> {
            self.paths.lock().unwrap().clone()
        }

        fn record(&self, path: &Path) -> Result<()> {
            self.paths.lock().unwrap().push(path.to_path_buf());
            Ok(())
        }
    }

    impl PlotRenderer for Recorder {
        fn extension(&self) -> &'static str {
            "svg"
        }

        fn render_fit(&self, path: &Path, _: &Histogram1D, _: &FitResult) -> Result<()> {
            self.record(path)
        }

        fn render_color_map(&self, path: &Path, _: &Histogram2D, _: &str, _: &str) -> Result<()> {
            self.record(path)
        }

        fn render_scatter(&self, path: &Path, _: &Histogram2D, _: &str, _: &str) -> Result<()> {
            self.record(path)
        }
    }

    fn dataset(rows: i32) -> Dataset {
        let mut text = String::new();
        for n in 0..rows {
            let t = f64::from(n % 21) - 10.0;
            let vz = if n % 50 == 0 { 0.0 } else { 400.0 };
            text.push_str(&format!(
                "{n} {} {} {} 0 {} {} {vz} {}\n",
                100.0 + t,
                t * 0.1,
                -t * 0.1,
                t * 2.0,
                t,
                5.0 + t.abs()
            ));
        }
        Dataset::new(read_text_export(Cursor::new(text)).unwrap()).unwrap()
    }

    fn analyzer<'a>(
        dataset: &'a Dataset,
        dir: &Path,
        recorder: &Arc<Recorder>,
    ) -> Analyzer<'a> {
        let store = HistogramStore::open(dir.join("run_hist.parquet")).unwrap();
        Analyzer::new(dataset, AnalysisConfig::default(), store, dir, "run")
            .unwrap()
            .with_renderer(recorder.clone())
    }

    #[test]
    fn test_artifact_path() {
        let path = artifact_path(Path::new("/w"), "run", "tof_fit_gaus", "svg");
        assert_eq!(path, Path::new("/w/run_tof_fit_gaus.svg"));
    }

    #[test]
    fn test_divergence_skips_zero_longitudinal() {
        let (p, a) = divergence(&[1.0, 2.0, 3.0], &[1.0, 1.0, 0.0], &[1.0, 0.0, 5.0]);
        assert_eq!(p, vec![1.0, 3.0]);
        assert!((a[0] - std::f64::consts::FRAC_PI_4 * 1000.0).abs() < 1e-9);
        assert!(a[1].abs() < f64::EPSILON);
    }

    #[test]
    fn test_characterize_writes_plot_and_histogram() {
        let dir = tempfile::tempdir().unwrap();
        let data = dataset(500);
        let recorder = Arc::new(Recorder::default());
        let analyzer = analyzer(&data, dir.path(), &recorder);

        let fit = analyzer.characterize("tof").unwrap();
        assert!((fit.centroid - 100.0).abs() < 1.0);
        assert!(fit.spread > 0.0);
        assert_eq!(recorder.paths(), vec![dir.path().join("run_tof_fit_gaus.svg")]);

        let store = analyzer.into_store().unwrap();
        assert_eq!(store.histogram_1d("tof_new").unwrap().entries(), 500);
    }

    #[test]
    fn test_characterize_unknown_variable_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let data = dataset(50);
        let recorder = Arc::new(Recorder::default());
        let analyzer = analyzer(&data, dir.path(), &recorder);

        let err = analyzer.characterize("bogus").unwrap_err();
        assert!(matches!(err, Error::Schema { .. }));
        assert!(recorder.paths().is_empty());
        assert!(analyzer.into_store().unwrap().is_empty());
    }

    #[test]
    fn test_correlate_names() {
        let dir = tempfile::tempdir().unwrap();
        let data = dataset(300);
        let recorder = Arc::new(Recorder::default());
        let analyzer = analyzer(&data, dir.path(), &recorder);

        let h = analyzer.correlate("x", "vx").unwrap();
        assert_eq!(h.name(), "x_vx");
        assert_eq!(h.entries(), 300);
        assert_eq!(recorder.paths(), vec![dir.path().join("run_x_vs_vx.svg")]);
    }

    #[test]
    fn test_emittance_drops_zero_vz_rows() {
        let dir = tempfile::tempdir().unwrap();
        let data = dataset(200);
        let recorder = Arc::new(Recorder::default());
        let analyzer = analyzer(&data, dir.path(), &recorder);

        let h = analyzer.emittance(&EmittancePlane::new("x", "vx")).unwrap();
        assert_eq!(h.name(), "x_x'");
        // rows 0, 50, 100, 150 have vz = 0
        assert_eq!(h.entries(), 196);
        assert_eq!(recorder.paths(), vec![dir.path().join("run_xemittance.svg")]);
        assert!(analyzer.into_store().unwrap().histogram_2d("x_x'").is_some());
    }
}
