//! Plot rendering
//!
//! Rendering is a collaborator behind the [`PlotRenderer`] trait so the
//! analysis layer never touches a drawing backend directly. The shipped
//! implementation, [`SvgRenderer`], writes SVG through `plotters` and needs
//! no system fonts, which keeps it usable in headless batch runs.

use crate::fit::FitResult;
use crate::histogram::{Histogram1D, Histogram2D};
use crate::{Error, Result};
use plotters::prelude::*;
use std::path::Path;

/// Canvas size in pixels
pub const CANVAS: (u32, u32) = (800, 600);

/// Points used to draw a fitted curve
const CURVE_POINTS: usize = 500;

/// Draws histograms to files
pub trait PlotRenderer: Send + Sync {
    /// File extension (without the dot) of produced files
    fn extension(&self) -> &'static str;

    /// Histogram as bars with the fitted Gaussian overlaid
    ///
    /// # Errors
    /// Returns [`Error::Plot`] if the file cannot be drawn or written
    fn render_fit(&self, path: &Path, histogram: &Histogram1D, fit: &FitResult) -> Result<()>;

    /// 2D histogram as a filled color map, no statistics box
    ///
    /// # Errors
    /// Returns [`Error::Plot`] if the file cannot be drawn or written
    fn render_color_map(
        &self,
        path: &Path,
        histogram: &Histogram2D,
        x_title: &str,
        y_title: &str,
    ) -> Result<()>;

    /// 2D histogram as a scatter of occupied bins
    ///
    /// # Errors
    /// Returns [`Error::Plot`] if the file cannot be drawn or written
    fn render_scatter(
        &self,
        path: &Path,
        histogram: &Histogram2D,
        x_title: &str,
        y_title: &str,
    ) -> Result<()>;
}

/// SVG renderer backed by `plotters`
#[derive(Debug, Clone, Copy, Default)]
pub struct SvgRenderer;

impl SvgRenderer {
    /// Create a renderer
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

fn plot_error(path: &Path) -> impl Fn(&dyn std::fmt::Display) -> Error + '_ {
    move |e: &dyn std::fmt::Display| Error::Plot(format!("{}: {e}", path.display()))
}

/// Hue for a bin relative to the fullest bin: blue (empty) to red (full)
fn heat(content: f64, max: f64) -> HSLColor {
    let fraction = if max > 0.0 { (content / max).clamp(0.0, 1.0) } else { 0.0 };
    HSLColor((1.0 - fraction) * 2.0 / 3.0, 0.9, 0.5)
}

impl PlotRenderer for SvgRenderer {
    fn extension(&self) -> &'static str {
        "svg"
    }

    fn render_fit(&self, path: &Path, histogram: &Histogram1D, fit: &FitResult) -> Result<()> {
        let err = plot_error(path);
        let axis = *histogram.axis();
        let y_max = histogram.max_content().max(fit.amplitude).max(1.0) * 1.1;

        let root = SVGBackend::new(path, CANVAS).into_drawing_area();
        root.fill(&WHITE).map_err(|e| err(&e))?;

        let mut chart = ChartBuilder::on(&root)
            .caption(histogram.name(), ("sans-serif", 24))
            .margin(15)
            .x_label_area_size(45)
            .y_label_area_size(60)
            .build_cartesian_2d(axis.low()..axis.high(), 0.0..y_max)
            .map_err(|e| err(&e))?;

        chart
            .configure_mesh()
            .disable_mesh()
            .x_desc(histogram.title())
            .y_desc("Entries")
            .draw()
            .map_err(|e| err(&e))?;

        chart
            .draw_series(histogram.contents().iter().enumerate().map(|(i, &c)| {
                Rectangle::new(
                    [(axis.edge(i), 0.0), (axis.edge(i + 1), c)],
                    BLUE.mix(0.4).filled(),
                )
            }))
            .map_err(|e| err(&e))?;

        #[allow(clippy::cast_precision_loss)]
        let step = (axis.high() - axis.low()) / CURVE_POINTS as f64;
        #[allow(clippy::cast_precision_loss)]
        let curve = (0..=CURVE_POINTS)
            .map(|i| {
                let x = axis.low() + i as f64 * step;
                (x, fit.evaluate(x))
            })
            .filter(|(_, y)| y.is_finite());
        chart
            .draw_series(LineSeries::new(curve, RED.stroke_width(2)))
            .map_err(|e| err(&e))?
            .label(format!(
                "A = {:.4}  mean = {:.4}  sigma = {:.4}",
                fit.amplitude, fit.centroid, fit.spread
            ))
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &RED));

        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(&BLACK)
            .position(SeriesLabelPosition::UpperRight)
            .draw()
            .map_err(|e| err(&e))?;

        root.present().map_err(|e| err(&e))?;
        Ok(())
    }

    fn render_color_map(
        &self,
        path: &Path,
        histogram: &Histogram2D,
        x_title: &str,
        y_title: &str,
    ) -> Result<()> {
        let err = plot_error(path);
        let (xa, ya) = (*histogram.x_axis(), *histogram.y_axis());
        let max = histogram.max_content();

        let root = SVGBackend::new(path, CANVAS).into_drawing_area();
        root.fill(&WHITE).map_err(|e| err(&e))?;

        let mut chart = ChartBuilder::on(&root)
            .caption(histogram.title(), ("sans-serif", 24))
            .margin(15)
            .x_label_area_size(45)
            .y_label_area_size(60)
            .build_cartesian_2d(xa.low()..xa.high(), ya.low()..ya.high())
            .map_err(|e| err(&e))?;

        chart
            .configure_mesh()
            .disable_mesh()
            .x_desc(x_title)
            .y_desc(y_title)
            .draw()
            .map_err(|e| err(&e))?;

        chart
            .draw_series(histogram.occupied().map(|(ix, iy, c)| {
                Rectangle::new(
                    [(xa.edge(ix), ya.edge(iy)), (xa.edge(ix + 1), ya.edge(iy + 1))],
                    heat(c, max).filled(),
                )
            }))
            .map_err(|e| err(&e))?;

        root.present().map_err(|e| err(&e))?;
        Ok(())
    }

    fn render_scatter(
        &self,
        path: &Path,
        histogram: &Histogram2D,
        x_title: &str,
        y_title: &str,
    ) -> Result<()> {
        let err = plot_error(path);
        let (xa, ya) = (*histogram.x_axis(), *histogram.y_axis());

        let root = SVGBackend::new(path, CANVAS).into_drawing_area();
        root.fill(&WHITE).map_err(|e| err(&e))?;

        let mut chart = ChartBuilder::on(&root)
            .caption(histogram.title(), ("sans-serif", 24))
            .margin(15)
            .x_label_area_size(45)
            .y_label_area_size(60)
            .build_cartesian_2d(xa.low()..xa.high(), ya.low()..ya.high())
            .map_err(|e| err(&e))?;

        chart
            .configure_mesh()
            .x_desc(x_title)
            .y_desc(y_title)
            .draw()
            .map_err(|e| err(&e))?;

        // azure
        let marker = RGBColor(0, 127, 255);
        chart
            .draw_series(
                histogram
                    .occupied()
                    .map(|(ix, iy, _)| Circle::new((xa.center(ix), ya.center(iy)), 2, marker.filled())),
            )
            .map_err(|e| err(&e))?;

        root.present().map_err(|e| err(&e))?;
        Ok(())
    }
}
