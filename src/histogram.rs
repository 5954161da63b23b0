//! Binned frequency distributions
//!
//! Histograms are filled once from a drawn sample and never mutated after
//! they are handed to the store. Axes are auto-ranged from the drawn values:
//! the lowest value opens the first bin and the highest value lands in the
//! last bin, so every finite drawn value is counted.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Bin count for 1D draws
pub const BINS_1D: usize = 100;

/// Bin count per axis for 2D draws
pub const BINS_2D: usize = 40;

/// Where a value falls on an axis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// Below the lower edge
    Underflow,
    /// Inside bin `n`
    Bin(usize),
    /// Above the upper edge (or NaN)
    Overflow,
}

/// Uniform binning over `[low, high]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Axis {
    bins: usize,
    low: f64,
    high: f64,
}

impl Axis {
    /// Create an axis with explicit limits
    ///
    /// # Errors
    /// Returns error if `bins` is zero or the limits are not finite and increasing
    pub fn new(bins: usize, low: f64, high: f64) -> Result<Self> {
        if bins == 0 {
            return Err(Error::Config("axis needs at least one bin".to_string()));
        }
        if !low.is_finite() || !high.is_finite() || low >= high {
            return Err(Error::Config(format!(
                "invalid axis limits [{low}, {high}]"
            )));
        }
        Ok(Self { bins, low, high })
    }

    /// Auto-range an axis from the finite values of a sample
    ///
    /// An empty sample gives `[0, 1]`. A sample with a single distinct
    /// value is widened symmetrically so the value sits mid-axis.
    #[must_use]
    pub fn auto(bins: usize, values: &[f64]) -> Self {
        let bins = bins.max(1);
        let (min, max) = values
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(v), hi.max(v))
            });

        if !min.is_finite() {
            return Self { bins, low: 0.0, high: 1.0 };
        }

        if max > min {
            Self { bins, low: min, high: max }
        } else {
            let pad = if min == 0.0 { 1.0 } else { min.abs() * 0.1 };
            Self {
                bins,
                low: min - pad,
                high: max + pad,
            }
        }
    }

    /// Number of bins
    #[must_use]
    pub const fn bins(&self) -> usize {
        self.bins
    }

    /// Lower edge of the first bin
    #[must_use]
    pub const fn low(&self) -> f64 {
        self.low
    }

    /// Upper edge of the last bin
    #[must_use]
    pub const fn high(&self) -> f64 {
        self.high
    }

    /// Width of one bin
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn width(&self) -> f64 {
        (self.high - self.low) / self.bins as f64
    }

    /// Center of bin `index`
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn center(&self, index: usize) -> f64 {
        self.low + (index as f64 + 0.5) * self.width()
    }

    /// Lower edge of bin `index`
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn edge(&self, index: usize) -> f64 {
        self.low + index as f64 * self.width()
    }

    /// Locate a value; the upper edge itself belongs to the last bin
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn locate(&self, value: f64) -> Slot {
        if value.is_nan() || value > self.high {
            return Slot::Overflow;
        }
        if value < self.low {
            return Slot::Underflow;
        }
        let index = ((value - self.low) / self.width()) as usize;
        Slot::Bin(index.min(self.bins - 1))
    }
}

/// Running sums over the in-range fills of a 1D histogram
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Moments {
    /// Sum of weights
    pub sum_w: f64,
    /// Sum of weight * x
    pub sum_wx: f64,
    /// Sum of weight * x^2
    pub sum_wx2: f64,
}

/// One-dimensional histogram
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram1D {
    name: String,
    title: String,
    axis: Axis,
    contents: Vec<f64>,
    underflow: f64,
    overflow: f64,
    entries: u64,
    moments: Moments,
}

impl Histogram1D {
    /// Create an empty histogram
    #[must_use]
    pub fn new(name: impl Into<String>, title: impl Into<String>, axis: Axis) -> Self {
        Self {
            name: name.into(),
            title: title.into(),
            axis,
            contents: vec![0.0; axis.bins()],
            underflow: 0.0,
            overflow: 0.0,
            entries: 0,
            moments: Moments::default(),
        }
    }

    /// Auto-range over `values` and fill with all of them
    #[must_use]
    pub fn from_values(
        name: impl Into<String>,
        title: impl Into<String>,
        bins: usize,
        values: &[f64],
    ) -> Self {
        let mut histogram = Self::new(name, title, Axis::auto(bins, values));
        for &value in values {
            histogram.fill(value);
        }
        histogram
    }

    /// Rebuild a histogram from persisted parts
    ///
    /// # Errors
    /// Returns error if the content length does not match the axis
    pub fn from_parts(
        name: impl Into<String>,
        title: impl Into<String>,
        axis: Axis,
        contents: Vec<f64>,
        entries: u64,
        moments: Moments,
    ) -> Result<Self> {
        if contents.len() != axis.bins() {
            return Err(Error::Storage(format!(
                "histogram has {} bins but {} contents",
                axis.bins(),
                contents.len()
            )));
        }
        Ok(Self {
            name: name.into(),
            title: title.into(),
            axis,
            contents,
            underflow: 0.0,
            overflow: 0.0,
            entries,
            moments,
        })
    }

    /// Restore persisted underflow and overflow counts
    #[must_use]
    pub const fn with_flow(mut self, underflow: f64, overflow: f64) -> Self {
        self.underflow = underflow;
        self.overflow = overflow;
        self
    }

    /// Add one unit-weight entry
    pub fn fill(&mut self, value: f64) {
        self.entries += 1;
        match self.axis.locate(value) {
            Slot::Underflow => self.underflow += 1.0,
            Slot::Overflow => self.overflow += 1.0,
            Slot::Bin(index) => {
                self.contents[index] += 1.0;
                self.moments.sum_w += 1.0;
                self.moments.sum_wx += value;
                self.moments.sum_wx2 += value * value;
            }
        }
    }

    /// Histogram name (store key)
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Histogram title (axis label)
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Binning
    #[must_use]
    pub const fn axis(&self) -> &Axis {
        &self.axis
    }

    /// Bin contents, excluding under/overflow
    #[must_use]
    pub fn contents(&self) -> &[f64] {
        &self.contents
    }

    /// Number of fills, including under/overflow
    #[must_use]
    pub const fn entries(&self) -> u64 {
        self.entries
    }

    /// Raw-value moments of in-range fills
    #[must_use]
    pub const fn moments(&self) -> Moments {
        self.moments
    }

    /// Underflow content
    #[must_use]
    pub const fn underflow(&self) -> f64 {
        self.underflow
    }

    /// Overflow content
    #[must_use]
    pub const fn overflow(&self) -> f64 {
        self.overflow
    }

    /// Sum of in-range bin contents
    #[must_use]
    pub fn integral(&self) -> f64 {
        self.contents.iter().sum()
    }

    /// Largest bin content
    #[must_use]
    pub fn max_content(&self) -> f64 {
        self.contents.iter().copied().fold(0.0, f64::max)
    }

    /// Number of bins with non-zero content
    #[must_use]
    pub fn nonempty_bins(&self) -> usize {
        self.contents.iter().filter(|&&c| c != 0.0).count()
    }

    /// `(bin center, content)` pairs
    pub fn points(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.contents
            .iter()
            .enumerate()
            .map(|(i, &c)| (self.axis.center(i), c))
    }

    /// Mean of the in-range values
    ///
    /// Falls back to bin centers when raw moments are unavailable.
    #[must_use]
    pub fn mean(&self) -> f64 {
        if self.moments.sum_w > 0.0 {
            return self.moments.sum_wx / self.moments.sum_w;
        }
        let total = self.integral();
        if total > 0.0 {
            self.points().map(|(x, c)| x * c).sum::<f64>() / total
        } else {
            0.0
        }
    }

    /// Standard deviation of the in-range values
    #[must_use]
    pub fn std_dev(&self) -> f64 {
        let mean = self.mean();
        let variance = if self.moments.sum_w > 0.0 {
            self.moments.sum_wx2 / self.moments.sum_w - mean * mean
        } else {
            let total = self.integral();
            if total > 0.0 {
                self.points()
                    .map(|(x, c)| c * (x - mean) * (x - mean))
                    .sum::<f64>()
                    / total
            } else {
                0.0
            }
        };
        variance.max(0.0).sqrt()
    }
}

/// Two-dimensional histogram, contents stored row-major by y bin
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram2D {
    name: String,
    title: String,
    x_axis: Axis,
    y_axis: Axis,
    contents: Vec<f64>,
    entries: u64,
    outside: u64,
}

impl Histogram2D {
    /// Create an empty histogram
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        title: impl Into<String>,
        x_axis: Axis,
        y_axis: Axis,
    ) -> Self {
        Self {
            name: name.into(),
            title: title.into(),
            x_axis,
            y_axis,
            contents: vec![0.0; x_axis.bins() * y_axis.bins()],
            entries: 0,
            outside: 0,
        }
    }

    /// Auto-range both axes over `(x, y)` pairs and fill with all of them
    #[must_use]
    pub fn from_pairs(
        name: impl Into<String>,
        title: impl Into<String>,
        bins: usize,
        xs: &[f64],
        ys: &[f64],
    ) -> Self {
        let mut histogram = Self::new(
            name,
            title,
            Axis::auto(bins, xs),
            Axis::auto(bins, ys),
        );
        for (&x, &y) in xs.iter().zip(ys) {
            histogram.fill(x, y);
        }
        histogram
    }

    /// Rebuild a histogram from persisted parts
    ///
    /// # Errors
    /// Returns error if the content length does not match the axes
    pub fn from_parts(
        name: impl Into<String>,
        title: impl Into<String>,
        x_axis: Axis,
        y_axis: Axis,
        contents: Vec<f64>,
        entries: u64,
    ) -> Result<Self> {
        if contents.len() != x_axis.bins() * y_axis.bins() {
            return Err(Error::Storage(format!(
                "histogram has {}x{} bins but {} contents",
                x_axis.bins(),
                y_axis.bins(),
                contents.len()
            )));
        }
        Ok(Self {
            name: name.into(),
            title: title.into(),
            x_axis,
            y_axis,
            contents,
            entries,
            outside: 0,
        })
    }

    /// Restore the persisted count of entries outside the axes
    #[must_use]
    pub const fn with_outside(mut self, outside: u64) -> Self {
        self.outside = outside;
        self
    }

    /// Add one unit-weight entry
    pub fn fill(&mut self, x: f64, y: f64) {
        self.entries += 1;
        match (self.x_axis.locate(x), self.y_axis.locate(y)) {
            (Slot::Bin(ix), Slot::Bin(iy)) => {
                self.contents[iy * self.x_axis.bins() + ix] += 1.0;
            }
            _ => self.outside += 1,
        }
    }

    /// Histogram name (store key)
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Histogram title
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// X binning
    #[must_use]
    pub const fn x_axis(&self) -> &Axis {
        &self.x_axis
    }

    /// Y binning
    #[must_use]
    pub const fn y_axis(&self) -> &Axis {
        &self.y_axis
    }

    /// Row-major contents
    #[must_use]
    pub fn contents(&self) -> &[f64] {
        &self.contents
    }

    /// Content of bin `(ix, iy)`
    #[must_use]
    pub fn content(&self, ix: usize, iy: usize) -> f64 {
        self.contents[iy * self.x_axis.bins() + ix]
    }

    /// Number of fills, including those outside both axes
    #[must_use]
    pub const fn entries(&self) -> u64 {
        self.entries
    }

    /// Entries outside either axis
    #[must_use]
    pub const fn outside(&self) -> u64 {
        self.outside
    }

    /// Sum of in-range bin contents
    #[must_use]
    pub fn integral(&self) -> f64 {
        self.contents.iter().sum()
    }

    /// Largest bin content
    #[must_use]
    pub fn max_content(&self) -> f64 {
        self.contents.iter().copied().fold(0.0, f64::max)
    }

    /// `(ix, iy, content)` for every non-empty bin
    pub fn occupied(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        let nx = self.x_axis.bins();
        self.contents
            .iter()
            .enumerate()
            .filter(|(_, &c)| c > 0.0)
            .map(move |(i, &c)| (i % nx, i / nx, c))
    }
}
