//! Tabular dataset and backing store (Arrow/Parquet)
//!
//! **Append-Only Design**:
//! - The dataset is materialized once from the simulator export and never
//!   mutated row by row
//! - Write pattern: whole batches in, whole files out
//! - Histograms derived from the dataset live in a separate
//!   [`HistogramStore`] with a single writer
//!
//! The schema is fixed: `n` (Int32) followed by the eight physical
//! quantities `tof x y z vx vy vz ke` (Float64).

mod store;
mod text;

pub use store::{HistogramStore, StoredObject};
pub use text::{read_text_export, ROWS_PER_BATCH};

use crate::histogram::{Histogram1D, Histogram2D, BINS_1D, BINS_2D};
use crate::selection::Selection;
use crate::{Error, Result};
use arrow::array::{Array, Float64Array};
use arrow::compute;
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use std::path::Path;
use std::sync::Arc;

/// Table name of the materialized dataset
pub const TREE_NAME: &str = "T";

/// Per-particle index column
pub const INDEX_COLUMN: &str = "n";

/// Physical quantity columns, in export order
pub const VALUE_COLUMNS: [&str; 8] = ["tof", "x", "y", "z", "vx", "vy", "vz", "ke"];

/// Schema of a materialized simulator export
#[must_use]
pub fn trajectory_schema() -> SchemaRef {
    let mut fields = Vec::with_capacity(VALUE_COLUMNS.len() + 1);
    fields.push(Field::new(INDEX_COLUMN, DataType::Int32, false));
    fields.extend(
        VALUE_COLUMNS
            .iter()
            .map(|name| Field::new(*name, DataType::Float64, false)),
    );
    Arc::new(Schema::new(fields))
}

/// Which rows a histogram draw reads
///
/// Mirrors the classic tree-draw contract: start at `first_entry`, read at
/// most `max_entries` rows in file order, then apply the selection to those
/// rows. No sampling is random.
#[derive(Debug, Clone, Default)]
pub struct DrawOptions {
    /// Maximum number of rows read (None = all)
    pub max_entries: Option<usize>,
    /// First row read
    pub first_entry: usize,
    /// Optional row filter
    pub selection: Option<Selection>,
}

impl DrawOptions {
    /// Read the first `max_entries` rows, no selection
    #[must_use]
    pub const fn first(max_entries: usize) -> Self {
        Self {
            max_entries: Some(max_entries),
            first_entry: 0,
            selection: None,
        }
    }

    /// Start at a later row
    #[must_use]
    pub const fn starting_at(mut self, first_entry: usize) -> Self {
        self.first_entry = first_entry;
        self
    }

    /// Keep only rows matching `selection`
    #[must_use]
    pub fn with_selection(mut self, selection: Selection) -> Self {
        self.selection = Some(selection);
        self
    }
}

/// Materialized simulator export
#[derive(Debug, Clone)]
pub struct Dataset {
    schema: SchemaRef,
    batches: Vec<RecordBatch>,
}

impl Dataset {
    /// Create a dataset from existing batches
    ///
    /// Useful for testing and benchmarking. An empty batch list gets the
    /// trajectory schema.
    ///
    /// # Errors
    /// Returns error if the batches do not share one schema
    pub fn new(batches: Vec<RecordBatch>) -> Result<Self> {
        let schema = batches
            .first()
            .map_or_else(trajectory_schema, RecordBatch::schema);
        let mut dataset = Self {
            schema,
            batches: Vec::with_capacity(batches.len()),
        };
        for batch in batches {
            dataset.append_batch(batch)?;
        }
        Ok(dataset)
    }

    /// Materialize a header-stripped text export
    ///
    /// # Errors
    /// Returns error if the file cannot be read or a row is malformed
    pub fn from_text_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        let batches = read_text_export(std::io::BufReader::new(file))?;
        Self::new(batches)
    }

    /// Load a dataset previously written with [`Dataset::write_parquet`]
    ///
    /// # Errors
    /// Returns error if file cannot be read or parsed
    pub fn load_parquet<P: AsRef<Path>>(path: P) -> Result<Self> {
        use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

        let file = std::fs::File::open(path.as_ref())
            .map_err(|e| Error::Storage(format!("Failed to open Parquet file: {e}")))?;

        let builder = ParquetRecordBatchReaderBuilder::try_new(file)
            .map_err(|e| Error::Storage(format!("Failed to parse Parquet file: {e}")))?;

        let reader = builder
            .build()
            .map_err(|e| Error::Storage(format!("Failed to create Parquet reader: {e}")))?;

        let mut batches = Vec::new();
        for batch in reader {
            let batch = batch
                .map_err(|e| Error::Storage(format!("Failed to read record batch: {e}")))?;
            batches.push(batch);
        }

        Self::new(batches)
    }

    /// Persist the dataset as a Parquet file
    ///
    /// # Errors
    /// Returns error if the file cannot be created or written
    pub fn write_parquet<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        use parquet::arrow::ArrowWriter;

        let file = std::fs::File::create(path.as_ref())?;
        let mut writer = ArrowWriter::try_new(file, self.schema.clone(), None)
            .map_err(|e| Error::Storage(format!("Failed to create Parquet writer: {e}")))?;
        for batch in &self.batches {
            writer
                .write(batch)
                .map_err(|e| Error::Storage(format!("Failed to write record batch: {e}")))?;
        }
        writer
            .close()
            .map_err(|e| Error::Storage(format!("Failed to finish Parquet file: {e}")))?;
        Ok(())
    }

    /// Append a batch (the only supported write)
    ///
    /// # Errors
    ///
    /// Returns error if batch schema doesn't match the dataset
    pub fn append_batch(&mut self, batch: RecordBatch) -> Result<()> {
        if batch.schema() != self.schema {
            return Err(Error::Storage(format!(
                "Schema mismatch: expected {:?}, got {:?}",
                self.schema,
                batch.schema()
            )));
        }
        self.batches.push(batch);
        Ok(())
    }

    /// Get all record batches
    #[must_use]
    pub fn batches(&self) -> &[RecordBatch] {
        &self.batches
    }

    /// Dataset schema
    #[must_use]
    pub fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    /// Total number of rows
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(RecordBatch::num_rows).sum()
    }

    /// Column names in schema order
    #[must_use]
    pub fn column_names(&self) -> Vec<String> {
        self.schema
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect()
    }

    /// Check that a column exists
    ///
    /// # Errors
    /// Returns [`Error::Schema`] naming the available columns
    pub fn require_column(&self, name: &str) -> Result<()> {
        if self.schema.index_of(name).is_ok() {
            Ok(())
        } else {
            Err(Error::schema(name, &self.column_names()))
        }
    }

    /// Read the drawn rows of several columns as `f64`
    ///
    /// Every returned vector has the same length; null cells read as NaN.
    ///
    /// # Errors
    /// Returns error if a column is missing, not numeric, or the selection
    /// cannot be evaluated
    pub fn draw_columns(&self, columns: &[&str], options: &DrawOptions) -> Result<Vec<Vec<f64>>> {
        for column in columns {
            self.require_column(column)?;
        }

        let window = self.window(options)?;
        let window = match &options.selection {
            Some(selection) => {
                let mask = selection.evaluate(&window)?;
                compute::filter_record_batch(&window, &mask)
                    .map_err(|e| Error::Storage(format!("Failed to apply selection: {e}")))?
            }
            None => window,
        };

        columns
            .iter()
            .map(|name| column_as_f64(&window, name))
            .collect()
    }

    /// Draw a 1D histogram of `variable`, named `<variable>_new`
    ///
    /// # Errors
    /// Returns [`Error::Schema`] if the variable is not a column
    pub fn draw_1d(&self, variable: &str, options: &DrawOptions) -> Result<Histogram1D> {
        let mut drawn = self.draw_columns(&[variable], options)?;
        let values = drawn.pop().unwrap_or_default();
        Ok(Histogram1D::from_values(
            format!("{variable}_new"),
            variable,
            BINS_1D,
            &values,
        ))
    }

    /// Draw a 2D histogram of `y` against `x`, named `<x>_<y>`
    ///
    /// # Errors
    /// Returns [`Error::Schema`] if either variable is not a column
    pub fn draw_2d(&self, x: &str, y: &str, options: &DrawOptions) -> Result<Histogram2D> {
        let drawn = self.draw_columns(&[x, y], options)?;
        Ok(Histogram2D::from_pairs(
            format!("{x}_{y}"),
            format!("{y}:{x}"),
            BINS_2D,
            &drawn[0],
            &drawn[1],
        ))
    }

    /// Slices of the batches overlapping rows
    /// `[first_entry, first_entry + max_entries)`, in row order
    fn window_slices(&self, options: &DrawOptions) -> Vec<RecordBatch> {
        let rows = self.num_rows();
        let start = options.first_entry.min(rows);
        let end = options
            .max_entries
            .map_or(rows, |max| start.saturating_add(max).min(rows));

        let mut slices = Vec::new();
        let mut offset = 0;
        for batch in &self.batches {
            if offset >= end {
                break;
            }
            let batch_end = offset + batch.num_rows();
            if batch_end > start {
                let from = start.max(offset) - offset;
                let to = end.min(batch_end) - offset;
                slices.push(batch.slice(from, to - from));
            }
            offset = batch_end;
        }
        slices
    }

    /// The drawn row window as one batch; only the overlapping slices are
    /// copied
    fn window(&self, options: &DrawOptions) -> Result<RecordBatch> {
        let mut slices = self.window_slices(options);
        match slices.len() {
            0 => Ok(RecordBatch::new_empty(self.schema.clone())),
            1 => Ok(slices.swap_remove(0)),
            _ => compute::concat_batches(&self.schema, &slices)
                .map_err(|e| Error::Storage(format!("Failed to combine batches: {e}"))),
        }
    }
}

/// Cast a numeric column to `f64` values
pub(crate) fn column_as_f64(batch: &RecordBatch, name: &str) -> Result<Vec<f64>> {
    let schema = batch.schema();
    let index = schema.index_of(name).map_err(|_| {
        let available: Vec<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();
        Error::schema(name, &available)
    })?;
    let column = batch.column(index);
    if !column.data_type().is_numeric() {
        return Err(Error::Schema {
            column: name.to_string(),
            available: vec![format!("{name} is {:?}, not numeric", column.data_type())],
        });
    }
    let cast = compute::cast(column.as_ref(), &DataType::Float64)?;
    let array = cast
        .as_any()
        .downcast_ref::<Float64Array>()
        .ok_or_else(|| Error::Storage(format!("Failed to downcast {name} to Float64Array")))?;
    Ok((0..array.len())
        .map(|i| if array.is_null(i) { f64::NAN } else { array.value(i) })
        .collect())
}
