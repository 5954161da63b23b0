//! Reader for the header-stripped simulator text export
//!
//! One row per line, nine whitespace-separated numbers in schema order.
//! Blank lines and lines starting with `#` are skipped.

use super::{trajectory_schema, VALUE_COLUMNS};
use crate::{Error, Result};
use arrow::array::{ArrayRef, Float64Array, Int32Array};
use arrow::record_batch::RecordBatch;
use std::io::BufRead;
use std::sync::Arc;

/// Rows per materialized batch
pub const ROWS_PER_BATCH: usize = 65_536;

const FIELDS_PER_ROW: usize = VALUE_COLUMNS.len() + 1;

/// Column buffers for the batch being built
struct BatchBuilder {
    index: Vec<i32>,
    values: Vec<Vec<f64>>,
}

impl BatchBuilder {
    fn new() -> Self {
        Self {
            index: Vec::with_capacity(ROWS_PER_BATCH),
            values: vec![Vec::with_capacity(ROWS_PER_BATCH); VALUE_COLUMNS.len()],
        }
    }

    fn len(&self) -> usize {
        self.index.len()
    }

    fn push_row(&mut self, line: usize, text: &str) -> Result<()> {
        let fields: Vec<&str> = text.split_whitespace().collect();
        if fields.len() != FIELDS_PER_ROW {
            return Err(Error::Parse {
                line,
                message: format!(
                    "expected {FIELDS_PER_ROW} fields, found {}",
                    fields.len()
                ),
            });
        }

        self.index.push(parse_index(line, fields[0])?);
        for (column, field) in self.values.iter_mut().zip(&fields[1..]) {
            let value: f64 = field.parse().map_err(|_| Error::Parse {
                line,
                message: format!("invalid number '{field}'"),
            })?;
            column.push(value);
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<RecordBatch> {
        let mut columns: Vec<ArrayRef> = Vec::with_capacity(FIELDS_PER_ROW);
        columns.push(Arc::new(Int32Array::from(std::mem::take(&mut self.index))));
        for column in &mut self.values {
            columns.push(Arc::new(Float64Array::from(std::mem::take(column))));
        }
        Ok(RecordBatch::try_new(trajectory_schema(), columns)?)
    }
}

/// Particle indices are integers, but some exports write them as `12.0`
#[allow(clippy::cast_possible_truncation)]
fn parse_index(line: usize, field: &str) -> Result<i32> {
    if let Ok(index) = field.parse::<i32>() {
        return Ok(index);
    }
    match field.parse::<f64>() {
        Ok(value)
            if value.fract() == 0.0
                && value >= f64::from(i32::MIN)
                && value <= f64::from(i32::MAX) =>
        {
            Ok(value as i32)
        }
        _ => Err(Error::Parse {
            line,
            message: format!("invalid particle index '{field}'"),
        }),
    }
}

/// Materialize a text export into record batches
///
/// Comment lines are skipped before decoding, so they may hold bytes that
/// are not UTF-8.
///
/// # Errors
/// Returns [`Error::Parse`] with the 1-based line number of the first
/// malformed row, or [`Error::Io`] if reading fails
pub fn read_text_export<R: BufRead>(mut reader: R) -> Result<Vec<RecordBatch>> {
    let mut batches = Vec::new();
    let mut builder = BatchBuilder::new();
    let mut raw = Vec::new();
    let mut number = 0;

    loop {
        raw.clear();
        if reader.read_until(b'\n', &mut raw)? == 0 {
            break;
        }
        number += 1;

        let start = raw
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .unwrap_or(raw.len());
        let bytes = &raw[start..];
        if bytes.is_empty() || bytes[0] == b'#' {
            continue;
        }

        let text = std::str::from_utf8(bytes).map_err(|_| Error::Parse {
            line: number,
            message: "row is not valid UTF-8".to_string(),
        })?;
        builder.push_row(number, text.trim_end())?;
        if builder.len() == ROWS_PER_BATCH {
            batches.push(builder.finish()?);
        }
    }

    if builder.len() > 0 {
        batches.push(builder.finish()?);
    }

    tracing::debug!(
        batches = batches.len(),
        rows = batches.iter().map(RecordBatch::num_rows).sum::<usize>(),
        "materialized text export"
    );
    Ok(batches)
}
