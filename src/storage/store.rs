//! Histogram backing store
//!
//! Every derived histogram of a run is kept by name and written to a single
//! Parquet file in long format (one row per bin). Persisting an object
//! replaces any object of the same name and rewrites the file through a
//! temporary sibling, so a failed write never damages what was already on
//! disk.

use crate::histogram::{Axis, Histogram1D, Histogram2D, Moments};
use crate::{Error, Result};
use arrow::array::{
    Array, ArrayRef, Float64Array, RecordBatch, StringArray, UInt32Array, UInt64Array, UInt8Array,
};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// An object held by the store
#[derive(Debug, Clone, PartialEq)]
pub enum StoredObject {
    /// One-dimensional histogram
    Hist1D(Histogram1D),
    /// Two-dimensional histogram
    Hist2D(Histogram2D),
}

impl StoredObject {
    /// Object name (store key)
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Hist1D(h) => h.name(),
            Self::Hist2D(h) => h.name(),
        }
    }
}

impl From<Histogram1D> for StoredObject {
    fn from(h: Histogram1D) -> Self {
        Self::Hist1D(h)
    }
}

impl From<Histogram2D> for StoredObject {
    fn from(h: Histogram2D) -> Self {
        Self::Hist2D(h)
    }
}

fn store_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("name", DataType::Utf8, false),
        Field::new("title", DataType::Utf8, false),
        Field::new("dims", DataType::UInt8, false),
        Field::new("x_bins", DataType::UInt32, false),
        Field::new("x_low", DataType::Float64, false),
        Field::new("x_high", DataType::Float64, false),
        Field::new("y_bins", DataType::UInt32, false),
        Field::new("y_low", DataType::Float64, false),
        Field::new("y_high", DataType::Float64, false),
        Field::new("entries", DataType::UInt64, false),
        Field::new("sum_w", DataType::Float64, false),
        Field::new("sum_wx", DataType::Float64, false),
        Field::new("sum_wx2", DataType::Float64, false),
        Field::new("underflow", DataType::Float64, false),
        Field::new("overflow", DataType::Float64, false),
        Field::new("outside", DataType::UInt64, false),
        Field::new("bin", DataType::UInt32, false),
        Field::new("content", DataType::Float64, false),
    ]))
}

/// Entries that fell outside the binned range
#[derive(Debug, Clone, Copy, Default)]
struct Flow {
    underflow: f64,
    overflow: f64,
    outside: u64,
}

/// Column buffers for the long-format table
#[derive(Default)]
struct Rows {
    name: Vec<String>,
    title: Vec<String>,
    dims: Vec<u8>,
    x_bins: Vec<u32>,
    x_low: Vec<f64>,
    x_high: Vec<f64>,
    y_bins: Vec<u32>,
    y_low: Vec<f64>,
    y_high: Vec<f64>,
    entries: Vec<u64>,
    sum_w: Vec<f64>,
    sum_wx: Vec<f64>,
    sum_wx2: Vec<f64>,
    underflow: Vec<f64>,
    overflow: Vec<f64>,
    outside: Vec<u64>,
    bin: Vec<u32>,
    content: Vec<f64>,
}

impl Rows {
    #[allow(clippy::too_many_arguments)]
    fn push_object(
        &mut self,
        name: &str,
        title: &str,
        x: &Axis,
        y: Option<&Axis>,
        entries: u64,
        moments: Moments,
        flow: Flow,
        contents: &[f64],
    ) -> Result<()> {
        let bins_u32 = |axis: &Axis| {
            u32::try_from(axis.bins())
                .map_err(|_| Error::Storage(format!("{name}: too many bins to store")))
        };
        let x_bins = bins_u32(x)?;
        let y_bins = y.map(bins_u32).transpose()?.unwrap_or(0);

        for (index, &content) in contents.iter().enumerate() {
            self.name.push(name.to_string());
            self.title.push(title.to_string());
            self.dims.push(if y.is_some() { 2 } else { 1 });
            self.x_bins.push(x_bins);
            self.x_low.push(x.low());
            self.x_high.push(x.high());
            self.y_bins.push(y_bins);
            self.y_low.push(y.map_or(0.0, Axis::low));
            self.y_high.push(y.map_or(0.0, Axis::high));
            self.entries.push(entries);
            self.sum_w.push(moments.sum_w);
            self.sum_wx.push(moments.sum_wx);
            self.sum_wx2.push(moments.sum_wx2);
            self.underflow.push(flow.underflow);
            self.overflow.push(flow.overflow);
            self.outside.push(flow.outside);
            self.bin.push(
                u32::try_from(index)
                    .map_err(|_| Error::Storage(format!("{name}: bin index overflow")))?,
            );
            self.content.push(content);
        }
        Ok(())
    }

    fn into_batch(self) -> Result<RecordBatch> {
        let columns: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from(self.name)),
            Arc::new(StringArray::from(self.title)),
            Arc::new(UInt8Array::from(self.dims)),
            Arc::new(UInt32Array::from(self.x_bins)),
            Arc::new(Float64Array::from(self.x_low)),
            Arc::new(Float64Array::from(self.x_high)),
            Arc::new(UInt32Array::from(self.y_bins)),
            Arc::new(Float64Array::from(self.y_low)),
            Arc::new(Float64Array::from(self.y_high)),
            Arc::new(UInt64Array::from(self.entries)),
            Arc::new(Float64Array::from(self.sum_w)),
            Arc::new(Float64Array::from(self.sum_wx)),
            Arc::new(Float64Array::from(self.sum_wx2)),
            Arc::new(Float64Array::from(self.underflow)),
            Arc::new(Float64Array::from(self.overflow)),
            Arc::new(UInt64Array::from(self.outside)),
            Arc::new(UInt32Array::from(self.bin)),
            Arc::new(Float64Array::from(self.content)),
        ];
        Ok(RecordBatch::try_new(store_schema(), columns)?)
    }
}

/// Persistent, name-keyed store of derived histograms
#[derive(Debug)]
pub struct HistogramStore {
    path: PathBuf,
    objects: BTreeMap<String, StoredObject>,
}

impl HistogramStore {
    /// Open the store at `path`, loading existing objects (update mode)
    ///
    /// # Errors
    /// Returns error if an existing file cannot be read or decoded
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let objects = if path.exists() {
            load_objects(&path)?
        } else {
            BTreeMap::new()
        };
        tracing::debug!(path = %path.display(), objects = objects.len(), "opened histogram store");
        Ok(Self { path, objects })
    }

    /// Location of the backing file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of stored objects
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Check if the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Names of stored objects, sorted
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.objects.keys().map(String::as_str)
    }

    /// Retrieve an object by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&StoredObject> {
        self.objects.get(name)
    }

    /// Retrieve a 1D histogram by name
    #[must_use]
    pub fn histogram_1d(&self, name: &str) -> Option<&Histogram1D> {
        match self.objects.get(name) {
            Some(StoredObject::Hist1D(h)) => Some(h),
            _ => None,
        }
    }

    /// Retrieve a 2D histogram by name
    #[must_use]
    pub fn histogram_2d(&self, name: &str) -> Option<&Histogram2D> {
        match self.objects.get(name) {
            Some(StoredObject::Hist2D(h)) => Some(h),
            _ => None,
        }
    }

    /// Store an object (replacing any of the same name) and flush
    ///
    /// # Errors
    /// Returns error if the backing file cannot be written
    pub fn persist(&mut self, object: impl Into<StoredObject>) -> Result<()> {
        let object = object.into();
        let name = object.name().to_string();
        if self.objects.insert(name.clone(), object).is_some() {
            tracing::debug!(%name, "replaced stored object");
        }
        self.flush()
    }

    /// Write every stored object to the backing file
    ///
    /// # Errors
    /// Returns error if encoding or writing fails
    pub fn flush(&self) -> Result<()> {
        use parquet::arrow::ArrowWriter;

        let mut rows = Rows::default();
        for object in self.objects.values() {
            match object {
                StoredObject::Hist1D(h) => rows.push_object(
                    h.name(),
                    h.title(),
                    h.axis(),
                    None,
                    h.entries(),
                    h.moments(),
                    Flow {
                        underflow: h.underflow(),
                        overflow: h.overflow(),
                        outside: 0,
                    },
                    h.contents(),
                )?,
                StoredObject::Hist2D(h) => rows.push_object(
                    h.name(),
                    h.title(),
                    h.x_axis(),
                    Some(h.y_axis()),
                    h.entries(),
                    Moments::default(),
                    Flow {
                        outside: h.outside(),
                        ..Flow::default()
                    },
                    h.contents(),
                )?,
            }
        }
        let batch = rows.into_batch()?;

        let mut staging = self.path.clone().into_os_string();
        staging.push(".tmp");
        let staging = PathBuf::from(staging);

        let file = std::fs::File::create(&staging)?;
        let mut writer = ArrowWriter::try_new(file, store_schema(), None)
            .map_err(|e| Error::Storage(format!("Failed to create Parquet writer: {e}")))?;
        writer
            .write(&batch)
            .map_err(|e| Error::Storage(format!("Failed to write histograms: {e}")))?;
        writer
            .close()
            .map_err(|e| Error::Storage(format!("Failed to finish Parquet file: {e}")))?;
        std::fs::rename(&staging, &self.path)?;
        Ok(())
    }
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .ok_or_else(|| Error::Storage(format!("histogram store: bad or missing column '{name}'")))
}

/// Object assembled from consecutive rows sharing a name
struct Pending {
    name: String,
    title: String,
    dims: u8,
    x: (u32, f64, f64),
    y: (u32, f64, f64),
    entries: u64,
    moments: Moments,
    flow: Flow,
    contents: Vec<(u32, f64)>,
}

impl Pending {
    fn finish(self) -> Result<StoredObject> {
        let x_axis = Axis::new(self.x.0 as usize, self.x.1, self.x.2)?;
        let mut contents = vec![0.0; match self.dims {
            2 => self.x.0 as usize * self.y.0 as usize,
            _ => self.x.0 as usize,
        }];
        for (bin, content) in self.contents {
            let slot = contents.get_mut(bin as usize).ok_or_else(|| {
                Error::Storage(format!("{}: bin {bin} out of range", self.name))
            })?;
            *slot = content;
        }
        match self.dims {
            1 => Ok(StoredObject::Hist1D(Histogram1D::from_parts(
                self.name,
                self.title,
                x_axis,
                contents,
                self.entries,
                self.moments,
            )?
            .with_flow(self.flow.underflow, self.flow.overflow))),
            2 => {
                let y_axis = Axis::new(self.y.0 as usize, self.y.1, self.y.2)?;
                Ok(StoredObject::Hist2D(Histogram2D::from_parts(
                    self.name,
                    self.title,
                    x_axis,
                    y_axis,
                    contents,
                    self.entries,
                )?
                .with_outside(self.flow.outside)))
            }
            other => Err(Error::Storage(format!(
                "{}: unsupported dimension {other}",
                self.name
            ))),
        }
    }
}

fn load_objects(path: &Path) -> Result<BTreeMap<String, StoredObject>> {
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

    let file = std::fs::File::open(path)
        .map_err(|e| Error::Storage(format!("Failed to open histogram store: {e}")))?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)
        .and_then(|builder| builder.build())
        .map_err(|e| Error::Storage(format!("Failed to read histogram store: {e}")))?;

    let mut objects = BTreeMap::new();
    let mut pending: Option<Pending> = None;

    for batch in reader {
        let batch =
            batch.map_err(|e| Error::Storage(format!("Failed to read record batch: {e}")))?;
        let name = column::<StringArray>(&batch, "name")?;
        let title = column::<StringArray>(&batch, "title")?;
        let dims = column::<UInt8Array>(&batch, "dims")?;
        let x_bins = column::<UInt32Array>(&batch, "x_bins")?;
        let x_low = column::<Float64Array>(&batch, "x_low")?;
        let x_high = column::<Float64Array>(&batch, "x_high")?;
        let y_bins = column::<UInt32Array>(&batch, "y_bins")?;
        let y_low = column::<Float64Array>(&batch, "y_low")?;
        let y_high = column::<Float64Array>(&batch, "y_high")?;
        let entries = column::<UInt64Array>(&batch, "entries")?;
        let sum_w = column::<Float64Array>(&batch, "sum_w")?;
        let sum_wx = column::<Float64Array>(&batch, "sum_wx")?;
        let sum_wx2 = column::<Float64Array>(&batch, "sum_wx2")?;
        let underflow = column::<Float64Array>(&batch, "underflow")?;
        let overflow = column::<Float64Array>(&batch, "overflow")?;
        let outside = column::<UInt64Array>(&batch, "outside")?;
        let bin = column::<UInt32Array>(&batch, "bin")?;
        let content = column::<Float64Array>(&batch, "content")?;

        for row in 0..batch.num_rows() {
            let row_name = name.value(row);
            if pending.as_ref().map_or(true, |p| p.name != row_name) {
                if let Some(done) = pending.take() {
                    let object = done.finish()?;
                    objects.insert(object.name().to_string(), object);
                }
                pending = Some(Pending {
                    name: row_name.to_string(),
                    title: title.value(row).to_string(),
                    dims: dims.value(row),
                    x: (x_bins.value(row), x_low.value(row), x_high.value(row)),
                    y: (y_bins.value(row), y_low.value(row), y_high.value(row)),
                    entries: entries.value(row),
                    moments: Moments {
                        sum_w: sum_w.value(row),
                        sum_wx: sum_wx.value(row),
                        sum_wx2: sum_wx2.value(row),
                    },
                    flow: Flow {
                        underflow: underflow.value(row),
                        overflow: overflow.value(row),
                        outside: outside.value(row),
                    },
                    contents: Vec::new(),
                });
            }
            if let Some(p) = pending.as_mut() {
                p.contents.push((bin.value(row), content.value(row)));
            }
        }
    }

    if let Some(done) = pending.take() {
        let object = done.finish()?;
        objects.insert(object.name().to_string(), object);
    }

    Ok(objects)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "simchar_store_{tag}_{}.parquet",
            std::process::id()
        ))
    }

    fn sample_1d(name: &str) -> Histogram1D {
        let values: Vec<f64> = (0..50_i32).map(|i| f64::from(i % 7)).collect();
        Histogram1D::from_values(name, "v", 7, &values)
    }

    fn sample_2d() -> Histogram2D {
        let xs: Vec<f64> = (0..30_i32).map(f64::from).collect();
        let ys: Vec<f64> = (0..30_i32).map(|i| f64::from(i * i)).collect();
        Histogram2D::from_pairs("x_vx", "vx:x", 5, &xs, &ys)
    }

    #[test]
    fn test_persist_and_reload() {
        let path = temp_store("reload");
        std::fs::remove_file(&path).ok();

        let mut store = HistogramStore::open(&path).unwrap();
        assert!(store.is_empty());
        store.persist(sample_1d("tof_new")).unwrap();
        store.persist(sample_2d()).unwrap();
        assert_eq!(store.len(), 2);

        let reopened = HistogramStore::open(&path).unwrap();
        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.names().collect::<Vec<_>>(), vec!["tof_new", "x_vx"]);

        let h1 = reopened.histogram_1d("tof_new").unwrap();
        assert_eq!(h1, &sample_1d("tof_new"));
        let h2 = reopened.histogram_2d("x_vx").unwrap();
        assert_eq!(h2.entries(), 30);
        assert!((h2.integral() - 30.0).abs() < f64::EPSILON);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_reload_keeps_out_of_range_counts() {
        let path = temp_store("flow");
        std::fs::remove_file(&path).ok();

        let mut h1 = Histogram1D::new("ke_new", "ke", Axis::new(4, 0.0, 4.0).unwrap());
        for value in [-1.0, -2.0, 0.5, 9.0] {
            h1.fill(value);
        }
        let mut h2 = Histogram2D::new(
            "x_vx",
            "vx:x",
            Axis::new(2, 0.0, 2.0).unwrap(),
            Axis::new(2, 0.0, 2.0).unwrap(),
        );
        for (x, y) in [(0.5, 0.5), (5.0, 0.5), (0.5, -3.0)] {
            h2.fill(x, y);
        }

        let mut store = HistogramStore::open(&path).unwrap();
        store.persist(h1.clone()).unwrap();
        store.persist(h2.clone()).unwrap();

        let reopened = HistogramStore::open(&path).unwrap();
        let back1 = reopened.histogram_1d("ke_new").unwrap();
        assert!((back1.underflow() - 2.0).abs() < f64::EPSILON);
        assert!((back1.overflow() - 1.0).abs() < f64::EPSILON);
        assert_eq!(back1, &h1);
        let back2 = reopened.histogram_2d("x_vx").unwrap();
        assert_eq!(back2.outside(), 2);
        assert_eq!(back2, &h2);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_persist_replaces_same_name() {
        let path = temp_store("replace");
        std::fs::remove_file(&path).ok();

        let mut store = HistogramStore::open(&path).unwrap();
        store.persist(sample_1d("ke_new")).unwrap();
        let replacement = Histogram1D::from_values("ke_new", "ke", 3, &[1.0, 2.0]);
        store.persist(replacement).unwrap();

        let reopened = HistogramStore::open(&path).unwrap();
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.histogram_1d("ke_new").unwrap().entries(), 2);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_typed_lookup_mismatch() {
        let path = temp_store("typed");
        std::fs::remove_file(&path).ok();

        let mut store = HistogramStore::open(&path).unwrap();
        store.persist(sample_2d()).unwrap();
        assert!(store.histogram_1d("x_vx").is_none());
        assert!(store.histogram_2d("x_vx").is_some());
        assert!(store.get("missing").is_none());

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_unwritable_store_is_error() {
        let path = std::env::temp_dir()
            .join("simchar_no_such_dir_for_store")
            .join("deeper")
            .join("h.parquet");
        let mut store = HistogramStore::open(&path).unwrap();
        assert!(store.persist(sample_1d("a")).is_err());
    }
}
