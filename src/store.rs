use std::cell::Cell;
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, Float32Array, Float64Array, Float64Builder, LargeListArray, ListArray,
    ListBuilder,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::{ParquetRecordBatchReaderBuilder, RowSelection, RowSelector};
use parquet::arrow::{ArrowWriter, ProjectionMask};

use crate::data::model::{FrequencySeries, TimeSegment};
use crate::error::{PsdError, Result};

/// Schema metadata key holding the detector name.
pub const DETECTOR_KEY: &str = "detector";
/// Schema metadata key holding the store-wide low-frequency cutoff (Hz).
pub const LOW_FREQUENCY_CUTOFF_KEY: &str = "low_frequency_cutoff";

const START_TIME: &str = "start_time";
const END_TIME: &str = "end_time";
const DELTA_F: &str = "delta_f";
const PSD: &str = "psd";

// ---------------------------------------------------------------------------
// Store interface
// ---------------------------------------------------------------------------

/// A collection of precomputed PSDs for one detector, each valid over a
/// GPS time interval and addressed by its index.
///
/// Interval metadata is held in memory; PSD payloads are fetched on every
/// [`PsdStore::load_psd`] call.
pub trait PsdStore {
    fn detector(&self) -> &str;
    fn start_times(&self) -> &[f64];
    fn end_times(&self) -> &[f64];
    /// Frequency below which the stored PSDs were never validated.
    fn low_frequency_cutoff(&self) -> f64;
    fn load_psd(&self, index: usize) -> Result<FrequencySeries>;

    fn len(&self) -> usize {
        self.start_times().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Validity interval of entry `index`.
    fn segment(&self, index: usize) -> TimeSegment {
        TimeSegment::new(self.start_times()[index], self.end_times()[index])
    }
}

/// One precomputed PSD with its validity interval.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreEntry {
    pub segment: TimeSegment,
    pub psd: FrequencySeries,
}

fn check_index(index: usize, len: usize) -> Result<()> {
    if index >= len {
        return Err(PsdError::Store(format!(
            "PSD index {index} out of range for a store of {len} entries"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// A [`PsdStore`] kept entirely in memory.
#[derive(Debug)]
pub struct MemoryPsdStore {
    detector: String,
    low_frequency_cutoff: f64,
    start_times: Vec<f64>,
    end_times: Vec<f64>,
    psds: Vec<FrequencySeries>,
    loads: Cell<usize>,
}

impl MemoryPsdStore {
    pub fn new(detector: &str, low_frequency_cutoff: f64, entries: Vec<StoreEntry>) -> Self {
        let (segments, psds): (Vec<_>, Vec<_>) =
            entries.into_iter().map(|e| (e.segment, e.psd)).unzip();
        MemoryPsdStore {
            detector: detector.to_string(),
            low_frequency_cutoff,
            start_times: segments.iter().map(|s| s.start).collect(),
            end_times: segments.iter().map(|s| s.end).collect(),
            psds,
            loads: Cell::new(0),
        }
    }

    /// Number of [`PsdStore::load_psd`] calls served so far.
    pub fn loads(&self) -> usize {
        self.loads.get()
    }
}

impl PsdStore for MemoryPsdStore {
    fn detector(&self) -> &str {
        &self.detector
    }

    fn start_times(&self) -> &[f64] {
        &self.start_times
    }

    fn end_times(&self) -> &[f64] {
        &self.end_times
    }

    fn low_frequency_cutoff(&self) -> f64 {
        self.low_frequency_cutoff
    }

    fn load_psd(&self, index: usize) -> Result<FrequencySeries> {
        check_index(index, self.psds.len())?;
        self.loads.set(self.loads.get() + 1);
        Ok(self.psds[index].clone())
    }
}

// ---------------------------------------------------------------------------
// Parquet store
// ---------------------------------------------------------------------------

/// A [`PsdStore`] backed by a Parquet file.
///
/// Expected layout, one row per PSD:
/// - `start_time`, `end_time`: Float64 GPS seconds
/// - `delta_f`: Float64 bin spacing (Hz)
/// - `psd`: List<Float64> (or LargeList / Float32) bin values
///
/// and schema metadata `detector` and `low_frequency_cutoff`.
#[derive(Debug, Clone)]
pub struct ParquetPsdStore {
    path: PathBuf,
    detector: String,
    low_frequency_cutoff: f64,
    start_times: Vec<f64>,
    end_times: Vec<f64>,
}

impl ParquetPsdStore {
    /// Read the store metadata and validity intervals. PSD payloads are not
    /// touched until [`PsdStore::load_psd`].
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;

        let metadata = builder.schema().metadata();
        let detector = metadata
            .get(DETECTOR_KEY)
            .ok_or_else(|| missing_key(DETECTOR_KEY))?
            .clone();
        let low_frequency_cutoff = metadata
            .get(LOW_FREQUENCY_CUTOFF_KEY)
            .ok_or_else(|| missing_key(LOW_FREQUENCY_CUTOFF_KEY))?
            .parse::<f64>()
            .map_err(|_| PsdError::Store(format!("'{LOW_FREQUENCY_CUTOFF_KEY}' is not a number")))?;

        let mask = projection(&builder, &[START_TIME, END_TIME])?;
        let reader = builder.with_projection(mask).build()?;

        let mut start_times = Vec::new();
        let mut end_times = Vec::new();
        for batch in reader {
            let batch = batch?;
            start_times.extend(f64_column(&batch, START_TIME)?);
            end_times.extend(f64_column(&batch, END_TIME)?);
        }

        log::info!(
            "Opened PSD store {} for {detector}: {} entries, \
             low-frequency cutoff {low_frequency_cutoff} Hz",
            path.display(),
            start_times.len()
        );

        Ok(ParquetPsdStore {
            path: path.to_path_buf(),
            detector,
            low_frequency_cutoff,
            start_times,
            end_times,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PsdStore for ParquetPsdStore {
    fn detector(&self) -> &str {
        &self.detector
    }

    fn start_times(&self) -> &[f64] {
        &self.start_times
    }

    fn end_times(&self) -> &[f64] {
        &self.end_times
    }

    fn low_frequency_cutoff(&self) -> f64 {
        self.low_frequency_cutoff
    }

    /// Reopen the file and read the single row `index`.
    fn load_psd(&self, index: usize) -> Result<FrequencySeries> {
        check_index(index, self.start_times.len())?;
        log::debug!("Loading PSD {index} of {} from {}", self.detector, self.path.display());

        let file = File::open(&self.path)?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
        let mask = projection(&builder, &[DELTA_F, PSD])?;
        let selection = RowSelection::from(vec![RowSelector::skip(index), RowSelector::select(1)]);
        let mut reader = builder
            .with_projection(mask)
            .with_row_selection(selection)
            .build()?;

        let batch = reader.next().ok_or_else(|| {
            PsdError::Store(format!("row {index} missing from {}", self.path.display()))
        })??;
        let delta_f = f64_column(&batch, DELTA_F)?
            .first()
            .copied()
            .ok_or_else(|| PsdError::Store(format!("row {index} has no '{DELTA_F}'")))?;
        let psd_col = batch
            .column_by_name(PSD)
            .ok_or_else(|| PsdError::Store(format!("missing '{PSD}' column")))?;
        let data = extract_f64_list(psd_col, 0)?;

        FrequencySeries::new(data, delta_f)
    }
}

/// Write `entries` to `path` in the layout read by [`ParquetPsdStore`].
pub fn write_parquet_store(
    path: &Path,
    detector: &str,
    low_frequency_cutoff: f64,
    entries: &[StoreEntry],
) -> Result<()> {
    let mut psd_builder = ListBuilder::new(Float64Builder::new());
    for entry in entries {
        psd_builder.values().append_slice(entry.psd.data());
        psd_builder.append(true);
    }

    let start_times = Float64Array::from_iter_values(entries.iter().map(|e| e.segment.start));
    let end_times = Float64Array::from_iter_values(entries.iter().map(|e| e.segment.end));
    let delta_fs = Float64Array::from_iter_values(entries.iter().map(|e| e.psd.delta_f()));

    let metadata = HashMap::from([
        (DETECTOR_KEY.to_string(), detector.to_string()),
        (LOW_FREQUENCY_CUTOFF_KEY.to_string(), low_frequency_cutoff.to_string()),
    ]);
    let schema = Arc::new(
        Schema::new(vec![
            Field::new(START_TIME, DataType::Float64, false),
            Field::new(END_TIME, DataType::Float64, false),
            Field::new(DELTA_F, DataType::Float64, false),
            Field::new(
                PSD,
                DataType::List(Arc::new(Field::new("item", DataType::Float64, true))),
                false,
            ),
        ])
        .with_metadata(metadata),
    );

    let columns: Vec<ArrayRef> = vec![
        Arc::new(start_times),
        Arc::new(end_times),
        Arc::new(delta_fs),
        Arc::new(psd_builder.finish()),
    ];
    let batch = RecordBatch::try_new(schema.clone(), columns)?;

    let file = File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, schema, None)?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

// -- Parquet / Arrow helpers --

fn missing_key(key: &str) -> PsdError {
    PsdError::Store(format!("missing '{key}' in store metadata"))
}

/// Projection onto the named top-level columns.
fn projection(
    builder: &ParquetRecordBatchReaderBuilder<File>,
    names: &[&str],
) -> Result<ProjectionMask> {
    let indices = names
        .iter()
        .map(|name| {
            builder
                .schema()
                .index_of(name)
                .map_err(|_| PsdError::Store(format!("missing '{name}' column")))
        })
        .collect::<Result<Vec<usize>>>()?;
    Ok(ProjectionMask::roots(builder.parquet_schema(), indices))
}

/// Read a non-null Float64 column of `batch`.
fn f64_column(batch: &RecordBatch, name: &str) -> Result<Vec<f64>> {
    let col = batch
        .column_by_name(name)
        .ok_or_else(|| PsdError::Store(format!("missing '{name}' column")))?;
    let arr = col
        .as_any()
        .downcast_ref::<Float64Array>()
        .ok_or_else(|| {
            PsdError::Store(format!("'{name}' is {:?}, expected Float64", col.data_type()))
        })?;
    arr.iter()
        .map(|v| v.ok_or_else(|| PsdError::Store(format!("null value in '{name}'"))))
        .collect()
}

/// Extract a `Vec<f64>` from a List or LargeList column at the given row.
fn extract_f64_list(col: &ArrayRef, row: usize) -> Result<Vec<f64>> {
    if col.is_null(row) {
        return Err(PsdError::Store("null PSD payload".into()));
    }

    let values_array = match col.data_type() {
        DataType::List(_) => col
            .as_any()
            .downcast_ref::<ListArray>()
            .ok_or_else(|| PsdError::Store("expected ListArray".into()))?
            .value(row),
        DataType::LargeList(_) => col
            .as_any()
            .downcast_ref::<LargeListArray>()
            .ok_or_else(|| PsdError::Store("expected LargeListArray".into()))?
            .value(row),
        other => {
            return Err(PsdError::Store(format!(
                "expected List or LargeList PSD column, got {other:?}"
            )))
        }
    };

    let null_element =
        |k: usize| PsdError::Store(format!("null PSD value at bin {k} of row {row}"));

    // The inner array can be Float64 or Float32
    if let Some(f64_arr) = values_array.as_any().downcast_ref::<Float64Array>() {
        f64_arr
            .iter()
            .enumerate()
            .map(|(k, v)| v.ok_or_else(|| null_element(k)))
            .collect()
    } else if let Some(f32_arr) = values_array.as_any().downcast_ref::<Float32Array>() {
        f32_arr
            .iter()
            .enumerate()
            .map(|(k, v)| v.map(f64::from).ok_or_else(|| null_element(k)))
            .collect()
    } else {
        Err(PsdError::Store(format!(
            "PSD list inner type is {:?}, expected Float64 or Float32",
            values_array.data_type()
        )))
    }
}
