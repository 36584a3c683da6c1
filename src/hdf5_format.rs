//! HDF5 file format for report storage
//!
//! Raw axes and timestamps are always stored; calibrated axes are stored as
//! NaN for reports taken without a calibration policy.

use crate::{Lsm303dError, Report, Result};
use hdf5::types::VarLenUnicode;
use hdf5::{Dataset, File, Group};
use std::ops::Range;
use std::path::Path;

/// Format version written to new files
const FORMAT_VERSION: &str = "1.0";

/// Metadata stored in HDF5 file
#[derive(Debug, Clone)]
pub struct Metadata {
    pub start_time: String,     // ISO 8601 timestamp
    pub poll_rate_hz: f64,      // Requested poll rate
    pub output_data_rate: String,
    pub range: String,
    pub version: String,
}

/// Handles for HDF5 datasets
struct DatasetHandles {
    timestamps_us: Dataset,
    x_raw: Dataset,
    y_raw: Dataset,
    z_raw: Dataset,
    x_m_s2: Dataset,
    y_m_s2: Dataset,
    z_m_s2: Dataset,
}

fn storage<E: std::fmt::Display>(what: &str) -> impl FnOnce(E) -> Lsm303dError + '_ {
    move |e| Lsm303dError::Storage(format!("{}: {}", what, e))
}

fn unicode(value: &str) -> Result<VarLenUnicode> {
    value
        .parse::<VarLenUnicode>()
        .map_err(storage("Invalid metadata string"))
}

/// Appends drained reports to an HDF5 file
pub struct ReportWriter {
    file: File,
    datasets: DatasetHandles,
    report_count: usize,
}

impl ReportWriter {
    /// Create a new HDF5 file for report collection
    ///
    /// # Arguments
    /// * `path` - File path
    /// * `poll_rate_hz` - Requested poll rate
    /// * `output_data_rate` - Part's conversion rate, as displayed
    /// * `range` - Full-scale range, as displayed
    pub fn create<P: AsRef<Path>>(
        path: P,
        poll_rate_hz: f64,
        output_data_rate: &str,
        range: &str,
    ) -> Result<Self> {
        let file = File::create(path).map_err(storage("Failed to create HDF5 file"))?;

        let metadata_group = file
            .create_group("metadata")
            .map_err(storage("Failed to create metadata group"))?;

        let start_time = chrono::Local::now().to_rfc3339();
        Self::write_text(&metadata_group, "start_time", &start_time)?;
        metadata_group
            .new_attr::<f64>()
            .create("poll_rate_hz")
            .and_then(|attr| attr.write_scalar(&poll_rate_hz))
            .map_err(storage("Failed to write poll_rate_hz"))?;
        Self::write_text(&metadata_group, "output_data_rate", output_data_rate)?;
        Self::write_text(&metadata_group, "range", range)?;
        Self::write_text(&metadata_group, "version", FORMAT_VERSION)?;

        let data_group = file
            .create_group("reports")
            .map_err(storage("Failed to create reports group"))?;

        let chunk_size = 1024;
        let datasets = DatasetHandles {
            timestamps_us: Self::create_dataset::<u64>(&data_group, "timestamps_us", chunk_size)?,
            x_raw: Self::create_dataset::<i16>(&data_group, "x_raw", chunk_size)?,
            y_raw: Self::create_dataset::<i16>(&data_group, "y_raw", chunk_size)?,
            z_raw: Self::create_dataset::<i16>(&data_group, "z_raw", chunk_size)?,
            x_m_s2: Self::create_dataset::<f32>(&data_group, "x_m_s2", chunk_size)?,
            y_m_s2: Self::create_dataset::<f32>(&data_group, "y_m_s2", chunk_size)?,
            z_m_s2: Self::create_dataset::<f32>(&data_group, "z_m_s2", chunk_size)?,
        };

        Ok(Self {
            file,
            datasets,
            report_count: 0,
        })
    }

    fn write_text(group: &Group, name: &str, value: &str) -> Result<()> {
        let value = unicode(value)?;
        group
            .new_attr::<VarLenUnicode>()
            .create(name)
            .and_then(|attr| attr.write_scalar(&value))
            .map_err(|e| Lsm303dError::Storage(format!("Failed to write {}: {}", name, e)))
    }

    /// Create a resizable, chunked, compressed dataset
    fn create_dataset<T: hdf5::H5Type>(group: &Group, name: &str, chunk_size: usize) -> Result<Dataset> {
        group
            .new_dataset::<T>()
            .shape((0..,))
            .chunk((chunk_size,))
            .deflate(4)
            .create(name)
            .map_err(|e| Lsm303dError::Storage(format!("Failed to create dataset {}: {}", name, e)))
    }

    /// Append a batch of reports
    pub fn append_batch(&mut self, reports: &[Report]) -> Result<()> {
        if reports.is_empty() {
            return Ok(());
        }

        let new_size = self.report_count + reports.len();
        let axis = |i: usize| -> Vec<f32> {
            reports
                .iter()
                .map(|r| {
                    r.accel_m_s2()
                        .map(|(x, y, z)| [x, y, z][i])
                        .unwrap_or(f32::NAN)
                })
                .collect()
        };

        let timestamps: Vec<u64> = reports.iter().map(|r| r.timestamp_us).collect();
        let x_raw: Vec<i16> = reports.iter().map(|r| r.x_raw).collect();
        let y_raw: Vec<i16> = reports.iter().map(|r| r.y_raw).collect();
        let z_raw: Vec<i16> = reports.iter().map(|r| r.z_raw).collect();

        Self::append_to_dataset(&self.datasets.timestamps_us, new_size, &timestamps)?;
        Self::append_to_dataset(&self.datasets.x_raw, new_size, &x_raw)?;
        Self::append_to_dataset(&self.datasets.y_raw, new_size, &y_raw)?;
        Self::append_to_dataset(&self.datasets.z_raw, new_size, &z_raw)?;
        Self::append_to_dataset(&self.datasets.x_m_s2, new_size, &axis(0))?;
        Self::append_to_dataset(&self.datasets.y_m_s2, new_size, &axis(1))?;
        Self::append_to_dataset(&self.datasets.z_m_s2, new_size, &axis(2))?;

        self.report_count = new_size;
        Ok(())
    }

    fn append_to_dataset<T: hdf5::H5Type>(dataset: &Dataset, new_size: usize, data: &[T]) -> Result<()> {
        dataset
            .resize((new_size,))
            .map_err(storage("Failed to resize dataset"))?;

        let start = new_size - data.len();
        dataset
            .write_slice(data, start..)
            .map_err(storage("Failed to write to dataset"))
    }

    /// Flush data to disk
    pub fn flush(&mut self) -> Result<()> {
        self.file.flush().map_err(storage("Failed to flush HDF5 file"))
    }

    pub fn report_count(&self) -> usize {
        self.report_count
    }

    /// Flush and close the file, returning the number of reports written
    pub fn finish(mut self) -> Result<usize> {
        self.flush()?;
        Ok(self.report_count)
    }
}

/// Reads back a file written by [`ReportWriter`]
pub struct ReportReader {
    datasets: DatasetHandles,
    metadata: Metadata,
}

impl ReportReader {
    /// Open an existing HDF5 file for reading
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path).map_err(storage("Failed to open HDF5 file"))?;
        let metadata = Self::read_metadata(&file)?;

        let group = file
            .group("reports")
            .map_err(storage("Failed to open reports group"))?;
        let open = |name: &str| {
            group
                .dataset(name)
                .map_err(|e| Lsm303dError::Storage(format!("Failed to open {} dataset: {}", name, e)))
        };

        let datasets = DatasetHandles {
            timestamps_us: open("timestamps_us")?,
            x_raw: open("x_raw")?,
            y_raw: open("y_raw")?,
            z_raw: open("z_raw")?,
            x_m_s2: open("x_m_s2")?,
            y_m_s2: open("y_m_s2")?,
            z_m_s2: open("z_m_s2")?,
        };

        Ok(Self { datasets, metadata })
    }

    fn read_metadata(file: &File) -> Result<Metadata> {
        let group = file
            .group("metadata")
            .map_err(storage("Failed to open metadata group"))?;
        let text = |name: &str| {
            group
                .attr(name)
                .and_then(|attr| attr.read_scalar::<VarLenUnicode>())
                .map(|s| s.to_string())
                .map_err(|e| Lsm303dError::Storage(format!("Failed to read {}: {}", name, e)))
        };

        let poll_rate_hz = group
            .attr("poll_rate_hz")
            .and_then(|attr| attr.read_scalar::<f64>())
            .map_err(storage("Failed to read poll_rate_hz"))?;

        Ok(Metadata {
            start_time: text("start_time")?,
            poll_rate_hz,
            output_data_rate: text("output_data_rate")?,
            range: text("range")?,
            version: text("version")?,
        })
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Get total number of reports in file
    pub fn total_reports(&self) -> usize {
        self.datasets.timestamps_us.size()
    }

    /// Read a range of reports
    ///
    /// Calibrated axes come back through [`read_accel_range`](Self::read_accel_range);
    /// the reports returned here carry the raw axes only.
    pub fn read_range(&self, start: usize, count: usize) -> Result<Vec<Report>> {
        let Some(range) = self.clamp(start, count) else {
            return Ok(Vec::new());
        };

        let timestamps: Vec<u64> = read_slice(&self.datasets.timestamps_us, range.clone())?;
        let x_raw: Vec<i16> = read_slice(&self.datasets.x_raw, range.clone())?;
        let y_raw: Vec<i16> = read_slice(&self.datasets.y_raw, range.clone())?;
        let z_raw: Vec<i16> = read_slice(&self.datasets.z_raw, range)?;

        Ok(timestamps
            .into_iter()
            .zip(x_raw)
            .zip(y_raw)
            .zip(z_raw)
            .map(|(((timestamp_us, x_raw), y_raw), z_raw)| Report {
                timestamp_us,
                x_raw,
                y_raw,
                z_raw,
                physical: None,
            })
            .collect())
    }

    /// Calibrated axes of a range, `None` where the report was raw-only
    pub fn read_accel_range(&self, start: usize, count: usize) -> Result<Vec<Option<[f32; 3]>>> {
        let Some(range) = self.clamp(start, count) else {
            return Ok(Vec::new());
        };

        let x: Vec<f32> = read_slice(&self.datasets.x_m_s2, range.clone())?;
        let y: Vec<f32> = read_slice(&self.datasets.y_m_s2, range.clone())?;
        let z: Vec<f32> = read_slice(&self.datasets.z_m_s2, range)?;

        Ok(x.into_iter()
            .zip(y)
            .zip(z)
            .map(|((x, y), z)| (!x.is_nan()).then_some([x, y, z]))
            .collect())
    }

    fn clamp(&self, start: usize, count: usize) -> Option<Range<usize>> {
        let total = self.total_reports();
        if start >= total || count == 0 {
            return None;
        }
        Some(start..start + count.min(total - start))
    }
}

fn read_slice<T: hdf5::H5Type + Clone>(dataset: &Dataset, range: Range<usize>) -> Result<Vec<T>> {
    dataset
        .read_slice_1d::<T, _>(range)
        .map(|array| array.to_vec())
        .map_err(storage("Failed to read dataset"))
}
