//! Spectroradiometer measurement series
//!
//! Measurement files are CSV tables, optionally gzip compressed, with one row
//! per timestamp and one column per wavelength channel. The column layout is
//! inferred once per file with [SpectralSchema::infer].

use std::{
    fs::File,
    io::{self, Read},
    ops::Deref,
    path::{Path, PathBuf},
};

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use flate2::read::GzDecoder;
use itertools::Itertools;

use crate::frame::{FrameError, SpectralFrame, Units};

pub mod schema;
pub use schema::{SchemaError, SpectralSchema};

#[derive(Debug, thiserror::Error)]
pub enum MeasurementError {
    #[error("failed to read measurement file {1:?}")]
    Io(#[source] io::Error, PathBuf),
    #[error("failed to parse measurement file {1:?}")]
    Csv(#[source] csv::Error, PathBuf),
    #[error("unexpected layout of measurement file {1:?}")]
    Schema(#[source] SchemaError, PathBuf),
    #[error("invalid spectrum in measurement file {1:?}")]
    Frame(#[source] FrameError, PathBuf),
    #[error("invalid spectral band [{0}, {1}]nm")]
    Band(f64, f64),
    #[error("none of the {0} measurement files has a spectral column in [{1}, {2}]nm")]
    NoSpectralColumns(usize, f64, f64),
    #[error("none of the {0} measurement files could be loaded")]
    NoUsableFiles(usize),
}
type Result<T> = std::result::Result<T, MeasurementError>;

/// A measured spectrum, in W/m²/nm, with its row identifier in the series
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    id: usize,
    frame: SpectralFrame,
    reported_broadband: Option<f64>,
}
impl Measurement {
    /// Row identifier, unique within a [MeasurementSeries]
    pub fn id(&self) -> usize {
        self.id
    }
    /// Broadband irradiance reported by the instrument [W/m²], if any
    pub fn reported_broadband(&self) -> Option<f64> {
        self.reported_broadband
    }
    pub fn frame(&self) -> &SpectralFrame {
        &self.frame
    }
}
impl Deref for Measurement {
    type Target = SpectralFrame;

    fn deref(&self) -> &Self::Target {
        &self.frame
    }
}

/// Measurement files loader
#[derive(Debug, Clone, Copy)]
pub struct MeasurementLoader {
    units: Units,
    band: (f64, f64),
}
impl MeasurementLoader {
    /// Inclusive wavelength band of the spectral channels [nm]
    pub fn band(self, min_nm: f64, max_nm: f64) -> Self {
        Self {
            band: (min_nm, max_nm),
            ..self
        }
    }
    /// Loads and merges the measurement `files`
    ///
    /// A file that cannot be read or has an unexpected layout is skipped.
    pub fn load<I, P>(self, files: I) -> Result<MeasurementSeries>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let (min_nm, max_nm) = self.band;
        if min_nm.is_nan() || max_nm.is_nan() || min_nm >= max_nm {
            return Err(MeasurementError::Band(min_nm, max_nm));
        }
        let mut rows = vec![];
        let mut files_loaded = 0usize;
        let mut skipped_files = vec![];
        let mut rows_skipped = 0usize;
        let mut schema_failures = 0usize;
        for path in files {
            let path = path.as_ref();
            match self.load_file(path) {
                Ok((file_rows, n_skipped)) => {
                    log::info!(
                        "Loaded {} rows from {:?} ({} rows skipped)",
                        file_rows.len(),
                        path,
                        n_skipped
                    );
                    files_loaded += 1;
                    rows_skipped += n_skipped;
                    rows.extend(file_rows);
                }
                Err(e) => {
                    log::warn!("skipping {:?}: {}", path, error_chain(&e));
                    if let MeasurementError::Schema(SchemaError::NoSpectralColumns(..), _) = e {
                        schema_failures += 1;
                    }
                    skipped_files.push(SkippedFile {
                        path: path.to_path_buf(),
                        reason: error_chain(&e),
                    });
                }
            }
        }
        if files_loaded == 0 {
            let n = skipped_files.len();
            return Err(if n > 0 && schema_failures == n {
                MeasurementError::NoSpectralColumns(n, min_nm, max_nm)
            } else {
                MeasurementError::NoUsableFiles(n)
            });
        }
        Ok(MeasurementSeries::new(rows, files_loaded, skipped_files, rows_skipped))
    }
    fn load_file(&self, path: &Path) -> Result<(Vec<(SpectralFrame, Option<f64>)>, usize)> {
        let contents = read_to_string(path).map_err(|e| MeasurementError::Io(e, path.into()))?;
        let mut rdr = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(contents.as_bytes());
        let headers = rdr
            .headers()
            .map_err(|e| MeasurementError::Csv(e, path.into()))?
            .clone();
        let (min_nm, max_nm) = self.band;
        let schema = SpectralSchema::infer(&headers, min_nm, max_nm)
            .map_err(|e| MeasurementError::Schema(e, path.into()))?;
        let wavelengths = schema.wavelengths();
        let source = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut rows = vec![];
        let mut skipped = 0usize;
        for result in rdr.records() {
            let Ok(record) = result else {
                skipped += 1;
                continue;
            };
            let Some(timestamp) = record.get(schema.timestamp).and_then(parse_timestamp) else {
                skipped += 1;
                continue;
            };
            let angle = record
                .get(schema.angle)
                .and_then(|s| s.trim().parse::<f64>().ok())
                .filter(|a| a.is_finite());
            let Some(angle) = angle.filter(|a| (0f64..=90f64).contains(a)) else {
                log::debug!("{}: no usable solar zenith angle at {}", source, timestamp);
                skipped += 1;
                continue;
            };
            let values: Vec<f64> = schema
                .channels
                .iter()
                .map(|c| parse_value(record.get(c.column)))
                .collect();
            let frame = SpectralFrame::new(timestamp, angle, &source, wavelengths.clone(), values)
                .map_err(|e| MeasurementError::Frame(e, path.into()))?
                .convert(self.units);
            let reported_broadband = schema
                .broadband
                .map(|i| parse_value(record.get(i)))
                .filter(|v| v.is_finite());
            rows.push((frame, reported_broadband));
        }
        Ok((rows, skipped))
    }
}

/// A measurement file that could not be loaded
#[derive(Debug, Clone)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

/// Time-ordered measurements from one or more files
#[derive(Debug, Clone, Default)]
pub struct MeasurementSeries {
    rows: Vec<Measurement>,
    files_loaded: usize,
    skipped_files: Vec<SkippedFile>,
    rows_skipped: usize,
}
impl MeasurementSeries {
    /// Creates a loader for files in `units`
    pub fn loader(units: Units) -> MeasurementLoader {
        MeasurementLoader {
            units,
            band: (0., f64::INFINITY),
        }
    }
    fn new(
        mut rows: Vec<(SpectralFrame, Option<f64>)>,
        files_loaded: usize,
        skipped_files: Vec<SkippedFile>,
        rows_skipped: usize,
    ) -> Self {
        rows.sort_by_key(|(frame, _)| frame.timestamp());
        Self {
            rows: rows
                .into_iter()
                .enumerate()
                .map(|(id, (frame, reported_broadband))| Measurement {
                    id,
                    frame,
                    reported_broadband,
                })
                .collect(),
            files_loaded,
            skipped_files,
            rows_skipped,
        }
    }
    /// Builds a series from frames already in W/m²/nm
    pub fn from_frames(frames: Vec<SpectralFrame>) -> Self {
        Self::new(
            frames.into_iter().map(|frame| (frame, None)).collect(),
            0,
            vec![],
            0,
        )
    }
    /// All the rows in chronological order
    pub fn rows(&self) -> &[Measurement] {
        &self.rows
    }
    /// The rows of `date` in chronological order
    pub fn rows_for_date(&self, date: NaiveDate) -> &[Measurement] {
        let start = self.rows.partition_point(|row| row.date() < date);
        let end = self.rows.partition_point(|row| row.date() <= date);
        &self.rows[start..end]
    }
    /// The distinct dates of the series in chronological order
    pub fn dates(&self) -> Vec<NaiveDate> {
        self.rows.iter().map(|row| row.date()).dedup().collect()
    }
    pub fn len(&self) -> usize {
        self.rows.len()
    }
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
    pub fn files_loaded(&self) -> usize {
        self.files_loaded
    }
    pub fn skipped_files(&self) -> &[SkippedFile] {
        &self.skipped_files
    }
    /// Number of rows dropped for an unreadable timestamp or angle
    pub fn rows_skipped(&self) -> usize {
        self.rows_skipped
    }
}

fn read_to_string(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut contents = String::new();
    if path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gz"))
    {
        GzDecoder::new(file).read_to_string(&mut contents)?;
    } else {
        file.read_to_string(&mut contents)?;
    }
    Ok(contents)
}

fn parse_value(cell: Option<&str>) -> f64 {
    cell.and_then(|s| s.trim().parse::<f64>().ok())
        .unwrap_or(f64::NAN)
}

const TIMESTAMP_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Parses an ISO 8601 timestamp, offsets are converted to UTC
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.naive_utc());
    }
    if let Ok(t) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Some(t.naive_utc());
    }
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
}

fn error_chain(e: &dyn std::error::Error) -> String {
    let mut msg = e.to_string();
    let mut current = e.source();
    while let Some(cause) = current {
        msg.push_str(": ");
        msg.push_str(&cause.to_string());
        current = cause.source();
    }
    msg
}
