//! libRadtran `uvspec` output tables

use std::{
    fs::File,
    io::{self, BufRead, BufReader},
    path::{Path, PathBuf},
};

use chrono::{NaiveDate, NaiveTime};
use strum_macros::{EnumIter, EnumString};

use crate::frame::{FrameError, SpectralFrame, Units};

/// Below this value of cos(SZA) the direct normal cannot be reconstructed
pub const MIN_MU0: f64 = 1e-12;

#[derive(Debug, thiserror::Error)]
pub enum ModelFileError {
    #[error("failed to read model file {1:?}")]
    Io(#[source] io::Error, PathBuf),
    #[error("no numeric data found in model file {0:?}")]
    Empty(PathBuf),
    #[error("invalid spectrum in model file {1:?}")]
    Frame(#[source] FrameError, PathBuf),
}
type Result<T> = std::result::Result<T, ModelFileError>;

/// Meaning of the direct irradiance column of the model output
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum DirectColumn {
    /// Direct beam on a horizontal plane (libRadtran `edir`)
    #[strum(serialize = "horizontal")]
    Horizontal,
    /// Direct beam on a plane normal to the sun
    #[strum(serialize = "normal")]
    Normal,
}

/// Spectral quantity compared against the measurements
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, EnumString, strum_macros::Display)]
#[strum(ascii_case_insensitive)]
pub enum ModelQuantity {
    #[strum(serialize = "dni")]
    DirectNormal,
    #[strum(serialize = "direct_horizontal")]
    DirectHorizontal,
    #[strum(serialize = "dhi")]
    DiffuseDown,
    #[strum(serialize = "ghi")]
    GlobalHorizontal,
}

/// Directional-average terms of a 7 column output table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeanIntensities {
    pub direct: Vec<f64>,
    pub diffuse_down: Vec<f64>,
    pub diffuse_up: Vec<f64>,
}

/// Parsed model spectrum, in W/m²/nm
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSpectrum {
    pub path: PathBuf,
    pub wavelengths: Vec<f64>,
    pub direct: Vec<f64>,
    pub diffuse_down: Vec<f64>,
    pub diffuse_up: Vec<f64>,
    pub mean_intensities: Option<MeanIntensities>,
}
impl ModelSpectrum {
    /// Spectral direct irradiance on a horizontal plane
    pub fn direct_horizontal(&self, angle_deg: f64, column: DirectColumn) -> Vec<f64> {
        let mu0 = angle_deg.to_radians().cos();
        match column {
            DirectColumn::Horizontal => self.direct.clone(),
            DirectColumn::Normal => self.direct.iter().map(|e| e * mu0).collect(),
        }
    }
    /// Spectral direct normal irradiance, NaN when the sun is at the horizon
    pub fn direct_normal(&self, angle_deg: f64, column: DirectColumn) -> Vec<f64> {
        let mu0 = angle_deg.to_radians().cos();
        match column {
            DirectColumn::Normal => self.direct.clone(),
            DirectColumn::Horizontal if mu0 < MIN_MU0 => vec![f64::NAN; self.direct.len()],
            DirectColumn::Horizontal => self.direct.iter().map(|e| e / mu0).collect(),
        }
    }
    /// Spectral global horizontal irradiance
    pub fn global_horizontal(&self, angle_deg: f64, column: DirectColumn) -> Vec<f64> {
        self.direct_horizontal(angle_deg, column)
            .into_iter()
            .zip(&self.diffuse_down)
            .map(|(dir_h, dn)| dir_h + dn)
            .collect()
    }
    /// Returns the requested `quantity` as a spectral frame
    ///
    /// The frame is stamped at midnight of `date` with the model angle.
    /// `angle_deg` is the zenith angle the model was run at, not the angle of
    /// the measurement it is compared to: the direct normal irradiance is
    /// reconstructed with the cosine of the model angle. Close to the horizon,
    /// that cosine differs from the measured one by several percent even
    /// within a fraction of a degree.
    pub fn frame(
        &self,
        quantity: ModelQuantity,
        column: DirectColumn,
        date: NaiveDate,
        angle_deg: f64,
    ) -> Result<SpectralFrame> {
        let values = match quantity {
            ModelQuantity::DirectNormal => self.direct_normal(angle_deg, column),
            ModelQuantity::DirectHorizontal => self.direct_horizontal(angle_deg, column),
            ModelQuantity::DiffuseDown => self.diffuse_down.clone(),
            ModelQuantity::GlobalHorizontal => self.global_horizontal(angle_deg, column),
        };
        let source = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        SpectralFrame::new(
            date.and_time(NaiveTime::MIN),
            angle_deg,
            source,
            self.wavelengths.clone(),
            values,
        )
        .map_err(|e| ModelFileError::Frame(e, self.path.clone()))
    }
}

/// Model output table reader
#[derive(Debug, Clone, Copy)]
pub struct ModelReader {
    header_lines: usize,
    units: Units,
}
impl Default for ModelReader {
    fn default() -> Self {
        Self {
            header_lines: 0,
            units: Units::WattsPerNm,
        }
    }
}
impl ModelReader {
    /// Number of lines skipped at the top of every file
    pub fn header_lines(self, header_lines: usize) -> Self {
        Self {
            header_lines,
            ..self
        }
    }
    /// Units of the irradiance columns in the files
    pub fn units(self, units: Units) -> Self {
        Self { units, ..self }
    }
    /// Reads a model output file
    pub fn read<P: AsRef<Path>>(&self, path: P) -> Result<ModelSpectrum> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| ModelFileError::Io(e, path.to_path_buf()))?;
        self.parse(BufReader::new(file), path)
    }
    /// Parses a model output table from a reader, `path` is only used for provenance
    pub fn parse<R: BufRead>(&self, reader: R, path: &Path) -> Result<ModelSpectrum> {
        let mut rows: Vec<Vec<f64>> = vec![];
        for line in reader.lines().skip(self.header_lines) {
            let line = line.map_err(|e| ModelFileError::Io(e, path.to_path_buf()))?;
            if let Some(row) = parse_row(&line) {
                rows.push(row);
            }
        }
        if rows.is_empty() {
            return Err(ModelFileError::Empty(path.to_path_buf()));
        }
        let with_averages = rows.iter().all(|row| row.len() >= 7);

        let units = self.units;
        let mut pairs: Vec<(f64, Vec<f64>)> = rows
            .into_iter()
            .map(|row| {
                let n = if with_averages { 7 } else { 4 };
                (row[0], row[1..n].iter().map(|v| units.to_watts_per_nm(*v)).collect())
            })
            .collect();
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
        pairs.dedup_by(|b, a| a.0 == b.0);

        let column = |k: usize| pairs.iter().map(|(_, v)| v[k]).collect::<Vec<f64>>();
        Ok(ModelSpectrum {
            path: path.to_path_buf(),
            wavelengths: pairs.iter().map(|(w, _)| *w).collect(),
            direct: column(0),
            diffuse_down: column(1),
            diffuse_up: column(2),
            mean_intensities: with_averages.then(|| MeanIntensities {
                direct: column(3),
                diffuse_down: column(4),
                diffuse_up: column(5),
            }),
        })
    }
}

/// Parses the leading numeric tokens of a data line
///
/// Returns `None` for blank and comment lines, or when fewer than 4 leading
/// tokens are numeric.
fn parse_row(line: &str) -> Option<Vec<f64>> {
    let s = line.trim();
    if s.is_empty() || s.starts_with(['#', '!', ';']) {
        return None;
    }
    let values: Vec<f64> = s
        .split_whitespace()
        .take(7)
        .map_while(|token| token.parse::<f64>().ok())
        .collect();
    (values.len() >= 4 && values[0].is_finite()).then_some(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const TABLE: &str = "\
# uvspec output
 lambda edir edn eup
 400.0  1000.0  200.0  50.0
 350.0   800.0  300.0  40.0
 400.0  9999.0 9999.0 9999.0
 500.0  1200.0  150.0  60.0 extra text
 garbage line here
";

    fn read(table: &str, reader: ModelReader) -> Result<ModelSpectrum> {
        reader.parse(table.as_bytes(), Path::new("helmos_2024-11-10_sza_060p0.out"))
    }

    #[test]
    fn parses_sorts_and_dedups() {
        let spectrum = read(TABLE, ModelReader::default().units(Units::MilliwattsPerNm)).unwrap();
        assert_eq!(spectrum.wavelengths, vec![350., 400., 500.]);
        assert_eq!(spectrum.direct, vec![0.8, 1., 1.2]);
        assert_eq!(spectrum.diffuse_down, vec![0.3, 0.2, 0.15]);
        assert!(spectrum.mean_intensities.is_none());
    }

    #[test]
    fn header_lines_are_skipped() {
        let spectrum = read(TABLE, ModelReader::default().header_lines(3)).unwrap();
        assert_eq!(spectrum.wavelengths, vec![350., 400., 500.]);
        assert_eq!(spectrum.direct[1], 9999.);
    }

    #[test]
    fn empty_table_is_an_error() {
        assert!(matches!(
            read("# nothing\n\n", ModelReader::default()),
            Err(ModelFileError::Empty(_))
        ));
    }

    #[test]
    fn seven_columns_keep_mean_intensities() {
        let table = "400 1 2 3 4 5 6\n500 1 2 3 4 5 6\n";
        let spectrum = read(table, ModelReader::default()).unwrap();
        let mean = spectrum.mean_intensities.unwrap();
        assert_eq!(mean.diffuse_up, vec![6., 6.]);
    }

    #[test]
    fn derived_quantities() {
        let spectrum = read(TABLE, ModelReader::default()).unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 11, 10).unwrap();
        let dni = spectrum
            .frame(ModelQuantity::DirectNormal, DirectColumn::Horizontal, date, 60.)
            .unwrap();
        assert_relative_eq!(dni.values()[0], 1600., epsilon = 1e-9);
        let ghi = spectrum
            .frame(ModelQuantity::GlobalHorizontal, DirectColumn::Normal, date, 60.)
            .unwrap();
        assert_relative_eq!(ghi.values()[0], 800. * 0.5 + 300., epsilon = 1e-9);
    }

    #[test]
    fn direct_normal_at_horizon_is_nan() {
        let spectrum = read(TABLE, ModelReader::default()).unwrap();
        let dni = spectrum.direct_normal(90., DirectColumn::Horizontal);
        assert!(dni.iter().all(|v| v.is_nan()));
    }
}
