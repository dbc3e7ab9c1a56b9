use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use strum_macros::{Display, EnumIter, EnumString};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum FrameError {
    #[error("{wavelengths} wavelengths for {values} values")]
    LengthMismatch { wavelengths: usize, values: usize },
    #[error("a spectral frame needs at least 2 distinct wavelengths, found {0}")]
    TooShort(usize),
    #[error("non-finite wavelength at index {0}")]
    Wavelength(usize),
    #[error("solar zenith angle {0} is outside [0, 90] degree")]
    Geometry(f64),
}
type Result<T> = std::result::Result<T, FrameError>;

/// Irradiance units of a spectral source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, EnumIter, EnumString, Display)]
pub enum Units {
    /// W/m²/nm
    #[default]
    #[strum(serialize = "W_m2_nm")]
    WattsPerNm,
    /// mW/m²/nm
    #[strum(serialize = "mW_m2_nm")]
    MilliwattsPerNm,
    /// W/m²/µm
    #[strum(serialize = "W_m2_um")]
    WattsPerMicron,
}
impl Units {
    /// Multiplicative factor to W/m²/nm
    pub fn factor(&self) -> f64 {
        1. / self.divisor()
    }
    fn divisor(&self) -> f64 {
        match self {
            Units::WattsPerNm => 1.,
            Units::MilliwattsPerNm | Units::WattsPerMicron => 1e3,
        }
    }
    /// Converts `value` to W/m²/nm
    pub fn to_watts_per_nm(&self, value: f64) -> f64 {
        value / self.divisor()
    }
}
/// A wavelength-indexed irradiance spectrum with its provenance
///
/// Frames are immutable: unit conversion, resampling and ratios all
/// return a new frame.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectralFrame {
    timestamp: NaiveDateTime,
    angle_deg: f64,
    source: String,
    wavelengths: Vec<f64>,
    values: Vec<f64>,
}
impl SpectralFrame {
    /// Creates a new frame
    ///
    /// The samples are sorted by wavelength and, for repeated wavelengths,
    /// only the first sample in input order is kept.
    pub fn new(
        timestamp: NaiveDateTime,
        angle_deg: f64,
        source: impl Into<String>,
        wavelengths: Vec<f64>,
        values: Vec<f64>,
    ) -> Result<Self> {
        if wavelengths.len() != values.len() {
            return Err(FrameError::LengthMismatch {
                wavelengths: wavelengths.len(),
                values: values.len(),
            });
        }
        if !angle_deg.is_finite() || !(0f64..=90f64).contains(&angle_deg) {
            return Err(FrameError::Geometry(angle_deg));
        }
        if let Some(i) = wavelengths.iter().position(|w| !w.is_finite()) {
            return Err(FrameError::Wavelength(i));
        }
        let (wavelengths, values) = sorted_unique(wavelengths, values);
        if wavelengths.len() < 2 {
            return Err(FrameError::TooShort(wavelengths.len()));
        }
        Ok(Self {
            timestamp,
            angle_deg,
            source: source.into(),
            wavelengths,
            values,
        })
    }
    /// Returns a frame on the same grid and provenance with new values
    pub fn with_values(&self, values: Vec<f64>) -> Result<Self> {
        if values.len() != self.wavelengths.len() {
            return Err(FrameError::LengthMismatch {
                wavelengths: self.wavelengths.len(),
                values: values.len(),
            });
        }
        Ok(Self {
            values,
            ..self.clone()
        })
    }
    /// Returns a frame with a new source label
    pub fn relabel(self, source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..self
        }
    }
    /// Converts the values from `units` to W/m²/nm
    pub fn convert(&self, units: Units) -> Self {
        Self {
            values: self
                .values
                .iter()
                .map(|v| units.to_watts_per_nm(*v))
                .collect(),
            ..self.clone()
        }
    }
    /// Keeps only the samples with wavelengths in the inclusive band `[min, max]`
    pub fn restrict(&self, min_nm: f64, max_nm: f64) -> Result<Self> {
        let (wavelengths, values): (Vec<f64>, Vec<f64>) = self
            .wavelengths
            .iter()
            .zip(&self.values)
            .filter(|(w, _)| (min_nm..=max_nm).contains(*w))
            .map(|(w, v)| (*w, *v))
            .unzip();
        if wavelengths.len() < 2 {
            return Err(FrameError::TooShort(wavelengths.len()));
        }
        Ok(Self {
            wavelengths,
            values,
            ..self.clone()
        })
    }
    pub fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }
    /// Calendar day of the frame timestamp
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date()
    }
    pub fn angle_deg(&self) -> f64 {
        self.angle_deg
    }
    /// Cosine of the solar zenith angle
    pub fn mu0(&self) -> f64 {
        self.angle_deg.to_radians().cos()
    }
    pub fn source(&self) -> &str {
        &self.source
    }
    pub fn wavelengths(&self) -> &[f64] {
        &self.wavelengths
    }
    pub fn values(&self) -> &[f64] {
        &self.values
    }
    pub fn len(&self) -> usize {
        self.wavelengths.len()
    }
    pub fn is_empty(&self) -> bool {
        self.wavelengths.is_empty()
    }
    /// Wavelength range `(first, last)`
    pub fn domain(&self) -> (f64, f64) {
        (
            self.wavelengths[0],
            self.wavelengths[self.wavelengths.len() - 1],
        )
    }
    /// Value at the exact wavelength, if it is on the grid
    pub fn value_at(&self, wavelength: f64) -> Option<f64> {
        self.wavelengths
            .binary_search_by(|w| w.total_cmp(&wavelength))
            .ok()
            .map(|i| self.values[i])
    }
    /// Number of finite values
    pub fn n_finite(&self) -> usize {
        self.values.iter().filter(|v| v.is_finite()).count()
    }
}
impl fmt::Display for SpectralFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (lo, hi) = self.domain();
        write!(
            f,
            "{} @ {} (SZA {:.2}deg): {} samples in [{}-{}]nm",
            self.source,
            self.timestamp,
            self.angle_deg,
            self.len(),
            lo,
            hi
        )
    }
}

/// Stable sort by wavelength, dropping repeated wavelengths after the first
fn sorted_unique(wavelengths: Vec<f64>, values: Vec<f64>) -> (Vec<f64>, Vec<f64>) {
    let mut pairs: Vec<(f64, f64)> = wavelengths.into_iter().zip(values).collect();
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
    pairs.dedup_by(|b, a| a.0 == b.0);
    pairs.into_iter().unzip()
}
