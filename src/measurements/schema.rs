//! Column layout of the spectroradiometer CSV files

use csv::StringRecord;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SchemaError {
    #[error("no spectral column with a wavelength in [{0}, {1}]nm")]
    NoSpectralColumns(f64, f64),
    #[error("no timestamp column (Datetime, datetime, timestamp or time)")]
    MissingTimestamp,
    #[error("no solar zenith angle column (sza_deg, SZA, sza or solar_zenith)")]
    MissingAngle,
}
type Result<T> = std::result::Result<T, SchemaError>;

/// Candidate names of the timestamp column, in order of preference
pub const TIMESTAMP_COLUMNS: [&str; 4] = ["Datetime", "datetime", "timestamp", "time"];
/// Candidate names of the solar zenith angle column, in order of preference
pub const ANGLE_COLUMNS: [&str; 4] = ["sza_deg", "SZA", "sza", "solar_zenith"];
/// Candidate names of the instrument broadband column, in order of preference
pub const BROADBAND_COLUMNS: [&str; 6] = [
    "DNI_integrated_Wm2",
    "dni_integrated",
    "dni_int",
    "GHI_integrated_Wm2",
    "ghi_integrated",
    "ghi_int",
];

/// Spectral channel: column index and wavelength [nm]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Channel {
    pub column: usize,
    pub wavelength: f64,
}

/// Column indices of a measurement file
#[derive(Debug, Clone, PartialEq)]
pub struct SpectralSchema {
    pub timestamp: usize,
    pub angle: usize,
    pub broadband: Option<usize>,
    pub channels: Vec<Channel>,
}
impl SpectralSchema {
    /// Infers the schema from the header of a file
    ///
    /// Every column whose trimmed label is a number within the inclusive band
    /// `[min_nm, max_nm]` is a spectral channel.
    pub fn infer(headers: &StringRecord, min_nm: f64, max_nm: f64) -> Result<Self> {
        let channels: Vec<Channel> = headers
            .iter()
            .enumerate()
            .filter_map(|(column, label)| {
                label
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .filter(|w| w.is_finite() && (min_nm..=max_nm).contains(w))
                    .map(|wavelength| Channel { column, wavelength })
            })
            .collect();
        if channels.is_empty() {
            return Err(SchemaError::NoSpectralColumns(min_nm, max_nm));
        }
        let timestamp =
            find_column(headers, &TIMESTAMP_COLUMNS).ok_or(SchemaError::MissingTimestamp)?;
        let angle = find_column(headers, &ANGLE_COLUMNS).ok_or(SchemaError::MissingAngle)?;
        Ok(Self {
            timestamp,
            angle,
            broadband: find_column(headers, &BROADBAND_COLUMNS),
            channels,
        })
    }
    pub fn wavelengths(&self) -> Vec<f64> {
        self.channels.iter().map(|c| c.wavelength).collect()
    }
}

/// Index of the first candidate present in the header
fn find_column(headers: &StringRecord, candidates: &[&str]) -> Option<usize> {
    candidates
        .iter()
        .find_map(|name| headers.iter().position(|label| label.trim() == *name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infers_channels_within_band() {
        let headers = StringRecord::from(vec![
            "Datetime", "SZA", "300", " 350.5", "700", "1100", "1200", "DNI_integrated_Wm2",
        ]);
        let schema = SpectralSchema::infer(&headers, 350., 1100.).unwrap();
        assert_eq!(schema.timestamp, 0);
        assert_eq!(schema.angle, 1);
        assert_eq!(schema.broadband, Some(7));
        assert_eq!(schema.wavelengths(), vec![350.5, 700., 1100.]);
        assert_eq!(schema.channels[0].column, 3);
    }

    #[test]
    fn candidates_follow_preference_order() {
        let headers = StringRecord::from(vec!["time", "sza", "Datetime", "sza_deg", "500"]);
        let schema = SpectralSchema::infer(&headers, 350., 1100.).unwrap();
        assert_eq!(schema.timestamp, 2);
        assert_eq!(schema.angle, 3);
        assert_eq!(schema.broadband, None);
    }

    #[test]
    fn missing_columns() {
        let headers = StringRecord::from(vec!["Datetime", "SZA", "GHI"]);
        assert_eq!(
            SpectralSchema::infer(&headers, 350., 1100.),
            Err(SchemaError::NoSpectralColumns(350., 1100.))
        );
        let headers = StringRecord::from(vec!["Datetime", "500"]);
        assert_eq!(
            SpectralSchema::infer(&headers, 350., 1100.),
            Err(SchemaError::MissingAngle)
        );
        let headers = StringRecord::from(vec!["date", "sza", "500"]);
        assert_eq!(
            SpectralSchema::infer(&headers, 350., 1100.),
            Err(SchemaError::MissingTimestamp)
        );
    }
}
