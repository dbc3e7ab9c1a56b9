//! Run configuration
//!
//! A [Config] is built with chained setters, optionally overridden from the
//! environment with [Config::with_env] and checked once with [Config::validate]:
//! ```no_run
//! use spectral_ratios::{Config, MatchMode};
//! let config = Config::default()
//!     .model_root("models/epanomi")
//!     .measurements(vec!["ms711/2025-05.csv".into()])
//!     .angle_tolerance(0.4)
//!     .time_tolerance(5.)
//!     .match_mode(MatchMode::Events)
//!     .event_dir("aeronet")
//!     .with_env()?
//!     .validate()?;
//! # Ok::<(), spectral_ratios::ConfigError>(())
//! ```

use std::path::{Path, PathBuf};

use chrono::NaiveTime;
use strum_macros::{EnumIter, EnumString};

use crate::{
    catalog::{DirectColumn, ModelQuantity},
    frame::Units,
    interp::Extrapolation,
    matcher::ZenithWindow,
};

/// Model directory override
pub const MODEL_ROOT_VAR: &str = "SPECTRAL_MODEL_ROOT";
/// Angle tolerance override [deg]
pub const ANGLE_TOLERANCE_VAR: &str = "SPECTRAL_ANGLE_TOLERANCE_DEG";
/// Time tolerance override [minute]
pub const TIME_TOLERANCE_VAR: &str = "SPECTRAL_TIME_TOLERANCE_MIN";

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("the model directory is not set")]
    MissingModelRoot,
    #[error("no measurement file given")]
    NoMeasurementFiles,
    #[error("the angle tolerance is not set")]
    MissingAngleTolerance,
    #[error("event matching requires a time tolerance")]
    MissingTimeTolerance,
    #[error("event matching requires an event directory")]
    MissingEventDir,
    #[error("event matching requires an event source")]
    MissingEventSource,
    #[error("an event source is given for {0} matching")]
    UnusedEventSource(MatchMode),
    #[error("invalid time window {0}-{1}")]
    ZenithWindow(NaiveTime, NaiveTime),
    #[error("{0} tolerance must be a finite non-negative number, found {1}")]
    Tolerance(&'static str, f64),
    #[error("invalid spectral band [{0}, {1}]nm")]
    Band(f64, f64),
    #[error("invalid value {1:?} for environment variable {0}")]
    Env(&'static str, String),
}
type Result<T> = std::result::Result<T, ConfigError>;

/// Matching strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, EnumIter, EnumString, strum_macros::Display)]
#[strum(ascii_case_insensitive)]
pub enum MatchMode {
    /// Every measurement row is matched to a model run
    #[default]
    #[strum(serialize = "direct")]
    Direct,
    /// Only the rows closest to external events are matched
    #[strum(serialize = "events")]
    Events,
    /// Only the row of the day with the smallest solar zenith angle is matched
    #[strum(serialize = "minimum-zenith", serialize = "min-sza")]
    MinimumZenith,
}

/// Pipeline configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub model_root: Option<PathBuf>,
    pub model_extension: String,
    pub model_header_lines: usize,
    pub model_units: Units,
    pub quantity: ModelQuantity,
    pub direct_column: DirectColumn,
    pub measurements: Vec<PathBuf>,
    pub measurement_units: Units,
    pub band: (f64, f64),
    pub angle_tolerance: Option<f64>,
    pub time_tolerance: Option<f64>,
    pub match_mode: MatchMode,
    pub event_dir: Option<PathBuf>,
    pub site: Option<String>,
    pub zenith_window: ZenithWindow,
    pub extrapolation: Extrapolation,
    pub hourly: bool,
    pub parallel: bool,
    pub output_dir: PathBuf,
}
impl Default for Config {
    fn default() -> Self {
        Self {
            model_root: None,
            model_extension: String::from("out"),
            model_header_lines: 0,
            model_units: Units::WattsPerNm,
            quantity: ModelQuantity::DirectNormal,
            direct_column: DirectColumn::Horizontal,
            measurements: vec![],
            measurement_units: Units::WattsPerNm,
            band: (350., 1100.),
            angle_tolerance: None,
            time_tolerance: None,
            match_mode: MatchMode::Direct,
            event_dir: None,
            site: None,
            zenith_window: ZenithWindow::default(),
            extrapolation: Extrapolation::Nan,
            hourly: false,
            parallel: true,
            output_dir: PathBuf::from("."),
        }
    }
}
impl Config {
    /// Root of the model files tree
    pub fn model_root<P: AsRef<Path>>(self, model_root: P) -> Self {
        Self {
            model_root: Some(model_root.as_ref().to_path_buf()),
            ..self
        }
    }
    /// Model files extension, default: `out`
    pub fn model_extension<S: Into<String>>(self, model_extension: S) -> Self {
        Self {
            model_extension: model_extension.into(),
            ..self
        }
    }
    /// Lines skipped at the top of the model files, default: 0
    pub fn model_header_lines(self, model_header_lines: usize) -> Self {
        Self {
            model_header_lines,
            ..self
        }
    }
    pub fn model_units(self, model_units: Units) -> Self {
        Self {
            model_units,
            ..self
        }
    }
    /// Model quantity compared to the measurements, default: DNI
    pub fn quantity(self, quantity: ModelQuantity) -> Self {
        Self { quantity, ..self }
    }
    pub fn direct_column(self, direct_column: DirectColumn) -> Self {
        Self {
            direct_column,
            ..self
        }
    }
    /// Measurement files
    pub fn measurements(self, measurements: Vec<PathBuf>) -> Self {
        Self {
            measurements,
            ..self
        }
    }
    pub fn measurement_units(self, measurement_units: Units) -> Self {
        Self {
            measurement_units,
            ..self
        }
    }
    /// Inclusive wavelength band [nm], default: [350, 1100]
    pub fn band(self, min_nm: f64, max_nm: f64) -> Self {
        Self {
            band: (min_nm, max_nm),
            ..self
        }
    }
    /// Maximum solar zenith angle difference between a measurement and a model run [deg]
    pub fn angle_tolerance(self, angle_tolerance: f64) -> Self {
        Self {
            angle_tolerance: Some(angle_tolerance),
            ..self
        }
    }
    /// Maximum time difference between an event and a measurement [minute]
    pub fn time_tolerance(self, time_tolerance: f64) -> Self {
        Self {
            time_tolerance: Some(time_tolerance),
            ..self
        }
    }
    pub fn match_mode(self, match_mode: MatchMode) -> Self {
        Self { match_mode, ..self }
    }
    /// Directory of the AERONET inversion files
    pub fn event_dir<P: AsRef<Path>>(self, event_dir: P) -> Self {
        Self {
            event_dir: Some(event_dir.as_ref().to_path_buf()),
            ..self
        }
    }
    /// AERONET site name, as it appears in the inversion file names
    pub fn site<S: Into<String>>(self, site: S) -> Self {
        Self {
            site: Some(site.into()),
            ..self
        }
    }
    /// Time of day window of the minimum zenith angle search, default: 10:00-10:30
    pub fn zenith_window(self, start: NaiveTime, end: NaiveTime) -> Self {
        Self {
            zenith_window: ZenithWindow::new(start, end),
            ..self
        }
    }
    pub fn extrapolation(self, extrapolation: Extrapolation) -> Self {
        Self {
            extrapolation,
            ..self
        }
    }
    /// Also reduces the curves per hour of the day
    pub fn hourly(self, hourly: bool) -> Self {
        Self { hourly, ..self }
    }
    /// Processes the days in parallel, default: true
    pub fn parallel(self, parallel: bool) -> Self {
        Self { parallel, ..self }
    }
    pub fn output_dir<P: AsRef<Path>>(self, output_dir: P) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
            ..self
        }
    }
    /// Applies the `SPECTRAL_*` environment variables overrides
    pub fn with_env(self) -> Result<Self> {
        self.with_vars(|var| std::env::var(var).ok())
    }
    fn with_vars<F>(self, var: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let parse = |name: &'static str| -> Result<Option<f64>> {
            var(name)
                .map(|value| {
                    value
                        .trim()
                        .parse::<f64>()
                        .map_err(|_| ConfigError::Env(name, value.clone()))
                })
                .transpose()
        };
        let mut this = self;
        if let Some(tolerance) = parse(ANGLE_TOLERANCE_VAR)? {
            log::info!("{} overrides the angle tolerance: {}", ANGLE_TOLERANCE_VAR, tolerance);
            this.angle_tolerance = Some(tolerance);
        }
        if let Some(tolerance) = parse(TIME_TOLERANCE_VAR)? {
            log::info!("{} overrides the time tolerance: {}", TIME_TOLERANCE_VAR, tolerance);
            this.time_tolerance = Some(tolerance);
        }
        if let Some(root) = var(MODEL_ROOT_VAR).filter(|root| !root.trim().is_empty()) {
            log::info!("{} overrides the model directory: {}", MODEL_ROOT_VAR, root);
            this.model_root = Some(PathBuf::from(root));
        }
        Ok(this)
    }
    /// Checks the consistency of the configuration
    pub fn validate(self) -> Result<Self> {
        if self.model_root.is_none() {
            return Err(ConfigError::MissingModelRoot);
        }
        if self.measurements.is_empty() {
            return Err(ConfigError::NoMeasurementFiles);
        }
        let angle_tolerance = self
            .angle_tolerance
            .ok_or(ConfigError::MissingAngleTolerance)?;
        check_tolerance("angle", angle_tolerance)?;
        if let Some(time_tolerance) = self.time_tolerance {
            check_tolerance("time", time_tolerance)?;
        }
        let (min_nm, max_nm) = self.band;
        if !min_nm.is_finite() || !max_nm.is_finite() || min_nm >= max_nm {
            return Err(ConfigError::Band(min_nm, max_nm));
        }
        if self.match_mode == MatchMode::Events && self.time_tolerance.is_none() {
            return Err(ConfigError::MissingTimeTolerance);
        }
        let ZenithWindow { start, end } = self.zenith_window;
        if start > end {
            return Err(ConfigError::ZenithWindow(start, end));
        }
        Ok(self)
    }
}

fn check_tolerance(name: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0. {
        Ok(())
    } else {
        Err(ConfigError::Tolerance(name, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base() -> Config {
        Config::default()
            .model_root("models")
            .measurements(vec!["ms711.csv".into()])
            .angle_tolerance(0.4)
    }

    #[test]
    fn tolerances_are_required() {
        assert_eq!(
            Config::default()
                .model_root("models")
                .measurements(vec!["ms711.csv".into()])
                .validate(),
            Err(ConfigError::MissingAngleTolerance)
        );
        assert_eq!(
            base().match_mode(MatchMode::Events).event_dir("aeronet").validate(),
            Err(ConfigError::MissingTimeTolerance)
        );
        assert!(base()
            .match_mode(MatchMode::Events)
            .event_dir("aeronet")
            .time_tolerance(5.)
            .validate()
            .is_ok());
    }

    #[test]
    fn malformed_values() {
        assert_eq!(
            base().angle_tolerance(-0.1).validate(),
            Err(ConfigError::Tolerance("angle", -0.1))
        );
        assert!(matches!(
            base().time_tolerance(f64::NAN).validate(),
            Err(ConfigError::Tolerance("time", _))
        ));
        assert_eq!(
            base().band(1100., 350.).validate(),
            Err(ConfigError::Band(1100., 350.))
        );
        assert_eq!(
            base().measurements(vec![]).validate(),
            Err(ConfigError::NoMeasurementFiles)
        );
        let (t10, t11) = (
            NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(11, 0, 0).unwrap(),
        );
        assert_eq!(
            base().zenith_window(t11, t10).validate(),
            Err(ConfigError::ZenithWindow(t11, t10))
        );
        assert!(base().zenith_window(t10, t10).validate().is_ok());
    }

    #[test]
    fn environment_overrides() {
        let vars: HashMap<&str, &str> = [
            (ANGLE_TOLERANCE_VAR, "0.5"),
            (TIME_TOLERANCE_VAR, " 3 "),
            (MODEL_ROOT_VAR, "/data/models"),
        ]
        .into_iter()
        .collect();
        let config = base()
            .with_vars(|var| vars.get(var).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.angle_tolerance, Some(0.5));
        assert_eq!(config.time_tolerance, Some(3.));
        assert_eq!(config.model_root, Some(PathBuf::from("/data/models")));

        let unchanged = base().with_vars(|_| None).unwrap();
        assert_eq!(unchanged, base());

        assert_eq!(
            base().with_vars(|var| (var == ANGLE_TOLERANCE_VAR).then(|| "wide".to_string())),
            Err(ConfigError::Env(ANGLE_TOLERANCE_VAR, "wide".to_string()))
        );
    }

    #[test]
    fn output_directory() {
        assert_eq!(Config::default().output_dir, PathBuf::from("."));
        let config = base().output_dir("results").validate().unwrap();
        assert_eq!(config.output_dir, PathBuf::from("results"));
    }

    #[test]
    fn match_mode_from_str() {
        assert_eq!("Events".parse::<MatchMode>().unwrap(), MatchMode::Events);
        assert_eq!(MatchMode::Direct.to_string(), "direct");
        assert_eq!("min-sza".parse::<MatchMode>().unwrap(), MatchMode::MinimumZenith);
        assert_eq!(MatchMode::MinimumZenith.to_string(), "minimum-zenith");
    }
}
