//! Day by day reconciliation of the measurements with the model spectra
//!
//! The catalog and the measurement series are built once, then every day of
//! the series is processed independently: matching, resampling, ratios and
//! daily reduction. A failing day is recorded and the run goes on.

use std::fmt;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use indicatif::{ParallelProgressIterator, ProgressBar, ProgressIterator};
use rayon::prelude::*;

use crate::{
    catalog::{ModelCatalog, ModelReader},
    config::{Config, ConfigError, MatchMode},
    daily::{aggregate_hourly, AggregateError, DailyAggregator, DailySummary, HourlySummary},
    events::{AeronetInversions, EventError, EventSource},
    frame::{FrameError, SpectralFrame},
    interp::SpectralInterpolator,
    matcher::{MatchedPair, Matcher, ZenithWindow},
    measurements::MeasurementSeries,
    ratio::RatioEngine,
    Result,
};

/// Reasons a day is left out of the results
#[derive(Debug, thiserror::Error)]
pub enum DayError {
    #[error("no model files for {0}")]
    NoModelForDate(NaiveDate),
    #[error("no events for {0}")]
    NoEvents(NaiveDate, #[source] EventError),
    #[error("no measurement within {tolerance_min}min of the events of {date}{}", nearest(.nearest_min))]
    NoEventMatch {
        date: NaiveDate,
        tolerance_min: f64,
        nearest_min: Option<f64>,
    },
    #[error("no measurement matched a model run within {angle_tolerance}deg on {date}")]
    NoMatchedPair { date: NaiveDate, angle_tolerance: f64 },
    #[error("invalid ratio curve on {0}")]
    Frame(NaiveDate, #[source] FrameError),
    #[error(transparent)]
    Aggregate(#[from] AggregateError),
}

fn nearest(nearest_min: &Option<f64>) -> String {
    nearest_min
        .map(|m| format!(" (nearest is {:.1}min away)", m))
        .unwrap_or_default()
}

/// Ratio of a measurement and of its model
#[derive(Debug, Clone)]
pub struct RatioCurve {
    pub anchor: NaiveDateTime,
    pub time_delta: Duration,
    pub model_angle_deg: f64,
    pub model_file: String,
    /// Measured irradiance [W/m²/nm]
    pub measured: SpectralFrame,
    /// Model irradiance on the measurement grid [W/m²/nm]
    pub modelled: Vec<f64>,
    pub ratio: SpectralFrame,
    pub broadband_ratio: f64,
}

/// Results of a day
#[derive(Debug, Clone)]
pub struct DayResult {
    pub date: NaiveDate,
    pub curves: Vec<RatioCurve>,
    pub summary: DailySummary,
    pub hourly: Vec<HourlySummary>,
    /// Number of rows or events without a pair
    pub n_unmatched: usize,
    /// With minimum zenith matching, whether the row came from the time window
    pub in_window: Option<bool>,
}
impl DayResult {
    /// Mean of the finite broadband ratios
    pub fn mean_broadband_ratio(&self) -> f64 {
        let (sum, n) = self
            .curves
            .iter()
            .map(|c| c.broadband_ratio)
            .filter(|r| r.is_finite())
            .fold((0., 0usize), |(sum, n), r| (sum + r, n + 1));
        if n > 0 {
            sum / n as f64
        } else {
            f64::NAN
        }
    }
}

/// Results of a pipeline run
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Results per day, in chronological order
    pub days: Vec<(NaiveDate, std::result::Result<DayResult, DayError>)>,
    pub files_loaded: usize,
    pub files_skipped: usize,
    pub rows_skipped: usize,
    pub models_indexed: usize,
    pub models_skipped: usize,
}
impl RunSummary {
    pub fn processed(&self) -> impl Iterator<Item = &DayResult> {
        self.days.iter().filter_map(|(_, day)| day.as_ref().ok())
    }
    pub fn skipped(&self) -> impl Iterator<Item = (&NaiveDate, &DayError)> {
        self.days
            .iter()
            .filter_map(|(date, day)| day.as_ref().err().map(|e| (date, e)))
    }
}
impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "measurement files: {} loaded, {} skipped ({} rows skipped)",
            self.files_loaded, self.files_skipped, self.rows_skipped
        )?;
        writeln!(
            f,
            "model files: {} indexed, {} skipped",
            self.models_indexed, self.models_skipped
        )?;
        write!(
            f,
            "days: {} processed, {} skipped",
            self.processed().count(),
            self.skipped().count()
        )
    }
}

/// Selection of the measurements of a day
enum Anchors {
    Rows,
    Events {
        source: Box<dyn EventSource + Send + Sync>,
        tolerance_min: f64,
    },
    MinimumZenith(ZenithWindow),
}

/// Model/measurement reconciliation pipeline
pub struct Pipeline {
    config: Config,
    catalog: ModelCatalog,
    series: MeasurementSeries,
    anchors: Anchors,
    engine: RatioEngine,
}
impl Pipeline {
    /// Validates the configuration, indexes the model files and loads the measurements
    pub fn new(config: Config) -> Result<Self> {
        let config = config.validate()?;
        let model_root = config
            .model_root
            .clone()
            .ok_or(ConfigError::MissingModelRoot)?;
        let angle_tolerance = config
            .angle_tolerance
            .ok_or(ConfigError::MissingAngleTolerance)?;
        let catalog = ModelCatalog::builder(model_root, angle_tolerance)
            .extension(config.model_extension.as_str())
            .build()?;
        let series = MeasurementSeries::loader(config.measurement_units)
            .band(config.band.0, config.band.1)
            .load(&config.measurements)?;
        let events: Option<Box<dyn EventSource + Send + Sync>> = match config.match_mode {
            MatchMode::Events => {
                let dir = config.event_dir.as_ref().ok_or(ConfigError::MissingEventDir)?;
                Some(Box::new(AeronetInversions::scan(dir, config.site.as_deref())?))
            }
            MatchMode::Direct | MatchMode::MinimumZenith => None,
        };
        Self::with_parts(config, catalog, series, events)
    }
    /// Creates a pipeline from already built parts
    ///
    /// The configuration is validated, and `events` must be given if and
    /// only if the matching mode is [MatchMode::Events].
    pub fn with_parts(
        config: Config,
        catalog: ModelCatalog,
        series: MeasurementSeries,
        events: Option<Box<dyn EventSource + Send + Sync>>,
    ) -> Result<Self> {
        let config = config.validate()?;
        let anchors = match (config.match_mode, events) {
            (MatchMode::Events, Some(source)) => Anchors::Events {
                source,
                tolerance_min: config
                    .time_tolerance
                    .ok_or(ConfigError::MissingTimeTolerance)?,
            },
            (MatchMode::Events, None) => return Err(ConfigError::MissingEventSource.into()),
            (mode, Some(_)) => return Err(ConfigError::UnusedEventSource(mode).into()),
            (MatchMode::Direct, None) => Anchors::Rows,
            (MatchMode::MinimumZenith, None) => Anchors::MinimumZenith(config.zenith_window),
        };
        let engine = RatioEngine::new(SpectralInterpolator::new(config.extrapolation));
        Ok(Self {
            config,
            catalog,
            series,
            anchors,
            engine,
        })
    }
    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }
    pub fn series(&self) -> &MeasurementSeries {
        &self.series
    }
    /// Processes every day of the measurement series
    pub fn run(&self) -> RunSummary {
        let dates = self.series.dates();
        log::info!("Processing {} days", dates.len());
        let pb = ProgressBar::new(dates.len() as u64);
        let days: Vec<_> = if self.config.parallel {
            dates
                .par_iter()
                .progress_with(pb)
                .map(|date| (*date, self.process_day(*date)))
                .collect()
        } else {
            dates
                .iter()
                .progress_with(pb)
                .map(|date| (*date, self.process_day(*date)))
                .collect()
        };
        for (date, day) in &days {
            match day {
                Ok(result) => log::info!(
                    "{}: {} curves, {}",
                    date,
                    result.summary.n_samples,
                    result.summary.stats()
                ),
                Err(e) => log::warn!("{} skipped: {}", date, e),
            }
        }
        let summary = RunSummary {
            days,
            files_loaded: self.series.files_loaded(),
            files_skipped: self.series.skipped_files().len(),
            rows_skipped: self.series.rows_skipped(),
            models_indexed: self.catalog.len(),
            models_skipped: self.catalog.skipped().len(),
        };
        log::info!("{}", summary);
        summary
    }
    /// Processes a single day
    pub fn process_day(&self, date: NaiveDate) -> std::result::Result<DayResult, DayError> {
        if self.catalog.entries(date).is_empty() {
            return Err(DayError::NoModelForDate(date));
        }
        let rows = self.series.rows_for_date(date);
        let matcher = Matcher::new(&self.catalog)
            .reader(
                ModelReader::default()
                    .header_lines(self.config.model_header_lines)
                    .units(self.config.model_units),
            )
            .quantity(self.config.quantity)
            .direct_column(self.config.direct_column);
        let angle_tolerance = self.catalog.angle_tolerance();

        let mut in_window = None;
        let (pairs, n_unmatched) = match &self.anchors {
            Anchors::Events {
                source,
                tolerance_min,
            } => {
                let tolerance_min = *tolerance_min;
                let events = source
                    .events(date)
                    .map_err(|e| DayError::NoEvents(date, e))?;
                if events.is_empty() {
                    return Err(DayError::NoEvents(date, EventError::NoEvents(date)));
                }
                let tolerance = Duration::milliseconds((tolerance_min * 60e3).round() as i64);
                let matches = matcher.match_events(date, &events, rows, tolerance);
                if matches.pairs.is_empty() && matches.nearest_rejected().is_some() {
                    return Err(DayError::NoEventMatch {
                        date,
                        tolerance_min,
                        nearest_min: matches
                            .nearest_rejected()
                            .map(|d| d.num_milliseconds() as f64 / 60e3),
                    });
                }
                let n_unmatched = matches.outcomes.len() - matches.pairs.len();
                (matches.pairs, n_unmatched)
            }
            Anchors::Rows => {
                let matches = matcher.match_direct(rows);
                (matches.pairs, matches.skipped.len())
            }
            Anchors::MinimumZenith(window) => {
                let matches = matcher.match_minimum_zenith(date, rows, *window);
                in_window = Some(matches.in_window);
                let n_unmatched = usize::from(matches.skipped.is_some());
                (matches.pair.into_iter().collect::<Vec<_>>(), n_unmatched)
            }
        };
        if pairs.is_empty() {
            return Err(DayError::NoMatchedPair {
                date,
                angle_tolerance,
            });
        }

        let curves = pairs
            .iter()
            .map(|pair| self.ratio_curve(pair))
            .collect::<std::result::Result<Vec<RatioCurve>, FrameError>>()
            .map_err(|e| DayError::Frame(date, e))?;

        let grid = &curves[0].ratio;
        let interpolator = self.engine.interpolator();
        let mut aggregator = DailyAggregator::new(grid.wavelengths().to_vec());
        let mut ratios = Vec::with_capacity(curves.len());
        for curve in &curves {
            let ratio = if curve.ratio.wavelengths() == grid.wavelengths() {
                curve.ratio.clone()
            } else {
                interpolator
                    .resample_frame(&curve.ratio, grid)
                    .map_err(|e| DayError::Frame(date, e))?
            };
            aggregator.push(&ratio)?;
            ratios.push(ratio);
        }
        let summary = aggregator.finish(date)?;
        let hourly = if self.config.hourly {
            aggregate_hourly(date, &ratios)?
        } else {
            vec![]
        };
        Ok(DayResult {
            date,
            curves,
            summary,
            hourly,
            n_unmatched,
            in_window,
        })
    }
    fn ratio_curve(&self, pair: &MatchedPair) -> std::result::Result<RatioCurve, FrameError> {
        let measured = pair.measurement.frame();
        let ratio = self.engine.ratio(&pair.model, measured)?;
        let modelled = self
            .engine
            .interpolator()
            .resample(&pair.model, measured.wavelengths());
        Ok(RatioCurve {
            anchor: pair.anchor,
            time_delta: pair.time_delta,
            model_angle_deg: pair.model.angle_deg(),
            model_file: pair.model.source().to_string(),
            measured: measured.clone(),
            modelled,
            ratio,
            broadband_ratio: self.engine.broadband_ratio(&pair.model, measured),
        })
    }
}
