//! # Spectral ratios
//!
//! Reconciliation of simulated spectral solar irradiance (libRadtran `uvspec`
//! runs at discrete dates and solar zenith angles) with spectroradiometer
//! measurements.
//!
//! The model runs are indexed by a [ModelCatalog], the measurements are loaded
//! into a [MeasurementSeries], the [Matcher] pairs measurements and model runs,
//! the [RatioEngine] computes model to measurement ratios on the measurement
//! grid and the [DailyAggregator] reduces the ratios of a day into a mean
//! curve. The [Pipeline] runs all of it day by day.
//!
//! ```no_run
//! use spectral_ratios::{Config, Pipeline, Report};
//!
//! let config = Config::default()
//!     .model_root("models")
//!     .measurements(vec!["ms711.csv".into()])
//!     .angle_tolerance(0.4);
//! let summary = Pipeline::new(config)?.run();
//! Report::new("results")?.write(&summary)?;
//! # Ok::<(), spectral_ratios::Error>(())
//! ```

pub mod catalog;
pub mod config;
pub mod daily;
pub mod diagnostics;
mod error;
pub mod events;
pub mod frame;
pub mod interp;
pub mod matcher;
pub mod measurements;
pub mod pipeline;
pub mod ratio;
pub mod report;

pub use catalog::{
    AngleTag, CatalogError, DirectColumn, ModelCatalog, ModelCatalogEntry, ModelQuantity,
    ModelReader, ModelSpectrum,
};
pub use config::{Config, ConfigError, MatchMode};
pub use daily::{AggregateError, DailyAggregator, DailySummary};
pub use error::{Error, Result};
pub use events::{AeronetInversions, EventList, EventSource};
pub use frame::{FrameError, SpectralFrame, Units};
pub use interp::{Extrapolation, SpectralInterpolator};
pub use matcher::{MatchedPair, Matcher, ZenithWindow};
pub use measurements::{Measurement, MeasurementError, MeasurementSeries};
pub use pipeline::{DayError, Pipeline, RunSummary};
pub use ratio::{HorizontalBudget, RatioEngine};
pub use report::{Report, ReportError};
