//! Consistency check of the measurement units
//!
//! Compares the integral of the measured spectra with the broadband value
//! reported by the instrument. The check is informational, nothing is
//! converted.

use std::fmt;

use crate::{measurements::MeasurementSeries, ratio::broadband};

/// Number of rows sampled over the series
const N_SAMPLE: usize = 200;
/// Reported broadband medians below this are taken as kW/m²
const KILOWATT_THRESHOLD: f64 = 5.;

/// Outcome of the unit sanity check
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitCheck {
    /// Number of sampled rows with a reported broadband value
    pub n_rows: usize,
    /// Median of the reported broadband values, as found in the files
    pub reported_median: f64,
    pub reported_in_kilowatts: bool,
    /// Median ratio of the spectral integrals to the reported values in W/m²
    pub integrated_to_reported: f64,
}
impl UnitCheck {
    /// Runs the check on a subsample of the series
    ///
    /// Returns `None` if no row carries a reported broadband value.
    pub fn run(series: &MeasurementSeries) -> Option<Self> {
        let step = (series.len() / N_SAMPLE).max(1);
        let pairs: Vec<(f64, f64)> = series
            .rows()
            .iter()
            .step_by(step)
            .filter_map(|row| row.reported_broadband().map(|r| (broadband(row), r)))
            .collect();
        if pairs.is_empty() {
            return None;
        }
        let reported_median = median(pairs.iter().map(|p| p.1).collect());
        let reported_in_kilowatts = reported_median < KILOWATT_THRESHOLD;
        let scale = if reported_in_kilowatts { 1e3 } else { 1. };
        let ratios: Vec<f64> = pairs
            .iter()
            .map(|(integrated, reported)| (integrated, reported * scale))
            .filter(|(i, r)| i.is_finite() && **i > 0. && r.is_finite() && *r > 0.)
            .map(|(i, r)| i / r)
            .collect();
        let check = Self {
            n_rows: pairs.len(),
            reported_median,
            reported_in_kilowatts,
            integrated_to_reported: median(ratios),
        };
        log::info!("{}", check);
        Some(check)
    }
}
impl fmt::Display for UnitCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "reported broadband looks like {} (median {:.3} over {} rows), median integrated/reported: {:.3}",
            if self.reported_in_kilowatts {
                "kW/m²"
            } else {
                "W/m²"
            },
            self.reported_median,
            self.n_rows,
            self.integrated_to_reported
        )
    }
}

fn median(mut values: Vec<f64>) -> f64 {
    values.retain(|v| v.is_finite());
    if values.is_empty() {
        return f64::NAN;
    }
    values.sort_by(f64::total_cmp);
    let n = values.len();
    if n % 2 == 1 {
        values[n / 2]
    } else {
        0.5 * (values[n / 2 - 1] + values[n / 2])
    }
}
