//! Daily reduction of the ratio curves

use std::{collections::BTreeMap, fmt};

use chrono::{NaiveDate, Timelike};

use crate::frame::SpectralFrame;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum AggregateError {
    #[error("curve {source_name} is not on the aggregation grid ({found} vs {expected} wavelengths)")]
    GridMismatch {
        source_name: String,
        expected: usize,
        found: usize,
    },
    #[error("no finite ratio on {0}")]
    NoValidOverlap(NaiveDate),
}
type Result<T> = std::result::Result<T, AggregateError>;

/// Median and 10th/90th percentiles of a daily mean curve
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatioStats {
    pub median: f64,
    pub p10: f64,
    pub p90: f64,
}
impl fmt::Display for RatioStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "median={:.3} p10={:.3} p90={:.3}",
            self.median, self.p10, self.p90
        )
    }
}

/// Mean ratio curve of a day
#[derive(Debug, Clone, PartialEq)]
pub struct DailySummary {
    pub date: NaiveDate,
    pub wavelengths: Vec<f64>,
    pub mean_ratio: Vec<f64>,
    /// Number of curves with at least one finite ratio
    pub n_samples: usize,
    /// Number of finite ratios per wavelength
    pub coverage: Vec<usize>,
}
impl DailySummary {
    /// Statistics of the finite mean ratios
    pub fn stats(&self) -> RatioStats {
        let mut values: Vec<f64> = self
            .mean_ratio
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .collect();
        values.sort_by(f64::total_cmp);
        RatioStats {
            median: percentile(&values, 0.5),
            p10: percentile(&values, 0.1),
            p90: percentile(&values, 0.9),
        }
    }
    /// Number of wavelengths with a finite mean ratio
    pub fn n_channels(&self) -> usize {
        self.coverage.iter().filter(|c| **c > 0).count()
    }
}

/// Linear interpolation between the closest ranks of sorted `values`
fn percentile(values: &[f64], p: f64) -> f64 {
    match values.len() {
        0 => f64::NAN,
        1 => values[0],
        n => {
            let rank = p * (n - 1) as f64;
            let i = rank.floor() as usize;
            if i + 1 >= n {
                return values[n - 1];
            }
            let frac = rank - i as f64;
            values[i] + (values[i + 1] - values[i]) * frac
        }
    }
}

/// Accumulates the ratio curves of a day
#[derive(Debug, Clone)]
pub struct DailyAggregator {
    wavelengths: Vec<f64>,
    sum: Vec<f64>,
    coverage: Vec<usize>,
    n_samples: usize,
}
impl DailyAggregator {
    /// Creates an aggregator on the `wavelengths` grid
    pub fn new(wavelengths: Vec<f64>) -> Self {
        let n = wavelengths.len();
        Self {
            wavelengths,
            sum: vec![0.; n],
            coverage: vec![0; n],
            n_samples: 0,
        }
    }
    /// Adds a ratio curve, it must be on the aggregator grid
    pub fn push(&mut self, curve: &SpectralFrame) -> Result<()> {
        if curve.wavelengths() != self.wavelengths.as_slice() {
            return Err(AggregateError::GridMismatch {
                source_name: curve.source().to_string(),
                expected: self.wavelengths.len(),
                found: curve.len(),
            });
        }
        let mut any_finite = false;
        for ((sum, count), value) in self
            .sum
            .iter_mut()
            .zip(self.coverage.iter_mut())
            .zip(curve.values())
        {
            if value.is_finite() {
                *sum += value;
                *count += 1;
                any_finite = true;
            }
        }
        if any_finite {
            self.n_samples += 1;
        }
        Ok(())
    }
    pub fn n_samples(&self) -> usize {
        self.n_samples
    }
    /// Reduces the curves into the mean ratio of `date`
    pub fn finish(self, date: NaiveDate) -> Result<DailySummary> {
        if self.n_samples == 0 {
            return Err(AggregateError::NoValidOverlap(date));
        }
        let mean_ratio = self
            .sum
            .iter()
            .zip(&self.coverage)
            .map(|(sum, count)| {
                if *count > 0 {
                    sum / *count as f64
                } else {
                    f64::NAN
                }
            })
            .collect();
        Ok(DailySummary {
            date,
            wavelengths: self.wavelengths,
            mean_ratio,
            n_samples: self.n_samples,
            coverage: self.coverage,
        })
    }
}

/// Mean ratio curve of an hour of the day
#[derive(Debug, Clone, PartialEq)]
pub struct HourlySummary {
    pub hour: u32,
    pub summary: DailySummary,
}

/// Summarizes the curves of `date` per hour
///
/// Hours without any finite ratio are left out.
pub fn aggregate_hourly(date: NaiveDate, curves: &[SpectralFrame]) -> Result<Vec<HourlySummary>> {
    let mut hours: BTreeMap<u32, Vec<&SpectralFrame>> = BTreeMap::new();
    for curve in curves.iter().filter(|curve| curve.date() == date) {
        hours.entry(curve.timestamp().hour()).or_default().push(curve);
    }
    let mut summaries = vec![];
    for (hour, curves) in hours {
        let mut aggregator = DailyAggregator::new(curves[0].wavelengths().to_vec());
        for curve in curves {
            aggregator.push(curve)?;
        }
        match aggregator.finish(date) {
            Ok(summary) => summaries.push(HourlySummary { hour, summary }),
            Err(AggregateError::NoValidOverlap(_)) => {
                log::debug!("{} {:02}h: no finite ratio", date, hour)
            }
            Err(e) => return Err(e),
        }
    }
    Ok(summaries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 5, 10).unwrap()
    }
    fn curve(hour: u32, values: Vec<f64>) -> SpectralFrame {
        SpectralFrame::new(
            day().and_hms_opt(hour, 0, 0).unwrap(),
            40.,
            "ratio",
            vec![400., 700., 1100.],
            values,
        )
        .unwrap()
    }

    #[test]
    fn single_curve_is_its_own_mean() {
        let c = curve(10, vec![0.9, f64::NAN, 1.1]);
        let mut aggregator = DailyAggregator::new(c.wavelengths().to_vec());
        aggregator.push(&c).unwrap();
        let summary = aggregator.finish(day()).unwrap();
        assert_eq!(summary.n_samples, 1);
        assert_eq!(summary.mean_ratio[0], 0.9);
        assert!(summary.mean_ratio[1].is_nan());
        assert_eq!(summary.mean_ratio[2], 1.1);
        assert_eq!(summary.n_channels(), 2);
    }

    #[test]
    fn coverage_counts_finite_contributions() {
        let curves = [
            curve(9, vec![1., 1., 1.]),
            curve(10, vec![2., 2., f64::NAN]),
            curve(11, vec![3., 3., 2.]),
            curve(12, vec![f64::NAN; 3]),
        ];
        let mut aggregator = DailyAggregator::new(vec![400., 700., 1100.]);
        for c in &curves {
            aggregator.push(c).unwrap();
        }
        let summary = aggregator.finish(day()).unwrap();
        assert_eq!(summary.n_samples, 3);
        assert_eq!(summary.coverage, vec![3, 3, 2]);
        assert_relative_eq!(summary.mean_ratio[0], 2.);
        assert_relative_eq!(summary.mean_ratio[2], 1.5);
    }

    #[test]
    fn no_finite_ratio_is_not_a_summary() {
        let mut aggregator = DailyAggregator::new(vec![400., 700., 1100.]);
        aggregator.push(&curve(9, vec![f64::NAN; 3])).unwrap();
        assert_eq!(
            aggregator.finish(day()),
            Err(AggregateError::NoValidOverlap(day()))
        );
    }

    #[test]
    fn grid_mismatch() {
        let mut aggregator = DailyAggregator::new(vec![400., 700.]);
        assert!(matches!(
            aggregator.push(&curve(9, vec![1.; 3])),
            Err(AggregateError::GridMismatch { expected: 2, found: 3, .. })
        ));
    }

    #[test]
    fn percentiles() {
        let summary = DailySummary {
            date: day(),
            wavelengths: vec![1., 2., 3., 4., 5., 6.],
            mean_ratio: vec![4., 1., f64::NAN, 3., 2., 5.],
            n_samples: 1,
            coverage: vec![1, 1, 0, 1, 1, 1],
        };
        let stats = summary.stats();
        assert_relative_eq!(stats.median, 3.);
        assert_relative_eq!(stats.p10, 1.4, epsilon = 1e-12);
        assert_relative_eq!(stats.p90, 4.6, epsilon = 1e-12);
    }

    #[test]
    fn hourly_groups() {
        let curves = [
            curve(9, vec![1., 1., 1.]),
            curve(9, vec![3., 3., 3.]),
            curve(10, vec![f64::NAN; 3]),
            curve(11, vec![2., 2., 2.]),
        ];
        let hourly = aggregate_hourly(day(), &curves).unwrap();
        assert_eq!(hourly.len(), 2);
        assert_eq!(hourly[0].hour, 9);
        assert_eq!(hourly[0].summary.n_samples, 2);
        assert_relative_eq!(hourly[0].summary.mean_ratio[1], 2.);
        assert_eq!(hourly[1].hour, 11);
    }
}
