//! Flat file outputs of a run
//!
//! All the tables are CSV files written in the output directory:
//!  - `daily_summary.csv`: one row per processed day,
//!  - `daily_ratios_long.csv`: one row per day and wavelength,
//!  - `spectral_ratios_long.csv`: one row per curve and wavelength, finite ratios only,
//!  - `hourly_ratios_long.csv`: one row per day, hour and wavelength, if any,
//!  - `skipped_days.csv`: the days left out and why,
//!  - `minimum_zenith_summary.csv`: the row and model run selected each day,
//!    with minimum zenith matching only,
//!  - `<date>_mean_ratio.csv`: the mean ratio curve of each day.
//!
//! With the `plot` feature, `<date>_ratios.svg` shows the curves of each day
//! and their mean.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use serde::Serialize;

use crate::{pipeline::RunSummary, ratio::HorizontalBudget};

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("failed to create the output directory {1:?}")]
    Io(#[source] io::Error, PathBuf),
    #[error("failed to write CSV file")]
    Csv(#[from] csv::Error),
    #[cfg(feature = "plot")]
    #[error("failed to draw {1:?}: {0}")]
    Plot(String, PathBuf),
}
type Result<T> = std::result::Result<T, ReportError>;

#[derive(Serialize)]
struct DailyRecord {
    date: String,
    n_samples: usize,
    n_channels: usize,
    n_unmatched: usize,
    median_ratio: f64,
    p10_ratio: f64,
    p90_ratio: f64,
    mean_broadband_ratio: f64,
}

#[derive(Serialize)]
struct DailyCurveRecord {
    date: String,
    wavelength_nm: f64,
    mean_ratio: f64,
    coverage: usize,
}

#[derive(Serialize)]
struct HourlyCurveRecord {
    date: String,
    hour: u32,
    wavelength_nm: f64,
    mean_ratio: f64,
    coverage: usize,
}

#[derive(Serialize)]
struct SpectralRecord {
    timestamp: String,
    date: String,
    sza_measured_deg: f64,
    sza_model_deg: f64,
    time_delta_s: i64,
    model_file: String,
    wavelength_nm: f64,
    measured_w_m2_nm: f64,
    modelled_w_m2_nm: f64,
    ratio: f64,
}

#[derive(Serialize)]
struct MinimumZenithRecord {
    date: String,
    timestamp: String,
    sza_measured_deg: f64,
    in_window: bool,
    model_file: String,
    sza_model_deg: f64,
    n_wavelengths: usize,
}

#[derive(Serialize)]
struct SkippedDayRecord {
    date: String,
    reason: String,
}

/// Budget table row: a model run and its horizontal budget
#[derive(Debug, Serialize)]
pub struct BudgetRecord {
    pub date: String,
    pub file: String,
    pub sza_deg: f64,
    pub mu0: f64,
    pub direct_horizontal_w_m2: f64,
    pub diffuse_down_w_m2: f64,
    pub diffuse_up_w_m2: f64,
    pub global_horizontal_w_m2: f64,
    pub dni_reconstructed_w_m2: f64,
    pub ghi_from_identity_w_m2: f64,
    pub ghi_identity_error_w_m2: f64,
}
impl BudgetRecord {
    pub fn new(date: chrono::NaiveDate, budget: HorizontalBudget) -> Self {
        Self {
            date: date.to_string(),
            file: budget.file,
            sza_deg: budget.angle_deg,
            mu0: budget.mu0,
            direct_horizontal_w_m2: budget.direct_horizontal,
            diffuse_down_w_m2: budget.diffuse_down,
            diffuse_up_w_m2: budget.diffuse_up,
            global_horizontal_w_m2: budget.global_horizontal,
            dni_reconstructed_w_m2: budget.dni_reconstructed,
            ghi_from_identity_w_m2: budget.ghi_from_identity,
            ghi_identity_error_w_m2: budget.identity_error,
        }
    }
}

/// Writes the model budget table
pub fn write_budget<P: AsRef<Path>>(path: P, records: &[BudgetRecord]) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path.as_ref())?;
    for record in records {
        wtr.serialize(record)?;
    }
    wtr.flush().map_err(csv::Error::from)?;
    log::info!("{} model runs written to {:?}", records.len(), path.as_ref());
    Ok(())
}

/// Run outputs writer
#[derive(Debug, Clone)]
pub struct Report {
    output_dir: PathBuf,
}
impl Report {
    /// Creates the output directory if needed
    pub fn new<P: AsRef<Path>>(output_dir: P) -> Result<Self> {
        let output_dir = output_dir.as_ref().to_path_buf();
        fs::create_dir_all(&output_dir).map_err(|e| ReportError::Io(e, output_dir.clone()))?;
        Ok(Self { output_dir })
    }
    pub fn path<S: AsRef<str>>(&self, file_name: S) -> PathBuf {
        self.output_dir.join(file_name.as_ref())
    }
    /// Writes all the tables of a run
    pub fn write(&self, summary: &RunSummary) -> Result<()> {
        self.daily_summary(summary)?;
        self.daily_curves(summary)?;
        self.spectral_ratios(summary)?;
        self.hourly_curves(summary)?;
        self.skipped_days(summary)?;
        self.minimum_zenith(summary)?;
        #[cfg(feature = "plot")]
        for day in summary.processed() {
            plot::day_curves(day, self.path(format!("{}_ratios.svg", day.date)))?;
        }
        log::info!("Outputs written to {:?}", self.output_dir);
        Ok(())
    }
    fn daily_summary(&self, summary: &RunSummary) -> Result<()> {
        let mut wtr = csv::Writer::from_path(self.path("daily_summary.csv"))?;
        for day in summary.processed() {
            let stats = day.summary.stats();
            wtr.serialize(DailyRecord {
                date: day.date.to_string(),
                n_samples: day.summary.n_samples,
                n_channels: day.summary.n_channels(),
                n_unmatched: day.n_unmatched,
                median_ratio: stats.median,
                p10_ratio: stats.p10,
                p90_ratio: stats.p90,
                mean_broadband_ratio: day.mean_broadband_ratio(),
            })?;
        }
        wtr.flush().map_err(csv::Error::from)?;
        Ok(())
    }
    fn daily_curves(&self, summary: &RunSummary) -> Result<()> {
        let mut long = csv::Writer::from_path(self.path("daily_ratios_long.csv"))?;
        for day in summary.processed() {
            let mut per_day =
                csv::Writer::from_path(self.path(format!("{}_mean_ratio.csv", day.date)))?;
            let s = &day.summary;
            for ((w, r), c) in s.wavelengths.iter().zip(&s.mean_ratio).zip(&s.coverage) {
                let record = DailyCurveRecord {
                    date: day.date.to_string(),
                    wavelength_nm: *w,
                    mean_ratio: *r,
                    coverage: *c,
                };
                long.serialize(&record)?;
                per_day.serialize(&record)?;
            }
            per_day.flush().map_err(csv::Error::from)?;
        }
        long.flush().map_err(csv::Error::from)?;
        Ok(())
    }
    fn spectral_ratios(&self, summary: &RunSummary) -> Result<()> {
        let mut wtr = csv::Writer::from_path(self.path("spectral_ratios_long.csv"))?;
        for day in summary.processed() {
            for curve in &day.curves {
                let measured = &curve.measured;
                for (((w, m), e), r) in measured
                    .wavelengths()
                    .iter()
                    .zip(measured.values())
                    .zip(&curve.modelled)
                    .zip(curve.ratio.values())
                    .filter(|(_, r)| r.is_finite())
                {
                    wtr.serialize(SpectralRecord {
                        timestamp: measured.timestamp().to_string(),
                        date: day.date.to_string(),
                        sza_measured_deg: measured.angle_deg(),
                        sza_model_deg: curve.model_angle_deg,
                        time_delta_s: curve.time_delta.num_seconds(),
                        model_file: curve.model_file.clone(),
                        wavelength_nm: *w,
                        measured_w_m2_nm: *m,
                        modelled_w_m2_nm: *e,
                        ratio: *r,
                    })?;
                }
            }
        }
        wtr.flush().map_err(csv::Error::from)?;
        Ok(())
    }
    fn hourly_curves(&self, summary: &RunSummary) -> Result<()> {
        if summary.processed().all(|day| day.hourly.is_empty()) {
            return Ok(());
        }
        let mut wtr = csv::Writer::from_path(self.path("hourly_ratios_long.csv"))?;
        for hourly in summary.processed().flat_map(|day| &day.hourly) {
            let s = &hourly.summary;
            for ((w, r), c) in s.wavelengths.iter().zip(&s.mean_ratio).zip(&s.coverage) {
                wtr.serialize(HourlyCurveRecord {
                    date: s.date.to_string(),
                    hour: hourly.hour,
                    wavelength_nm: *w,
                    mean_ratio: *r,
                    coverage: *c,
                })?;
            }
        }
        wtr.flush().map_err(csv::Error::from)?;
        Ok(())
    }
    fn minimum_zenith(&self, summary: &RunSummary) -> Result<()> {
        if summary.processed().all(|day| day.in_window.is_none()) {
            return Ok(());
        }
        let mut wtr = csv::Writer::from_path(self.path("minimum_zenith_summary.csv"))?;
        for day in summary.processed() {
            let Some(in_window) = day.in_window else {
                continue;
            };
            for curve in &day.curves {
                wtr.serialize(MinimumZenithRecord {
                    date: day.date.to_string(),
                    timestamp: curve.anchor.to_string(),
                    sza_measured_deg: curve.measured.angle_deg(),
                    in_window,
                    model_file: curve.model_file.clone(),
                    sza_model_deg: curve.model_angle_deg,
                    n_wavelengths: curve.measured.len(),
                })?;
            }
        }
        wtr.flush().map_err(csv::Error::from)?;
        Ok(())
    }
    fn skipped_days(&self, summary: &RunSummary) -> Result<()> {
        let mut wtr = csv::Writer::from_path(self.path("skipped_days.csv"))?;
        for (date, error) in summary.skipped() {
            wtr.serialize(SkippedDayRecord {
                date: date.to_string(),
                reason: error.to_string(),
            })?;
        }
        wtr.flush().map_err(csv::Error::from)?;
        Ok(())
    }
}

#[cfg(feature = "plot")]
mod plot {
    use std::path::PathBuf;

    use plotters::prelude::*;

    use super::{ReportError, Result};
    use crate::pipeline::DayResult;

    /// Overlays the ratio curves of a day and their mean
    pub fn day_curves(day: &DayResult, path: PathBuf) -> Result<()> {
        let to_err = |e: &dyn std::fmt::Display| ReportError::Plot(e.to_string(), path.clone());
        let s = &day.summary;
        let finite = |v: &&f64| v.is_finite();
        let (y_min, y_max) = day
            .curves
            .iter()
            .flat_map(|c| c.ratio.values().iter())
            .filter(finite)
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(*v), hi.max(*v))
            });
        if !y_min.is_finite() {
            return Ok(());
        }
        let x_min = s.wavelengths[0];
        let x_max = s.wavelengths[s.wavelengths.len() - 1];
        let padding = 0.05 * (y_max - y_min).max(1e-3);

        let plot = SVGBackend::new(&path, (768, 512)).into_drawing_area();
        plot.fill(&WHITE).map_err(|e| to_err(&e))?;
        let mut chart = ChartBuilder::on(&plot)
            .caption(day.date.to_string(), ("sans-serif", 20))
            .set_label_area_size(LabelAreaPosition::Left, 60)
            .set_label_area_size(LabelAreaPosition::Bottom, 40)
            .margin(10)
            .build_cartesian_2d(x_min..x_max, (y_min - padding)..(y_max + padding))
            .map_err(|e| to_err(&e))?;
        chart
            .configure_mesh()
            .x_desc("Wavelength [nm]")
            .y_desc("Model / Measurement")
            .draw()
            .map_err(|e| to_err(&e))?;

        let mut colors = colorous::TABLEAU10.iter().cycle();
        for curve in &day.curves {
            let color = colors.next().copied().unwrap_or(colorous::Color { r: 0, g: 0, b: 0 });
            let rgb = RGBColor(color.r, color.g, color.b).mix(0.4);
            chart
                .draw_series(LineSeries::new(
                    curve
                        .ratio
                        .wavelengths()
                        .iter()
                        .zip(curve.ratio.values())
                        .filter(|(_, r)| r.is_finite())
                        .map(|(w, r)| (*w, *r)),
                    &rgb,
                ))
                .map_err(|e| to_err(&e))?;
        }
        chart
            .draw_series(LineSeries::new(
                s.wavelengths
                    .iter()
                    .zip(&s.mean_ratio)
                    .filter(|(_, r)| r.is_finite())
                    .map(|(w, r)| (*w, *r)),
                BLACK.stroke_width(2),
            ))
            .map_err(|e| to_err(&e))?
            .label(format!("mean of {} curves", s.n_samples))
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], BLACK.stroke_width(2)));
        chart
            .configure_series_labels()
            .border_style(&BLACK)
            .background_style(&WHITE.mix(0.8))
            .position(SeriesLabelPosition::UpperRight)
            .draw()
            .map_err(|e| to_err(&e))?;
        plot.present().map_err(|e| to_err(&e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        daily::DailySummary,
        frame::SpectralFrame,
        pipeline::{DayError, DayResult, RatioCurve},
    };
    use chrono::{Duration, NaiveDate};

    fn summary() -> RunSummary {
        let date = NaiveDate::from_ymd_opt(2025, 5, 10).unwrap();
        let t = date.and_hms_opt(10, 0, 0).unwrap();
        let measured =
            SpectralFrame::new(t, 40., "ms711.csv", vec![400., 500.], vec![1., 2.]).unwrap();
        let ratio = measured.with_values(vec![2., f64::NAN]).unwrap();
        let day = DayResult {
            date,
            curves: vec![RatioCurve {
                anchor: t,
                time_delta: Duration::zero(),
                model_angle_deg: 40.,
                model_file: "m_2025-05-10_sza_040p0.out".into(),
                measured,
                modelled: vec![2., 3.],
                ratio,
                broadband_ratio: 1.5,
            }],
            summary: DailySummary {
                date,
                wavelengths: vec![400., 500.],
                mean_ratio: vec![2., f64::NAN],
                n_samples: 1,
                coverage: vec![1, 0],
            },
            hourly: vec![],
            n_unmatched: 0,
            in_window: None,
        };
        let skipped = date.succ_opt().unwrap();
        RunSummary {
            days: vec![
                (date, Ok(day)),
                (skipped, Err(DayError::NoModelForDate(skipped))),
            ],
            ..Default::default()
        }
    }

    #[test]
    fn writes_tables() {
        let dir = tempfile::tempdir().unwrap();
        let report = Report::new(dir.path().join("out")).unwrap();
        report.write(&summary()).unwrap();

        let long = fs::read_to_string(report.path("spectral_ratios_long.csv")).unwrap();
        assert_eq!(long.lines().count(), 2);
        assert!(long.lines().nth(1).unwrap().ends_with(",400.0,1.0,2.0,2.0"));

        let daily = fs::read_to_string(report.path("2025-05-10_mean_ratio.csv")).unwrap();
        assert_eq!(
            daily.lines().collect::<Vec<_>>(),
            vec![
                "date,wavelength_nm,mean_ratio,coverage",
                "2025-05-10,400.0,2.0,1",
                "2025-05-10,500.0,NaN,0"
            ]
        );

        let skipped = fs::read_to_string(report.path("skipped_days.csv")).unwrap();
        assert!(skipped.contains("2025-05-11,no model files for 2025-05-11"));
        assert!(!report.path("hourly_ratios_long.csv").exists());
        assert!(!report.path("minimum_zenith_summary.csv").exists());
    }

    #[test]
    fn writes_minimum_zenith_selection() {
        let dir = tempfile::tempdir().unwrap();
        let report = Report::new(dir.path()).unwrap();
        let mut summary = summary();
        if let Some((_, Ok(day))) = summary.days.first_mut() {
            day.in_window = Some(false);
        }
        report.write(&summary).unwrap();
        let table = fs::read_to_string(report.path("minimum_zenith_summary.csv")).unwrap();
        assert_eq!(
            table.lines().collect::<Vec<_>>(),
            vec![
                "date,timestamp,sza_measured_deg,in_window,model_file,sza_model_deg,n_wavelengths",
                "2025-05-10,2025-05-10 10:00:00,40.0,false,m_2025-05-10_sza_040p0.out,40.0,2"
            ]
        );
    }
}
