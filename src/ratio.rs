//! Model to measurement ratios and broadband integrals

use serde::Serialize;

use crate::{
    catalog::{model::MIN_MU0, DirectColumn, ModelSpectrum},
    frame::{FrameError, SpectralFrame},
    interp::SpectralInterpolator,
};

/// Trapezoidal integral of `y(x)` over the points where both are finite
///
/// Returns NaN with fewer than 2 finite points.
pub fn trapezoid(x: &[f64], y: &[f64]) -> f64 {
    let points: Vec<(f64, f64)> = x
        .iter()
        .zip(y)
        .filter(|(x, y)| x.is_finite() && y.is_finite())
        .map(|(x, y)| (*x, *y))
        .collect();
    if points.len() < 2 {
        return f64::NAN;
    }
    points
        .windows(2)
        .map(|w| 0.5 * (w[1].0 - w[0].0) * (w[0].1 + w[1].1))
        .sum()
}

/// Broadband irradiance [W/m²] of a spectral frame in W/m²/nm
pub fn broadband(frame: &SpectralFrame) -> f64 {
    trapezoid(frame.wavelengths(), frame.values())
}

/// Computes model to measurement ratios on the measurement grid
#[derive(Debug, Clone, Copy)]
pub struct RatioEngine {
    interpolator: SpectralInterpolator,
}
impl RatioEngine {
    pub fn new(interpolator: SpectralInterpolator) -> Self {
        Self { interpolator }
    }
    pub fn interpolator(&self) -> &SpectralInterpolator {
        &self.interpolator
    }
    /// Spectral ratio model/measurement on the measurement grid
    ///
    /// The ratio is NaN wherever the measurement is not a positive number or
    /// the quotient is not finite.
    /// The returned frame carries the measurement timestamp and angle.
    pub fn ratio(
        &self,
        model: &SpectralFrame,
        measurement: &SpectralFrame,
    ) -> Result<SpectralFrame, FrameError> {
        let values = self.quotients(model, measurement);
        Ok(measurement
            .with_values(values)?
            .relabel(format!("{} / {}", model.source(), measurement.source())))
    }
    /// Ratio of the broadband integrals of the model and of the measurement
    ///
    /// Both integrals are taken over the measurement wavelengths where the
    /// spectral ratio is finite.
    pub fn broadband_ratio(&self, model: &SpectralFrame, measurement: &SpectralFrame) -> f64 {
        let resampled = self.interpolator.resample(model, measurement.wavelengths());
        let support: Vec<(f64, f64, f64)> = measurement
            .wavelengths()
            .iter()
            .zip(&resampled)
            .zip(measurement.values())
            .filter(|((_, m), e)| quotient(**m, **e).is_finite())
            .map(|((w, m), e)| (*w, *m, *e))
            .collect();
        let w: Vec<f64> = support.iter().map(|p| p.0).collect();
        let model_bb = trapezoid(&w, &support.iter().map(|p| p.1).collect::<Vec<_>>());
        let measured_bb = trapezoid(&w, &support.iter().map(|p| p.2).collect::<Vec<_>>());
        quotient(model_bb, measured_bb)
    }
    fn quotients(&self, model: &SpectralFrame, measurement: &SpectralFrame) -> Vec<f64> {
        self.interpolator
            .resample(model, measurement.wavelengths())
            .into_iter()
            .zip(measurement.values())
            .map(|(m, e)| quotient(m, *e))
            .collect()
    }
}

fn quotient(numerator: f64, denominator: f64) -> f64 {
    if !denominator.is_finite() || denominator <= 0. {
        return f64::NAN;
    }
    let q = numerator / denominator;
    if q.is_finite() {
        q
    } else {
        f64::NAN
    }
}

/// Broadband self-consistency of a model spectrum on a horizontal plane
///
/// All the irradiances are in W/m².
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HorizontalBudget {
    pub file: String,
    pub angle_deg: f64,
    pub mu0: f64,
    pub direct_horizontal: f64,
    pub diffuse_down: f64,
    pub diffuse_up: f64,
    pub global_horizontal: f64,
    pub dni_reconstructed: f64,
    pub ghi_from_identity: f64,
    pub identity_error: f64,
}
impl HorizontalBudget {
    /// Integrates the components of `spectrum` and checks `GHI = DHI + DNI cos(SZA)`
    ///
    /// The direct normal is reconstructed from the direct horizontal integral,
    /// it is NaN with the sun at the horizon.
    pub fn check(spectrum: &ModelSpectrum, angle_deg: f64, column: DirectColumn) -> Self {
        let mu0 = angle_deg.to_radians().cos();
        let w = &spectrum.wavelengths;
        let direct_horizontal = trapezoid(w, &spectrum.direct_horizontal(angle_deg, column));
        let diffuse_down = trapezoid(w, &spectrum.diffuse_down);
        let diffuse_up = trapezoid(w, &spectrum.diffuse_up);
        let global_horizontal = trapezoid(w, &spectrum.global_horizontal(angle_deg, column));
        let (dni_reconstructed, ghi_from_identity, identity_error) = if mu0 < MIN_MU0 {
            (f64::NAN, f64::NAN, f64::NAN)
        } else {
            let dni = direct_horizontal / mu0;
            let ghi = diffuse_down + dni * mu0;
            (dni, ghi, global_horizontal - ghi)
        };
        let file = spectrum
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        if identity_error.abs() > 1e-6 * global_horizontal.abs().max(1.) {
            log::warn!(
                "{}: GHI identity mismatch of {:.3e}W/m²",
                file,
                identity_error
            );
        }
        Self {
            file,
            angle_deg,
            mu0,
            direct_horizontal,
            diffuse_down,
            diffuse_up,
            global_horizontal,
            dni_reconstructed,
            ghi_from_identity,
            identity_error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{catalog::ModelReader, interp::Extrapolation};
    use approx::assert_relative_eq;
    use chrono::NaiveDate;
    use std::path::Path;

    fn frame(wavelengths: Vec<f64>, values: Vec<f64>) -> SpectralFrame {
        let t = NaiveDate::from_ymd_opt(2025, 5, 10)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        SpectralFrame::new(t, 40., "test", wavelengths, values).unwrap()
    }
    fn engine() -> RatioEngine {
        RatioEngine::new(SpectralInterpolator::new(Extrapolation::Nan))
    }

    #[test]
    fn trapezoid_skips_missing_samples() {
        assert_relative_eq!(trapezoid(&[0., 1., 2.], &[1., 1., 1.]), 2.);
        assert_relative_eq!(trapezoid(&[0., 1., 2.], &[1., f64::NAN, 1.]), 2.);
        assert!(trapezoid(&[0., 1.], &[1., f64::NAN]).is_nan());
    }

    #[test]
    fn ratio_on_measurement_grid() {
        let model = frame(vec![400., 600.], vec![2., 4.]);
        let measurement = frame(vec![400., 500., 600.], vec![1., 2., 0.]);
        let ratio = engine().ratio(&model, &measurement).unwrap();
        assert_eq!(ratio.wavelengths(), measurement.wavelengths());
        assert_relative_eq!(ratio.values()[0], 2.);
        assert_relative_eq!(ratio.values()[1], 1.5);
        assert!(ratio.values()[2].is_nan());
        assert_eq!(ratio.timestamp(), measurement.timestamp());
    }

    #[test]
    fn ratio_is_nan_for_invalid_measurements() {
        let model = frame(vec![400., 500., 600., 700.], vec![1., 1., 1., 1.]);
        let measurement = frame(vec![400., 500., 600., 700.], vec![-1., f64::NAN, 1e-320, 1.]);
        let ratio = engine().ratio(&model, &measurement).unwrap();
        assert!(ratio.values()[..3].iter().all(|v| v.is_nan()));
        assert_eq!(ratio.values()[3], 1.);
        assert_eq!(ratio.n_finite(), 1);
    }

    #[test]
    fn broadband_ratio_on_common_support() {
        let model = frame(vec![400., 500., 600.], vec![2., 2., 2.]);
        let measurement = frame(vec![400., 500., 600.], vec![1., 1., f64::NAN]);
        assert_relative_eq!(engine().broadband_ratio(&model, &measurement), 2.);
        let measurement = frame(vec![400., 500., 600.], vec![1., f64::NAN, f64::NAN]);
        assert!(engine().broadband_ratio(&model, &measurement).is_nan());
        assert_relative_eq!(broadband(&model), 400.);
    }

    #[test]
    fn horizontal_budget() {
        let spectrum = ModelReader::default()
            .parse(
                "400 100 50 10\n500 100 50 10\n".as_bytes(),
                Path::new("model_2025-05-10_sza_060p0.out"),
            )
            .unwrap();
        let budget = HorizontalBudget::check(&spectrum, 60., DirectColumn::Normal);
        assert_relative_eq!(budget.direct_horizontal, 5000., epsilon = 1e-9);
        assert_relative_eq!(budget.diffuse_down, 5000.);
        assert_relative_eq!(budget.global_horizontal, 10000., epsilon = 1e-9);
        assert_relative_eq!(budget.dni_reconstructed, 10000., epsilon = 1e-9);
        assert_relative_eq!(budget.identity_error, 0., epsilon = 1e-9);

        let budget = HorizontalBudget::check(&spectrum, 90., DirectColumn::Horizontal);
        assert!(budget.dni_reconstructed.is_nan());
        assert!(budget.identity_error.is_nan());
        assert_relative_eq!(budget.global_horizontal, 15000.);
    }
}
