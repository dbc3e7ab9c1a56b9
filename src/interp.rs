//! Piecewise-linear resampling of spectral frames

use strum_macros::{Display, EnumIter, EnumString};

use crate::frame::{FrameError, SpectralFrame};

/// Policy for target wavelengths outside of the source domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, EnumString, Display)]
#[strum(ascii_case_insensitive)]
pub enum Extrapolation {
    /// Extend the first and last segments of the source
    #[strum(serialize = "linear")]
    Linear,
    /// Fill with NaN
    #[strum(serialize = "nan")]
    Nan,
}
/// Resamples frames onto arbitrary wavelength grids
///
/// A single interpolator, and so a single extrapolation policy, is used for a
/// whole pipeline run.
#[derive(Debug, Clone, Copy)]
pub struct SpectralInterpolator {
    policy: Extrapolation,
}
impl SpectralInterpolator {
    pub fn new(policy: Extrapolation) -> Self {
        Self { policy }
    }
    pub fn policy(&self) -> Extrapolation {
        self.policy
    }
    /// Interpolates the `source` values at `target` wavelengths
    pub fn resample(&self, source: &SpectralFrame, target: &[f64]) -> Vec<f64> {
        let x = source.wavelengths();
        let y = source.values();
        target.iter().map(|&t| self.eval(x, y, t)).collect()
    }
    /// Interpolates `source` onto the grid of `grid`, keeping the provenance of `source`
    pub fn resample_frame(
        &self,
        source: &SpectralFrame,
        grid: &SpectralFrame,
    ) -> Result<SpectralFrame, FrameError> {
        SpectralFrame::new(
            source.timestamp(),
            source.angle_deg(),
            source.source(),
            grid.wavelengths().to_vec(),
            self.resample(source, grid.wavelengths()),
        )
    }
    fn eval(&self, x: &[f64], y: &[f64], t: f64) -> f64 {
        let n = x.len();
        let (first, last) = (x[0], x[n - 1]);
        if t.is_nan() {
            return f64::NAN;
        }
        if t < first || t > last {
            return match self.policy {
                Extrapolation::Nan => f64::NAN,
                Extrapolation::Linear if t < first => lerp(x[0], x[1], y[0], y[1], t),
                Extrapolation::Linear => lerp(x[n - 2], x[n - 1], y[n - 2], y[n - 1], t),
            };
        }
        // index of the first wavelength >= t
        let i = x.partition_point(|&w| w < t);
        if x[i] == t {
            return y[i];
        }
        lerp(x[i - 1], x[i], y[i - 1], y[i], t)
    }
}

fn lerp(x0: f64, x1: f64, y0: f64, y1: f64, t: f64) -> f64 {
    y0 + (y1 - y0) * (t - x0) / (x1 - x0)
}
