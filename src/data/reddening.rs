use ndarray::{Array1, Array2, ArrayBase, Data, Ix1};

use super::model::{Observation, ParameterGrid};
use crate::error::{AsadError, Result};

/// Ratio of total to selective extinction.
const R_V: f64 = 3.2;

/// Coefficients of X(a), lowest order first.
const X_COEFFS: [f64; 8] = [
    1.0, 0.17699, -0.50447, -0.02427, 0.72085, 0.01979, -0.77530, 0.32999,
];

/// Coefficients of Y(a), lowest order first.
const Y_COEFFS: [f64; 8] = [
    0.0, 1.41338, 2.28305, 1.07233, -5.38434, -0.62251, 5.30260, -2.09002,
];

/// Optical extinction curve `Z = X + Y / R_V` at each wavelength (Å).
pub fn extinction_curve<S>(wavelength: &ArrayBase<S, Ix1>) -> Array1<f64>
where
    S: Data<Elem = f64>,
{
    wavelength.mapv(|wl| {
        let a = 1.0 / (wl * 1e-4) - 1.82;
        polynomial(&X_COEFFS, a) + polynomial(&Y_COEFFS, a) / R_V
    })
}

fn polynomial(coeffs: &[f64], x: f64) -> f64 {
    coeffs.iter().rev().fold(0.0, |acc, &c| acc * x + c)
}

impl Observation {
    /// Correct the first flux row for reddening values `0, step, ..., max`.
    ///
    /// Row `k` of the result is `flux[0] * 10^(0.4 * R_V * Z * k * step)`.
    pub fn reddening_shift(&self, max: f64, step: f64) -> Result<Observation> {
        let valid = step.is_finite() && max.is_finite() && step > 0.0 && max >= 0.0;
        if !valid {
            return Err(AsadError::InvalidGrid { max, step });
        }
        let flux = self.spectrum.flux();
        if flux.nrows() == 0 {
            return Err(AsadError::EmptyInput("observation flux", 1));
        }

        let base = flux.row(0);
        let z = extinction_curve(self.spectrum.wavelength());
        let count = (max / step).round() as usize + 1;
        let shifted = Array2::from_shape_fn((count, base.len()), |(k, i)| {
            let reddening = k as f64 * step;
            10f64.powf(0.4 * R_V * z[i] * reddening) * base[i]
        });

        let mut spectrum = self.spectrum.clone();
        spectrum.set_flux(shifted);
        Ok(Observation {
            spectrum,
            reddening: ParameterGrid::new(0.0, step),
        })
    }
}
