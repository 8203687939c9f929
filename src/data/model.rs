use std::fmt;
use std::num::NonZeroUsize;

use ndarray::{s, Array1, Array2, Axis, Zip};
use serde::{Deserialize, Serialize};

use crate::error::{AsadError, Result};
use crate::math::{
    flux_resample_aligned, flux_resample_edge_aware, search_sorted, wavelength_resample,
    wavelength_resample_edge_aware,
};

// ---------------------------------------------------------------------------
// Spectrum – a wavelength grid with one or more flux rows
// ---------------------------------------------------------------------------

/// A wavelength grid shared by every row of a flux matrix.
///
/// `flux` is `rows × wavelengths`. Replacing the wavelength through
/// [`Spectrum::set_wavelength`] does not resample the flux; keeping the two
/// consistent is up to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum {
    name: Option<String>,
    wavelength: Array1<f64>,
    wavelength_step: f64,
    flux: Array2<f64>,
}

impl Spectrum {
    /// Build a spectrum, checking the grid is strictly increasing with at
    /// least two points and that every flux row spans it.
    pub fn new(wavelength: Array1<f64>, flux: Array2<f64>) -> Result<Self> {
        let wavelength_step = grid_step(&wavelength)?;
        if flux.ncols() != wavelength.len() {
            return Err(AsadError::LengthMismatch {
                left: flux.ncols(),
                right: wavelength.len(),
            });
        }
        Ok(Spectrum {
            name: None,
            wavelength,
            wavelength_step,
            flux,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn wavelength(&self) -> &Array1<f64> {
        &self.wavelength
    }

    pub fn flux(&self) -> &Array2<f64> {
        &self.flux
    }

    /// `wavelength[1] - wavelength[0]`, cached.
    pub fn wavelength_step(&self) -> f64 {
        self.wavelength_step
    }

    /// Number of flux rows.
    pub fn num_rows(&self) -> usize {
        self.flux.nrows()
    }

    /// Number of wavelength samples.
    pub fn num_wavelengths(&self) -> usize {
        self.wavelength.len()
    }

    /// Replace the grid and recompute the cached step.
    pub fn set_wavelength(&mut self, wavelength: Array1<f64>) -> Result<()> {
        self.wavelength_step = grid_step(&wavelength)?;
        self.wavelength = wavelength;
        Ok(())
    }

    pub fn set_flux(&mut self, flux: Array2<f64>) {
        self.flux = flux;
    }

    /// Divide every row by its value at the first wavelength `>= reference`.
    ///
    /// The reference column is set to exactly `1.0`. A reference beyond the
    /// grid leaves the spectrum as it is.
    pub fn normalize(&self, reference: f64) -> Result<Spectrum> {
        let index = search_sorted(&self.wavelength, reference);
        if index >= self.wavelength.len() {
            return Ok(self.clone());
        }
        if let Some(row) = self.flux.column(index).iter().position(|&v| v == 0.0) {
            return Err(AsadError::ZeroReferenceValue { row, column: index });
        }

        let mut flux = Array2::zeros(self.flux.dim());
        Zip::from(flux.rows_mut())
            .and(self.flux.rows())
            .par_for_each(|mut out, row| {
                let anchor = row[index];
                out.assign(&row);
                out.mapv_inplace(|v| v / anchor);
                out[index] = 1.0;
            });

        Ok(Spectrum {
            flux,
            ..self.clone()
        })
    }

    /// Block-average grid and flux onto spacing `interp`.
    ///
    /// A non-positive `step` means the cached [`Spectrum::wavelength_step`].
    pub fn smoothen(&self, interp: f64, step: f64) -> Result<Spectrum> {
        let step = self.effective_step(step);
        let wavelength = wavelength_resample(&self.wavelength, interp, step)?;
        let flux = flux_resample_aligned(&self.flux, interp, step)?;
        self.rebuilt(wavelength, flux)
    }

    /// Like [`Spectrum::smoothen`] but the first sample is carried through
    /// unchanged in the grid and in every row.
    pub fn smoothen_edge_aware(&self, interp: f64, step: f64) -> Result<Spectrum> {
        let step = self.effective_step(step);
        let wavelength = wavelength_resample_edge_aware(&self.wavelength, interp, step)?;
        let flux = flux_resample_edge_aware(&self.flux, interp, step)?;
        self.rebuilt(wavelength, flux)
    }

    /// Smooth at the cached step, edge-aware when `keep_first` is set.
    ///
    /// Two spectra on the same raw grid smoothed with the same arguments end
    /// up on the same smoothed grid.
    pub fn smoothen_with(&self, interp: f64, keep_first: bool) -> Result<Spectrum> {
        if keep_first {
            self.smoothen_edge_aware(interp, 0.0)
        } else {
            self.smoothen(interp, 0.0)
        }
    }

    /// Grid indices of `start` and `end`, both of which must lie inside the grid.
    pub fn wavelength_index(&self, start: f64, end: f64) -> Result<(usize, usize)> {
        let min = self.wavelength[0];
        let max = self.wavelength[self.wavelength.len() - 1];
        if start > end || start < min || end > max {
            return Err(AsadError::WavelengthOutOfRange { start, end, min, max });
        }
        Ok((
            search_sorted(&self.wavelength, start),
            search_sorted(&self.wavelength, end),
        ))
    }

    /// Columns `start..end` of grid and flux; `end` is clamped to the grid.
    pub fn select_columns(&self, start: usize, end: usize) -> Result<Spectrum> {
        let end = end.min(self.wavelength.len());
        let start = start.min(end);
        let wavelength = self.wavelength.slice(s![start..end]).to_owned();
        let flux = self.flux.slice(s![.., start..end]).to_owned();
        self.rebuilt(wavelength, flux)
    }

    /// Drop every sample below `wavelength`.
    pub fn with_wavelength_start(&self, wavelength: f64) -> Result<Spectrum> {
        let index = search_sorted(&self.wavelength, wavelength);
        self.select_columns(index, self.wavelength.len())
    }

    /// Keep samples up to and including the first one `>= wavelength`.
    pub fn with_wavelength_end(&self, wavelength: f64) -> Result<Spectrum> {
        let index = search_sorted(&self.wavelength, wavelength);
        self.select_columns(0, index + 1)
    }

    /// Keep `[start, end]`, both bounds inside the grid.
    pub fn with_wavelength_range(&self, start: f64, end: f64) -> Result<Spectrum> {
        let (first, last) = self.wavelength_index(start, end)?;
        self.select_columns(first, last + 1)
    }

    /// Rows selected by index, in the given order.
    pub fn select_rows(&self, rows: &[usize]) -> Spectrum {
        Spectrum {
            flux: self.flux.select(Axis(0), rows),
            ..self.clone()
        }
    }

    fn effective_step(&self, step: f64) -> f64 {
        if step > 0.0 {
            step
        } else {
            self.wavelength_step
        }
    }

    fn rebuilt(&self, wavelength: Array1<f64>, flux: Array2<f64>) -> Result<Spectrum> {
        let mut spectrum = Spectrum::new(wavelength, flux)?;
        spectrum.name = self.name.clone();
        Ok(spectrum)
    }
}

/// Text matrix: one line per wavelength, followed by each row's flux there.
impl fmt::Display for Spectrum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, wl) in self.wavelength.iter().enumerate() {
            write!(f, "{wl}")?;
            for value in self.flux.column(i) {
                write!(f, " {value:>13.6e}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

fn grid_step(wavelength: &Array1<f64>) -> Result<f64> {
    if wavelength.len() < 2 {
        return Err(AsadError::EmptyInput("wavelength grid", 2));
    }
    if let Some(index) = wavelength
        .windows(2)
        .into_iter()
        .position(|pair| !(pair[0] < pair[1]))
    {
        return Err(AsadError::UnsortedWavelength { index: index + 1 });
    }
    Ok(wavelength[1] - wavelength[0])
}

// ---------------------------------------------------------------------------
// ParameterGrid – the physical parameter attached to each flux row
// ---------------------------------------------------------------------------

/// Evenly spaced parameter values `start + i * step`, one per flux row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterGrid {
    pub start: f64,
    pub step: f64,
}

impl ParameterGrid {
    pub fn new(start: f64, step: f64) -> Self {
        ParameterGrid { start, step }
    }

    pub fn value(&self, i: usize) -> f64 {
        self.start + i as f64 * self.step
    }

    pub fn values(&self, n: usize) -> Array1<f64> {
        Array1::from_shape_fn(n, |i| self.value(i))
    }
}

// ---------------------------------------------------------------------------
// Observation / Model
// ---------------------------------------------------------------------------

/// Observed spectrum. After a reddening shift each row holds the
/// observation corrected for one reddening value.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub spectrum: Spectrum,
    pub reddening: ParameterGrid,
}

impl Observation {
    pub const DEFAULT_REDDENING: ParameterGrid = ParameterGrid {
        start: 0.0,
        step: 0.01,
    };

    pub fn new(spectrum: Spectrum) -> Self {
        Observation {
            spectrum,
            reddening: Self::DEFAULT_REDDENING,
        }
    }

    /// Reddening value of every row.
    pub fn reddening_values(&self) -> Array1<f64> {
        self.reddening.values(self.spectrum.num_rows())
    }

    /// Smooth onto spacing `interp`. With `keep_first` the first observed
    /// sample survives unaveraged.
    pub fn smoothen(&self, interp: f64, keep_first: bool) -> Result<Observation> {
        Ok(Observation {
            spectrum: self.spectrum.smoothen_with(interp, keep_first)?,
            reddening: self.reddening,
        })
    }

    pub fn normalize(&self, reference: f64) -> Result<Observation> {
        Ok(Observation {
            spectrum: self.spectrum.normalize(reference)?,
            reddening: self.reddening,
        })
    }
}

/// Synthetic model spectra, one row per age.
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    pub spectrum: Spectrum,
    pub age: ParameterGrid,
    ages: Option<Array1<f64>>,
}

impl Model {
    pub const DEFAULT_AGE: ParameterGrid = ParameterGrid {
        start: 6.6,
        step: 0.05,
    };

    pub fn new(spectrum: Spectrum, age: ParameterGrid) -> Self {
        Model {
            spectrum,
            age,
            ages: None,
        }
    }

    /// Attach tabulated ages, one per row, overriding the grid.
    pub fn with_ages(mut self, ages: Array1<f64>) -> Result<Self> {
        if ages.len() != self.spectrum.num_rows() {
            return Err(AsadError::LengthMismatch {
                left: ages.len(),
                right: self.spectrum.num_rows(),
            });
        }
        self.ages = Some(ages);
        Ok(self)
    }

    /// Age of every row.
    pub fn ages(&self) -> Array1<f64> {
        match &self.ages {
            Some(ages) => ages.clone(),
            None => self.age.values(self.spectrum.num_rows()),
        }
    }

    /// Keep rows `0, stride, 2 * stride, ...`.
    pub fn subsample_rows(&self, stride: NonZeroUsize) -> Model {
        let rows: Vec<usize> = (0..self.spectrum.num_rows()).step_by(stride.get()).collect();
        let ages = self.ages.as_ref().map(|ages| ages.select(Axis(0), &rows));
        Model {
            spectrum: self.spectrum.select_rows(&rows),
            age: ParameterGrid::new(self.age.start, self.age.step * stride.get() as f64),
            ages,
        }
    }

    /// Replace the spectrum, keeping the ages.
    pub fn with_spectrum(&self, spectrum: Spectrum) -> Model {
        Model {
            spectrum,
            age: self.age,
            ages: self.ages.clone(),
        }
    }

    /// Smooth every age row; see [`Observation::smoothen`].
    pub fn smoothen(&self, interp: f64, keep_first: bool) -> Result<Model> {
        Ok(self.with_spectrum(self.spectrum.smoothen_with(interp, keep_first)?))
    }

    pub fn normalize(&self, reference: f64) -> Result<Model> {
        Ok(self.with_spectrum(self.spectrum.normalize(reference)?))
    }
}
