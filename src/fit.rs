//! Best-fit search of observation rows (reddening values) against model
//! rows (ages).

use ndarray::{Array1, Array2, ArrayView1};
use rayon::prelude::*;

use crate::data::model::{Model, Observation};
use crate::error::{AsadError, Result};
use crate::math::stats::StatTest;

/// One (reddening, age) pair and its statistic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitPoint {
    pub reddening: f64,
    pub age: f64,
    pub stat: f64,
}

/// Statistic matrix between every observation row and every model row.
#[derive(Debug, Clone, PartialEq)]
pub struct Fit {
    pub stat_test: StatTest,
    /// `[observation rows × model rows]`.
    pub stat: Array2<f64>,
    /// Best model row for each observation row.
    pub chosen_model: Vec<usize>,
    pub min_observation: usize,
    pub min_model: usize,
    pub min_stat: f64,
    pub reddening: Array1<f64>,
    pub ages: Array1<f64>,
}

impl Fit {
    pub fn calculate(observation: &Observation, model: &Model, stat_test: StatTest) -> Result<Fit> {
        let obs_flux = observation.spectrum.flux();
        let model_flux = model.spectrum.flux();
        if obs_flux.ncols() != model_flux.ncols() {
            return Err(AsadError::LengthMismatch {
                left: obs_flux.ncols(),
                right: model_flux.ncols(),
            });
        }
        if obs_flux.nrows() == 0 {
            return Err(AsadError::EmptyInput("observation flux", 1));
        }
        if model_flux.nrows() == 0 {
            return Err(AsadError::EmptyInput("model flux", 1));
        }

        let rows: Vec<Vec<f64>> = (0..obs_flux.nrows())
            .into_par_iter()
            .map(|i| {
                let obs_row = obs_flux.row(i);
                model_flux
                    .rows()
                    .into_iter()
                    .map(|model_row| stat_test.apply(&obs_row, &model_row))
                    .collect::<Result<Vec<f64>>>()
            })
            .collect::<Result<_>>()?;
        let stat = Array2::from_shape_fn((rows.len(), model_flux.nrows()), |(i, j)| rows[i][j]);

        let chosen: Vec<(usize, f64)> = stat.rows().into_iter().map(argmin).collect();
        let row_minima: Array1<f64> = chosen.iter().map(|&(_, v)| v).collect();
        let (min_observation, _) = argmin(row_minima.view());
        let (min_model, min_stat) = chosen[min_observation];

        log::debug!(
            "{stat_test} fit over {}x{}: best observation row {min_observation}, model row {min_model}, stat {min_stat}",
            stat.nrows(),
            stat.ncols()
        );

        Ok(Fit {
            stat_test,
            chosen_model: chosen.iter().map(|&(j, _)| j).collect(),
            min_observation,
            min_model,
            min_stat,
            reddening: observation.reddening_values(),
            ages: model.ages(),
            stat,
        })
    }

    pub fn min_age(&self) -> f64 {
        self.ages[self.min_model]
    }

    pub fn min_reddening(&self) -> f64 {
        self.reddening[self.min_observation]
    }

    /// Every pair whose statistic lies within `delta` of the minimum.
    pub fn delta_level(&self, delta: f64) -> Vec<FitPoint> {
        self.stat
            .indexed_iter()
            .filter(|(_, &stat)| (stat - self.min_stat).abs() < delta)
            .map(|((i, j), &stat)| FitPoint {
                reddening: self.reddening[i],
                age: self.ages[j],
                stat,
            })
            .collect()
    }

    /// `name  age  reddening` line for the best fit.
    pub fn format_chosen(&self, name: &str) -> String {
        format!(
            "{name:<40} {:>10.6} {:>10.6}",
            self.min_age(),
            self.min_reddening()
        )
    }
}

/// Index and value of the first smallest element.
fn argmin(values: ArrayView1<'_, f64>) -> (usize, f64) {
    values
        .iter()
        .enumerate()
        .fold((0, f64::INFINITY), |best, (i, &v)| if v < best.1 { (i, v) } else { best })
}
