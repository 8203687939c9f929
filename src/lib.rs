//! Resampling, normalization and age/reddening fitting of spectra.
//!
//! A spectrum is a strictly increasing wavelength grid shared by the rows of
//! a flux matrix. The [`math`] module holds the pure numeric kernels
//! (sorted search, block-averaging resamplers, residual statistics), the
//! [`data`] module the containers built on them, and [`fit`] / [`pipeline`]
//! compare an observation against a grid of model spectra.

pub mod config;
pub mod data;
pub mod error;
pub mod fit;
pub mod math;
pub mod pipeline;

pub use data::model::{Model, Observation, ParameterGrid, Spectrum};
pub use error::{AsadError, Result};
pub use fit::{Fit, FitPoint};
pub use math::stats::{chi_squared_elementwise, chi_squared_total, ks_two_sample, StatTest};
pub use math::{
    flux_resample, flux_resample_aligned, flux_resample_edge_aware, search_sorted,
    wavelength_resample, wavelength_resample_edge_aware, ResampleWindow,
};
