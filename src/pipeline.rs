//! End-to-end run: load, trim, smooth, redden, normalize and fit.

use anyhow::{Context, Result};

use crate::config::Config;
use crate::data::loader::{load_model, load_observation};
use crate::data::model::{Model, Observation};
use crate::fit::{Fit, FitPoint};

/// Outcome of one configured run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// `<observation>_<model>` file names.
    pub name: String,
    pub observation: Observation,
    pub model: Model,
    pub fit: Fit,
    /// Pairs within `delta` of the best statistic.
    pub confidence: Vec<FitPoint>,
}

pub fn run(config: &Config) -> Result<RunReport> {
    let (observation, raw_start) = prepare_observation(config)?;
    let model = prepare_model(config, &observation, raw_start)?;

    let fit = Fit::calculate(&observation, &model, config.stat_test)
        .context("comparing observation with model")?;
    let confidence = fit.delta_level(config.delta);

    let name = format!(
        "{}_{}",
        observation.spectrum.name().unwrap_or("observation"),
        model.spectrum.name().unwrap_or("model")
    );
    log::info!(
        "{name}: age {:.4}, reddening {:.4}, {} {:.6} ({} pairs within {})",
        fit.min_age(),
        fit.min_reddening(),
        fit.stat_test,
        fit.min_stat,
        confidence.len(),
        config.delta
    );

    Ok(RunReport {
        name,
        observation,
        model,
        fit,
        confidence,
    })
}

/// Returns the prepared observation and its first wavelength before smoothing.
fn prepare_observation(config: &Config) -> Result<(Observation, f64)> {
    let settings = &config.observation;
    let mut observation = load_observation(&settings.path)?;

    if let Some(start) = settings.wavelength_start {
        observation.spectrum = observation
            .spectrum
            .with_wavelength_start(start)
            .with_context(|| format!("observation start at {start}"))?;
    }
    let raw_start = observation.spectrum.wavelength()[0];

    if let Some(interp) = config.interp {
        observation = observation
            .smoothen(interp, settings.preserve_first_sample)
            .with_context(|| format!("smoothing observation to {interp}"))?;
    }
    if let Some(end) = settings.wavelength_end {
        observation.spectrum = observation
            .spectrum
            .with_wavelength_end(end)
            .with_context(|| format!("observation end at {end}"))?;
    }

    if let Some(reddening) = settings.reddening {
        observation = observation
            .reddening_shift(reddening.max, reddening.step)
            .context("reddening correction")?;
    }
    if let Some(reference) = config.normalize_wavelength {
        observation = observation
            .normalize(reference)
            .with_context(|| format!("normalizing observation at {reference}"))?;
    }

    log::debug!(
        "Observation prepared: {} rows over {} wavelengths",
        observation.spectrum.num_rows(),
        observation.spectrum.num_wavelengths()
    );
    Ok((observation, raw_start))
}

fn prepare_model(config: &Config, observation: &Observation, raw_start: f64) -> Result<Model> {
    let settings = &config.model;
    let mut model = load_model(&settings.path, settings.age)?;

    if let Some(stride) = settings.row_stride {
        model = model.subsample_rows(stride);
    }

    // Cutting at the same raw start and smoothing the same way as the
    // observation puts both on one grid.
    model = model.with_spectrum(
        model
            .spectrum
            .with_wavelength_start(raw_start)
            .with_context(|| format!("model start at {raw_start}"))?,
    );
    if let Some(interp) = config.interp {
        model = model
            .smoothen(interp, config.observation.preserve_first_sample)
            .with_context(|| format!("smoothing model to {interp}"))?;
    }

    let grid = observation.spectrum.wavelength();
    let (first, last) = (grid[0], grid[grid.len() - 1]);
    let spectrum = model
        .spectrum
        .with_wavelength_range(first, last)
        .with_context(|| format!("model range [{first}, {last}]"))?;
    model = model.with_spectrum(spectrum);

    if let Some(reference) = config.normalize_wavelength {
        model = model
            .normalize(reference)
            .with_context(|| format!("normalizing model at {reference}"))?;
    }

    log::debug!(
        "Model prepared: {} rows over {} wavelengths",
        model.spectrum.num_rows(),
        model.spectrum.num_wavelengths()
    );
    Ok(model)
}
