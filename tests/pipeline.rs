use std::path::{Path, PathBuf};

use approx::assert_relative_eq;
use asad::config::{Config, ModelConfig, ObservationConfig, ReddeningConfig};
use asad::data::loader::{write_model_text, write_text};
use asad::data::reddening::extinction_curve;
use asad::pipeline;
use asad::{Model, ParameterGrid, Spectrum, StatTest};
use ndarray::{Array1, Array2};
use tempfile::TempDir;

const AGES: ParameterGrid = ParameterGrid {
    start: 7.0,
    step: 0.25,
};

fn grid() -> Array1<f64> {
    Array1::from_shape_fn(200, |i| 4000.0 + i as f64)
}

fn model_flux() -> Array2<f64> {
    Array2::from_shape_fn((6, 200), |(k, i)| {
        let i = i as f64;
        1.0 + 0.1 * (k as f64 + 1.0) * (i / 7.0).sin() + 0.01 * k as f64 * i / 200.0
    })
}

fn config(observation: PathBuf, model: PathBuf) -> Config {
    Config {
        observation: ObservationConfig {
            path: observation,
            wavelength_start: None,
            wavelength_end: None,
            preserve_first_sample: false,
            reddening: None,
        },
        model: ModelConfig {
            path: model,
            age: AGES,
            row_stride: None,
        },
        interp: None,
        normalize_wavelength: None,
        stat_test: StatTest::ChiSquared,
        delta: 1.0,
    }
}

fn write_text_pair(dir: &Path, observed_row: usize) -> (PathBuf, PathBuf) {
    let flux = model_flux();
    let model = Model::new(Spectrum::new(grid(), flux.clone()).unwrap(), AGES);
    let observation = Spectrum::new(
        grid(),
        flux.row(observed_row).to_owned().into_shape_with_order((1, 200)).unwrap(),
    )
    .unwrap();

    let obs_path = dir.join("cluster.txt");
    let model_path = dir.join("models.txt");
    write_text(&obs_path, &observation).unwrap();
    write_model_text(&model_path, &model).unwrap();
    (obs_path, model_path)
}

#[test]
fn smoothed_normalized_fit_recovers_the_observed_model() {
    let dir = TempDir::new().unwrap();
    let (obs_path, model_path) = write_text_pair(dir.path(), 3);

    let mut config = config(obs_path, model_path);
    config.interp = Some(2.0);
    config.normalize_wavelength = Some(4100.0);
    config.observation.wavelength_start = Some(4010.0);
    config.observation.wavelength_end = Some(4350.0);
    config.observation.reddening = Some(ReddeningConfig { max: 0.0, step: 0.01 });

    let report = pipeline::run(&config).unwrap();
    let fit = &report.fit;

    assert_eq!(report.name, "cluster.txt_models.txt");
    assert_eq!(fit.stat.dim(), (1, 6));
    assert_eq!(fit.min_model, 3);
    assert_eq!(fit.min_stat, 0.0);
    assert_relative_eq!(fit.min_age(), 7.75);
    assert_eq!(fit.min_reddening(), 0.0);

    let obs = &report.observation.spectrum;
    let model = &report.model.spectrum;
    assert_eq!(obs.wavelength(), model.wavelength());
    // 190 samples from 4010, smoothed by 2: floor(190 / 2) - 1 windows.
    assert_eq!(obs.num_wavelengths(), 94);
    assert_eq!(obs.wavelength()[0], 4011.0);
    let reference = asad::search_sorted(obs.wavelength(), 4100.0);
    assert!(model.flux().column(reference).iter().all(|&v| v == 1.0));
}

#[test]
fn reddening_grid_recovers_extinction() {
    let dir = TempDir::new().unwrap();
    let wavelength = grid();
    let flux = model_flux();
    let z = extinction_curve(&wavelength);
    let dimmed: Vec<f64> = flux
        .row(2)
        .iter()
        .zip(z.iter())
        .map(|(&f, &zi)| f * 10f64.powf(-0.4 * 3.2 * zi * 0.05))
        .collect();

    let obs_path = dir.path().join("cluster.json");
    let model_path = dir.path().join("models.json");
    let rows: Vec<Vec<f64>> = flux.rows().into_iter().map(|r| r.to_vec()).collect();
    std::fs::write(
        &obs_path,
        serde_json::json!({ "wavelength": wavelength.to_vec(), "flux": [dimmed] }).to_string(),
    )
    .unwrap();
    std::fs::write(
        &model_path,
        serde_json::json!({ "wavelength": wavelength.to_vec(), "flux": rows }).to_string(),
    )
    .unwrap();

    let mut config = config(obs_path, model_path);
    config.observation.reddening = Some(ReddeningConfig { max: 0.1, step: 0.01 });

    let report = pipeline::run(&config).unwrap();
    let fit = &report.fit;
    assert_eq!(fit.stat.dim(), (11, 6));
    assert_eq!((fit.min_observation, fit.min_model), (5, 2));
    assert_relative_eq!(fit.min_reddening(), 0.05, epsilon = 1e-12);
    assert_relative_eq!(fit.min_age(), 7.5);
    assert!(fit.min_stat < 1e-20);
    assert_eq!(fit.chosen_model[5], 2);
    assert!(report.confidence.iter().any(|p| p.stat == fit.min_stat));
}

#[test]
fn preserved_first_sample_keeps_grids_aligned() {
    let dir = TempDir::new().unwrap();
    let (obs_path, model_path) = write_text_pair(dir.path(), 1);

    let mut config = config(obs_path, model_path);
    config.interp = Some(2.0);
    config.observation.wavelength_start = Some(4020.0);
    config.observation.preserve_first_sample = true;

    let report = pipeline::run(&config).unwrap();
    let fit = &report.fit;
    assert_eq!(fit.min_model, 1);
    assert_eq!(fit.min_stat, 0.0);
    assert_relative_eq!(fit.min_age(), 7.25);

    let obs = &report.observation.spectrum;
    let model = &report.model.spectrum;
    assert_eq!(obs.wavelength(), model.wavelength());
    // 180 samples from 4020: the raw first sample plus floor(180 / 2) - 3 windows.
    assert_eq!(obs.num_wavelengths(), 88);
    assert_eq!(obs.wavelength()[0], 4020.0);
    assert_eq!(obs.wavelength()[87], 4194.0);
    assert_eq!(model.flux().row(1), obs.flux().row(0));
}

#[test]
fn missing_file_is_reported() {
    let dir = TempDir::new().unwrap();
    let config = config(dir.path().join("absent.txt"), dir.path().join("models.txt"));
    let err = pipeline::run(&config).unwrap_err();
    assert!(format!("{err:#}").contains("absent.txt"));
}
