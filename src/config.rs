use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::data::model::{Model, ParameterGrid};
use crate::math::stats::StatTest;

// ---------------------------------------------------------------------------
// Run configuration (JSON)
// ---------------------------------------------------------------------------

/// Settings for one observation/model fit.
///
/// ```json
/// {
///   "observation": { "path": "ngc1818.txt", "wavelength_start": 3700,
///                    "reddening": { "max": 0.5, "step": 0.01 } },
///   "model": { "path": "padova.txt", "age": { "start": 6.6, "step": 0.05 } },
///   "interp": 2.0,
///   "normalize_wavelength": 5870,
///   "stat_test": "chi-squared"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub observation: ObservationConfig,
    pub model: ModelConfig,
    /// Target spacing for smoothing; no smoothing when absent.
    #[serde(default)]
    pub interp: Option<f64>,
    /// Reference wavelength for normalization; none when absent.
    #[serde(default)]
    pub normalize_wavelength: Option<f64>,
    #[serde(default)]
    pub stat_test: StatTest,
    /// Half-width of the confidence set around the best statistic.
    #[serde(default = "default_delta")]
    pub delta: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub wavelength_start: Option<f64>,
    #[serde(default)]
    pub wavelength_end: Option<f64>,
    /// Keep the first sample exact when smoothing.
    #[serde(default)]
    pub preserve_first_sample: bool,
    #[serde(default)]
    pub reddening: Option<ReddeningConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReddeningConfig {
    pub max: f64,
    pub step: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub path: PathBuf,
    #[serde(default = "default_age")]
    pub age: ParameterGrid,
    /// Keep only every n-th model row.
    #[serde(default)]
    pub row_stride: Option<NonZeroUsize>,
}

fn default_delta() -> f64 {
    1.0
}

fn default_age() -> ParameterGrid {
    Model::DEFAULT_AGE
}

impl Config {
    /// Read a JSON config; relative data paths resolve against its directory.
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let mut config = Self::from_json(&text)
            .with_context(|| format!("in config {}", path.display()))?;
        if let Some(base) = path.parent() {
            config.observation.path = base.join(&config.observation.path);
            config.model.path = base.join(&config.model.path);
        }
        Ok(config)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(text).context("parsing config JSON")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(interp) = self.interp {
            if !(interp > 0.0) {
                bail!("interp must be positive, got {interp}");
            }
        }
        if let Some(reddening) = self.observation.reddening {
            if !(reddening.step > 0.0) || reddening.max < 0.0 {
                bail!(
                    "reddening needs step > 0 and max >= 0, got step {} max {}",
                    reddening.step,
                    reddening.max
                );
            }
        }
        if let (Some(start), Some(end)) = (self.observation.wavelength_start, self.observation.wavelength_end) {
            if start > end {
                bail!("wavelength_start {start} is past wavelength_end {end}");
            }
        }
        if !(self.delta > 0.0) {
            bail!("delta must be positive, got {}", self.delta);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_takes_defaults() {
        let config = Config::from_json(
            r#"{"observation": {"path": "obs.txt"}, "model": {"path": "model.txt"}}"#,
        )
        .unwrap();
        assert_eq!(config.interp, None);
        assert_eq!(config.stat_test, StatTest::ChiSquared);
        assert_eq!(config.delta, 1.0);
        assert_eq!(config.model.age, Model::DEFAULT_AGE);
        assert_eq!(config.model.row_stride, None);
        assert!(!config.observation.preserve_first_sample);
    }

    #[test]
    fn full_config() {
        let config = Config::from_json(
            r#"{
                "observation": {"path": "obs.txt", "wavelength_start": 3700, "wavelength_end": 6000,
                                "preserve_first_sample": true,
                                "reddening": {"max": 0.5, "step": 0.01}},
                "model": {"path": "m.txt", "age": {"start": 6.0, "step": 0.1}, "row_stride": 3},
                "interp": 2.0,
                "normalize_wavelength": 5870,
                "stat_test": "ks",
                "delta": 0.5
            }"#,
        )
        .unwrap();
        assert_eq!(config.stat_test, StatTest::KolmogorovSmirnov);
        assert_eq!(config.model.row_stride, NonZeroUsize::new(3));
        assert_eq!(config.observation.reddening, Some(ReddeningConfig { max: 0.5, step: 0.01 }));
        assert_eq!(config.normalize_wavelength, Some(5870.0));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let base = r#"{"observation": {"path": "o"}, "model": {"path": "m"}"#;
        assert!(Config::from_json(&format!("{base}, \"interp\": 0}}")).is_err());
        assert!(Config::from_json(&format!("{base}, \"delta\": -1}}")).is_err());
        assert!(Config::from_json(r#"{"observation": {"path": "o"}, "model": {"path": "m", "row_stride": 0}}"#).is_err());
        assert!(Config::from_json(r#"{"model": {"path": "m"}}"#).is_err());
    }

    #[test]
    fn paths_resolve_against_config_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("run.json");
        std::fs::write(
            &path,
            r#"{"observation": {"path": "obs.txt"}, "model": {"path": "/abs/model.txt"}}"#,
        )
        .unwrap();
        let config = Config::from_path(&path).unwrap();
        assert_eq!(config.observation.path, dir.path().join("obs.txt"));
        assert_eq!(config.model.path, PathBuf::from("/abs/model.txt"));
    }
}
