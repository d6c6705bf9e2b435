use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{IsotopeSplineError, Result};

pub const MODEL_PATH_ENV: &str = "ISOSPLINE_MODEL_PATH";
pub const DATA_DIR_ENV: &str = "ISOSPLINE_DATA_DIR";

const DEFAULT_MODEL_PATH: &str = "data/CHEMISTRY/IsotopeSplines.xml";
const DEFAULT_FRAGMENT_MODEL_PATH: &str = "data/CHEMISTRY/FragmentIsotopeSplines.xml";

/// Where the precursor isotope models are read from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IsotopeSplineConfig {
    pub model_path: PathBuf,
    pub data_dir: Option<PathBuf>,
}

impl Default for IsotopeSplineConfig {
    fn default() -> Self {
        IsotopeSplineConfig {
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            data_dir: None,
        }
    }
}

impl IsotopeSplineConfig {
    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        IsotopeSplineConfig {
            model_path: model_path.into(),
            data_dir: None,
        }
    }

    /// defaults overridden by `ISOSPLINE_MODEL_PATH` and `ISOSPLINE_DATA_DIR`
    pub fn from_env() -> Self {
        let mut config = IsotopeSplineConfig::default();
        if let Some(path) = env_path(MODEL_PATH_ENV) {
            config.model_path = path;
        }
        config.data_dir = env_path(DATA_DIR_ENV);
        config
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        read_json(path.as_ref())
    }

    /// the model path, joined onto `data_dir` when it is relative and not found as given
    pub fn resolve_model_path(&self) -> PathBuf {
        resolve(&self.model_path, self.data_dir.as_deref())
    }
}

/// Location and trained mass range of the tensor-product fragment models.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FragmentModelConfig {
    pub model_path: PathBuf,
    pub data_dir: Option<PathBuf>,
    pub min_precursor_mass: f64,
    pub max_precursor_mass: f64,
    pub min_fragment_mass: f64,
    pub max_fragment_mass: f64,
}

impl Default for FragmentModelConfig {
    fn default() -> Self {
        FragmentModelConfig {
            model_path: PathBuf::from(DEFAULT_FRAGMENT_MODEL_PATH),
            data_dir: None,
            min_precursor_mass: 300.0,
            max_precursor_mass: 8500.0,
            min_fragment_mass: 300.0,
            max_fragment_mass: 8500.0,
        }
    }
}

impl FragmentModelConfig {
    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        FragmentModelConfig {
            model_path: model_path.into(),
            ..Default::default()
        }
    }

    /// defaults with the data directory taken from `ISOSPLINE_DATA_DIR`
    pub fn from_env() -> Self {
        FragmentModelConfig {
            data_dir: env_path(DATA_DIR_ENV),
            ..Default::default()
        }
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let config: FragmentModelConfig = read_json(path.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    pub fn resolve_model_path(&self) -> PathBuf {
        resolve(&self.model_path, self.data_dir.as_deref())
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_precursor_mass >= self.max_precursor_mass || self.min_fragment_mass >= self.max_fragment_mass {
            return Err(IsotopeSplineError::Config(format!(
                "empty mass range: precursor [{}, {}], fragment [{}, {}]",
                self.min_precursor_mass, self.max_precursor_mass, self.min_fragment_mass, self.max_fragment_mass
            )));
        }
        Ok(())
    }
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var_os(key)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path).map_err(|e| IsotopeSplineError::io(path, &e))?;
    serde_json::from_str(&text)
        .map_err(|e| IsotopeSplineError::Config(format!("{}: {}", path.display(), e)))
}

fn resolve(path: &Path, data_dir: Option<&Path>) -> PathBuf {
    match data_dir {
        Some(dir) if path.is_relative() && !path.exists() => dir.join(path),
        _ => path.to_path_buf(),
    }
}
