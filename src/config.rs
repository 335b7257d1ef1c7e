//! Pipeline configuration, loaded from TOML.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::fitter::FitOptions;
use crate::optimizer::Method;
use crate::publish::{Publisher, DEFAULT_EXPERIMENT_PREFIX};
use crate::search::{GridSpec, SearchOptions};
use crate::types::Trend;

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Settings for one train/predict invocation.
///
/// Every field has a default, so a TOML file only needs the keys it
/// changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub p_min: usize,
    pub p_max: usize,
    pub d_min: usize,
    pub d_max: usize,
    pub q_min: usize,
    pub q_max: usize,
    /// Trend code: `n`, `c`, `t` or `ct`.
    pub trend: String,
    pub experiment_prefix: String,
    pub registry_root: PathBuf,
    pub scratch_dir: PathBuf,
    pub parallel: bool,
    /// `lbfgs` or `nelder-mead`.
    pub method: Method,
    pub maxiter: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            p_min: 0,
            p_max: 8,
            d_min: 0,
            d_max: 2,
            q_min: 0,
            q_max: 8,
            trend: "c".to_string(),
            experiment_prefix: DEFAULT_EXPERIMENT_PREFIX.to_string(),
            registry_root: PathBuf::from("registry"),
            scratch_dir: std::env::temp_dir(),
            parallel: true,
            method: Method::Lbfgs,
            maxiter: 500,
        }
    }
}

impl PipelineConfig {
    /// Load and validate a TOML file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        for (name, lo, hi) in [
            ("p", self.p_min, self.p_max),
            ("d", self.d_min, self.d_max),
            ("q", self.q_min, self.q_max),
        ] {
            if lo > hi {
                return Err(ConfigError::Validation(format!(
                    "{} range is empty: {}..={}",
                    name, lo, hi
                )));
            }
        }
        if Trend::parse(&self.trend).is_none() {
            return Err(ConfigError::Validation(format!(
                "unknown trend '{}' (expected n, c, t or ct)",
                self.trend
            )));
        }
        if self.experiment_prefix.is_empty()
            || self.experiment_prefix.contains(['/', '\\'])
        {
            return Err(ConfigError::Validation(format!(
                "experiment prefix '{}' must be a non-empty name without path separators",
                self.experiment_prefix
            )));
        }
        if self.maxiter == 0 {
            return Err(ConfigError::Validation(
                "maxiter must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn grid(&self) -> GridSpec {
        GridSpec::new(
            self.p_min..=self.p_max,
            self.d_min..=self.d_max,
            self.q_min..=self.q_max,
        )
    }

    pub fn trend(&self) -> ConfigResult<Trend> {
        Trend::parse(&self.trend)
            .ok_or_else(|| ConfigError::Validation(format!("unknown trend '{}'", self.trend)))
    }

    pub fn search_options(&self) -> SearchOptions {
        SearchOptions {
            fit: FitOptions {
                method: self.method,
                maxiter: self.maxiter,
            },
            parallel: self.parallel,
        }
    }

    pub fn publisher(&self) -> Publisher {
        Publisher::new(self.experiment_prefix.clone(), self.scratch_dir.clone())
    }
}
