//! Runtime configuration

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{DompteurError, FilterMode, Result};

/// Analysis window handed to the threshold estimator (samples)
pub const ESTIMATOR_WINDOW: usize = 512;

/// Analysis hop handed to the threshold estimator (samples)
pub const ESTIMATOR_HOP: usize = 256;

/// External hearing-threshold estimator invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Launcher script of the estimator
    pub program: PathBuf,

    /// Runtime directory passed as the launcher's first argument
    pub runtime_dir: PathBuf,

    /// Window length in samples
    pub window: usize,

    /// Hop length in samples
    pub hop: usize,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("/root/hearing_thresholds/run_calc_threshold.sh"),
            runtime_dir: PathBuf::from("/usr/local/MATLAB/MATLAB_Runtime/v96"),
            window: ESTIMATOR_WINDOW,
            hop: ESTIMATOR_HOP,
        }
    }
}

/// Top-level configuration shared by the bridge, the batch preprocessor and
/// the command line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DompteurConfig {
    /// Filter strength; `None` disables filtering
    pub phi: FilterMode,

    /// Directory holding cached threshold surfaces, one file per identifier
    pub cache_dir: PathBuf,

    /// Batch worker count (0 = a third of the available cores)
    pub jobs: usize,

    /// Threads used by the numeric path of a single filter call
    pub numeric_threads: usize,

    /// Parent directory for scoped temporary work areas (None = system default)
    pub temp_dir: Option<PathBuf>,

    pub estimator: EstimatorConfig,
}

impl Default for DompteurConfig {
    fn default() -> Self {
        Self {
            phi: FilterMode::Identity,
            cache_dir: PathBuf::from("exp/threshs_tmp"),
            jobs: 0,
            numeric_threads: 1,
            temp_dir: None,
            estimator: EstimatorConfig::default(),
        }
    }
}

impl DompteurConfig {
    /// Load a JSON configuration file; missing fields take their defaults
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| DompteurError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the filter cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.numeric_threads == 0 {
            return Err(DompteurError::Config("numeric_threads must be at least 1".into()));
        }
        if self.estimator.window == 0 || self.estimator.hop == 0 {
            return Err(DompteurError::Config("estimator window and hop must be non-zero".into()));
        }
        Ok(())
    }

    /// Worker count with the automatic default resolved
    pub fn effective_jobs(&self) -> usize {
        if self.jobs == 0 {
            (num_cpus::get() / 3).max(1)
        } else {
            self.jobs
        }
    }

    /// Builder pattern: set φ
    pub fn with_phi(mut self, phi: FilterMode) -> Self {
        self.phi = phi;
        self
    }

    /// Builder pattern: set cache directory
    pub fn with_cache_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.cache_dir = dir.into();
        self
    }

    /// Builder pattern: set batch worker count
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs;
        self
    }

    /// Builder pattern: set numeric thread count
    pub fn with_numeric_threads(mut self, threads: usize) -> Self {
        self.numeric_threads = threads.max(1);
        self
    }

    /// Builder pattern: set estimator launcher
    pub fn with_estimator_program<P: Into<PathBuf>>(mut self, program: P) -> Self {
        self.estimator.program = program.into();
        self
    }

    /// Builder pattern: set estimator runtime directory
    pub fn with_estimator_runtime<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.estimator.runtime_dir = dir.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DompteurConfig::default();
        assert!(config.phi.is_identity());
        assert_eq!(config.numeric_threads, 1);
        assert_eq!(config.estimator.window, 512);
        assert_eq!(config.estimator.hop, 256);
        assert!(config.effective_jobs() >= 1);
    }

    #[test]
    fn test_builder_pattern() {
        let config = DompteurConfig::default()
            .with_phi(FilterMode::Masked(-6))
            .with_jobs(4)
            .with_numeric_threads(0)
            .with_cache_dir("/tmp/threshs");

        assert_eq!(config.phi, FilterMode::Masked(-6));
        assert_eq!(config.effective_jobs(), 4);
        assert_eq!(config.numeric_threads, 1);
        assert_eq!(config.cache_dir, PathBuf::from("/tmp/threshs"));
    }

    #[test]
    fn test_partial_json() {
        let config: DompteurConfig = serde_json::from_str(r#"{ "phi": "12", "jobs": 2 }"#).unwrap();
        assert_eq!(config.phi, FilterMode::Masked(12));
        assert_eq!(config.jobs, 2);
        assert_eq!(config.estimator, EstimatorConfig::default());
    }

    #[test]
    fn test_validate_rejects_zero_hop() {
        let mut config = DompteurConfig::default();
        config.estimator.hop = 0;
        assert!(config.validate().is_err());
    }
}
