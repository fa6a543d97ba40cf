//! Engine configuration
//!
//! One TOML document with optional `[cache]`, `[scheduler]` and `[pressure]`
//! tables. Every key has a default. Environment variables override the file.

use std::path::{Path, PathBuf};

use mediaflow_cache::CacheConfig;
use mediaflow_scheduler::SchedulerConfig;
use serde::{Deserialize, Serialize};

use crate::pressure::PressureConfig;

/// Error loading engine configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error(transparent)]
    Cache(#[from] mediaflow_cache::ConfigError),

    #[error(transparent)]
    Scheduler(#[from] mediaflow_scheduler::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Complete engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub cache: CacheConfig,
    pub scheduler: SchedulerConfig,
    pub pressure: PressureConfig,
}

impl EngineConfig {
    /// Parse config from a TOML string, then apply environment overrides.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(toml_str)?;
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Defaults with environment overrides applied
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `MEDIAFLOW_*` environment overrides.
    ///
    /// See [`CacheConfig::apply_env`] and [`SchedulerConfig::apply_env`] for
    /// the variables each section reads.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.cache.apply_env()?;
        self.scheduler.apply_env()?;
        Ok(())
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.pressure.thresholds.is_valid() {
            return Err(ConfigError::Invalid(format!(
                "pressure thresholds must ascend within (0, 1], got {:?}",
                self.pressure.thresholds
            )));
        }
        if self.cache.disk_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("cache.disk_dir is empty".to_string()));
        }
        Ok(())
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}
