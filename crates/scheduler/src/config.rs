//! Scheduler configuration

use serde::{Deserialize, Serialize};

use crate::worker::default_concurrency;

/// Configuration for [`crate::TaskScheduler`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Upper bound on tasks in Processing at once. Zero is treated as one.
    pub max_concurrent_tasks: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: default_concurrency(),
        }
    }
}

/// Error loading scheduler configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: `{value}`")]
    InvalidValue { name: String, value: String },
}

impl SchedulerConfig {
    /// Create a config with the given concurrency limit
    pub fn new(max_concurrent_tasks: usize) -> Self {
        Self {
            max_concurrent_tasks,
        }
    }

    /// Sets the maximum number of tasks processed at once
    pub fn with_max_concurrent_tasks(mut self, max: usize) -> Self {
        self.max_concurrent_tasks = max;
        self
    }

    /// Concurrency bound actually applied
    pub fn effective_max(&self) -> usize {
        self.max_concurrent_tasks.max(1)
    }

    /// Defaults overridden by environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Apply `MEDIAFLOW_MAX_CONCURRENT_TASKS` if set
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        const VAR: &str = "MEDIAFLOW_MAX_CONCURRENT_TASKS";
        if let Ok(value) = std::env::var(VAR) {
            self.max_concurrent_tasks =
                value
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue {
                        name: VAR.to_string(),
                        value,
                    })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    #[test]
    fn test_default_is_at_least_one() {
        let config = SchedulerConfig::default();
        assert!(config.max_concurrent_tasks >= 1);
    }

    #[test]
    fn test_zero_is_clamped() {
        assert_eq!(SchedulerConfig::new(0).effective_max(), 1);
        assert_eq!(SchedulerConfig::new(3).effective_max(), 3);
    }

    #[test]
    #[serial]
    fn test_from_env() {
        env::set_var("MEDIAFLOW_MAX_CONCURRENT_TASKS", " 6 ");
        let config = SchedulerConfig::from_env().unwrap();
        assert_eq!(config.max_concurrent_tasks, 6);

        env::set_var("MEDIAFLOW_MAX_CONCURRENT_TASKS", "many");
        assert!(SchedulerConfig::from_env().is_err());

        env::remove_var("MEDIAFLOW_MAX_CONCURRENT_TASKS");
    }

    #[test]
    fn test_deserialize_missing_keys_use_defaults() {
        let config: SchedulerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, SchedulerConfig::default());
    }
}
