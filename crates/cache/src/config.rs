//! Cache configuration: tier budgets, policies, and the disk location.
//!
//! Configuration can be deserialized (it is the `[cache]` table of the engine
//! config file), overridden from environment variables, or built in code.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::policy::EvictionPolicy;

const MB: usize = 1024 * 1024;

/// Configuration for both cache tiers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Memory tier budget in bytes
    pub memory_limit_bytes: usize,
    /// Disk tier budget in bytes
    pub disk_limit_bytes: usize,
    /// Eviction policy for the memory tier
    pub memory_policy: EvictionPolicy,
    /// Eviction policy for the disk tier
    pub disk_policy: EvictionPolicy,
    /// Directory holding disk tier files
    pub disk_dir: PathBuf,
    /// TTL for memory entries stored without one (`None` = never expire)
    pub default_ttl_secs: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_limit_bytes: 256 * MB,
            disk_limit_bytes: 1024 * MB,
            memory_policy: EvictionPolicy::Lru,
            disk_policy: EvictionPolicy::Lru,
            disk_dir: Self::default_cache_dir(),
            default_ttl_secs: None,
        }
    }
}

/// Error loading cache configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: `{value}`")]
    InvalidValue { name: String, value: String },
}

impl CacheConfig {
    /// Sets the memory tier budget in bytes.
    pub fn with_memory_limit(mut self, bytes: usize) -> Self {
        self.memory_limit_bytes = bytes;
        self
    }

    /// Sets the disk tier budget in bytes.
    pub fn with_disk_limit(mut self, bytes: usize) -> Self {
        self.disk_limit_bytes = bytes;
        self
    }

    /// Sets the memory tier budget in megabytes.
    pub fn with_memory_mb(self, mb: usize) -> Self {
        self.with_memory_limit(mb.saturating_mul(MB))
    }

    /// Sets the disk tier budget in megabytes.
    pub fn with_disk_mb(self, mb: usize) -> Self {
        self.with_disk_limit(mb.saturating_mul(MB))
    }

    pub fn with_memory_policy(mut self, policy: EvictionPolicy) -> Self {
        self.memory_policy = policy;
        self
    }

    pub fn with_disk_policy(mut self, policy: EvictionPolicy) -> Self {
        self.disk_policy = policy;
        self
    }

    /// Sets the disk cache directory.
    pub fn with_disk_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.disk_dir = path.as_ref().to_path_buf();
        self
    }

    pub fn with_default_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.default_ttl_secs = ttl.map(|ttl| ttl.as_secs());
        self
    }

    pub fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl_secs.map(Duration::from_secs)
    }

    /// Returns the default cache directory for the current platform.
    ///
    /// - macOS: ~/Library/Caches/mediaflow/cache
    /// - Linux: ~/.cache/mediaflow/cache
    /// - Windows: %LOCALAPPDATA%\mediaflow\cache
    pub fn default_cache_dir() -> PathBuf {
        match dirs::cache_dir() {
            Some(cache_dir) => cache_dir.join("mediaflow").join("cache"),
            None => PathBuf::from("cache/mediaflow"),
        }
    }

    /// Defaults overridden by environment variables; see [`Self::apply_env`].
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Override fields from environment variables.
    ///
    /// - `MEDIAFLOW_MEMORY_CACHE_MB`: memory tier budget in MB
    /// - `MEDIAFLOW_DISK_CACHE_MB`: disk tier budget in MB
    /// - `MEDIAFLOW_MEMORY_POLICY` / `MEDIAFLOW_DISK_POLICY`: lru, lfu, fifo or ttl
    /// - `MEDIAFLOW_CACHE_DIR`: disk tier directory
    /// - `MEDIAFLOW_CACHE_TTL_SECS`: default memory TTL
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Some(bytes) = env_megabytes("MEDIAFLOW_MEMORY_CACHE_MB")? {
            self.memory_limit_bytes = bytes;
        }
        if let Some(bytes) = env_megabytes("MEDIAFLOW_DISK_CACHE_MB")? {
            self.disk_limit_bytes = bytes;
        }
        if let Some(policy) = env_parse::<EvictionPolicy>("MEDIAFLOW_MEMORY_POLICY")? {
            self.memory_policy = policy;
        }
        if let Some(policy) = env_parse::<EvictionPolicy>("MEDIAFLOW_DISK_POLICY")? {
            self.disk_policy = policy;
        }
        if let Ok(dir) = std::env::var("MEDIAFLOW_CACHE_DIR") {
            self.disk_dir = PathBuf::from(dir);
        }
        if let Some(secs) = env_parse::<u64>("MEDIAFLOW_CACHE_TTL_SECS")? {
            self.default_ttl_secs = Some(secs);
        }
        Ok(())
    }
}

/// Parse an environment variable if it is set
pub fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                name: name.to_string(),
                value,
            }),
        Err(_) => Ok(None),
    }
}

/// Read a megabyte count and convert it to bytes, rejecting values that overflow
fn env_megabytes(name: &str) -> Result<Option<usize>, ConfigError> {
    let Some(mb) = env_parse::<usize>(name)? else {
        return Ok(None);
    };
    mb.checked_mul(MB)
        .map(Some)
        .ok_or_else(|| ConfigError::InvalidValue {
            name: name.to_string(),
            value: mb.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    const VARS: [&str; 6] = [
        "MEDIAFLOW_MEMORY_CACHE_MB",
        "MEDIAFLOW_DISK_CACHE_MB",
        "MEDIAFLOW_MEMORY_POLICY",
        "MEDIAFLOW_DISK_POLICY",
        "MEDIAFLOW_CACHE_DIR",
        "MEDIAFLOW_CACHE_TTL_SECS",
    ];

    fn clear_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert_eq!(config.memory_limit_bytes, 256 * MB);
        assert_eq!(config.disk_limit_bytes, 1024 * MB);
        assert_eq!(config.memory_policy, EvictionPolicy::Lru);
        assert!(config.disk_dir.ends_with("cache") || config.disk_dir.ends_with("mediaflow"));
        assert_eq!(config.default_ttl(), None);
    }

    #[test]
    fn test_builder() {
        let config = CacheConfig::default()
            .with_memory_mb(64)
            .with_disk_limit(4096)
            .with_disk_policy(EvictionPolicy::Fifo)
            .with_disk_dir("/tmp/mf")
            .with_default_ttl(Some(Duration::from_secs(30)));

        assert_eq!(config.memory_limit_bytes, 64 * MB);
        assert_eq!(config.disk_limit_bytes, 4096);
        assert_eq!(config.disk_policy, EvictionPolicy::Fifo);
        assert_eq!(config.disk_dir, PathBuf::from("/tmp/mf"));
        assert_eq!(config.default_ttl(), Some(Duration::from_secs(30)));
    }

    #[test]
    #[serial]
    fn test_from_env() {
        clear_env();
        env::set_var("MEDIAFLOW_MEMORY_CACHE_MB", "32");
        env::set_var("MEDIAFLOW_DISK_POLICY", "LFU");
        env::set_var("MEDIAFLOW_CACHE_DIR", "/var/tmp/mediaflow");

        let config = CacheConfig::from_env().unwrap();
        assert_eq!(config.memory_limit_bytes, 32 * MB);
        assert_eq!(config.disk_policy, EvictionPolicy::Lfu);
        assert_eq!(config.disk_dir, PathBuf::from("/var/tmp/mediaflow"));
        assert_eq!(config.disk_limit_bytes, 1024 * MB);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_invalid_value() {
        clear_env();
        env::set_var("MEDIAFLOW_DISK_CACHE_MB", "lots");

        let err = CacheConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("MEDIAFLOW_DISK_CACHE_MB"));

        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_megabytes_overflow() {
        clear_env();
        env::set_var("MEDIAFLOW_MEMORY_CACHE_MB", usize::MAX.to_string());

        let err = CacheConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("MEDIAFLOW_MEMORY_CACHE_MB"));

        assert_eq!(CacheConfig::default().with_disk_mb(usize::MAX).disk_limit_bytes, usize::MAX);
        clear_env();
    }
}
