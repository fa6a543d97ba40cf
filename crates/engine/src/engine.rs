//! Service wiring
//!
//! Builds the cache, scheduler and pressure monitor once and hands out shared
//! handles to them. There is no global instance; callers own the `Engine`.

use std::sync::Arc;

use crossbeam_channel::Sender;
use mediaflow_cache::{CacheError, TieredCache};
use mediaflow_scheduler::{SchedulerError, TaskScheduler};
use tracing::info;

use crate::config::{ConfigError, EngineConfig};
use crate::pressure::{MemoryPressureMonitor, PressureLevel};

/// Error starting the engine
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("failed to start pressure listener: {0}")]
    Listener(#[source] std::io::Error),
}

/// Background media engine: tiered cache, task scheduler and pressure monitor
///
/// # Example
///
/// ```
/// use mediaflow_engine::{Engine, EngineConfig, PressureLevel};
/// use mediaflow_cache::CacheConfig;
///
/// let dir = tempfile::tempdir().unwrap();
/// let config = EngineConfig {
///     cache: CacheConfig::default().with_disk_dir(dir.path()),
///     ..EngineConfig::default()
/// };
///
/// let engine = Engine::start(config).unwrap();
/// engine.cache().set_memory("waveform:take-1", vec![0u8; 64], None).unwrap();
///
/// engine.monitor().handle(PressureLevel::Warning);
/// assert_eq!(engine.cache().stats().memory_bytes_used, 0);
///
/// engine.shutdown();
/// ```
pub struct Engine {
    config: EngineConfig,
    cache: Arc<TieredCache>,
    scheduler: TaskScheduler,
    monitor: Arc<MemoryPressureMonitor>,
}

impl Engine {
    /// Open the cache, start the scheduler and wire the monitor to both
    pub fn start(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;

        let cache = Arc::new(TieredCache::open(&config.cache)?);
        let scheduler = TaskScheduler::new(config.scheduler.clone())?;
        let monitor = Arc::new(
            MemoryPressureMonitor::new(config.pressure.clone())
                .with_cache(cache.clone())
                .with_scheduler(scheduler.clone()),
        );

        info!(
            disk_dir = %config.cache.disk_dir.display(),
            memory_limit = config.cache.memory_limit_bytes,
            disk_limit = config.cache.disk_limit_bytes,
            max_concurrent = scheduler.max_concurrent(),
            "engine started"
        );

        Ok(Self {
            config,
            cache,
            scheduler,
            monitor,
        })
    }

    /// Configuration the engine was started with
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Shared tiered cache
    pub fn cache(&self) -> &Arc<TieredCache> {
        &self.cache
    }

    /// Task scheduler handle
    pub fn scheduler(&self) -> &TaskScheduler {
        &self.scheduler
    }

    /// Shared pressure monitor
    pub fn monitor(&self) -> &Arc<MemoryPressureMonitor> {
        &self.monitor
    }

    /// Channel for the platform's pressure notifications
    pub fn pressure_signals(&self) -> Result<Sender<PressureLevel>, EngineError> {
        self.monitor.signal_sender().map_err(EngineError::Listener)
    }

    /// Stop the pressure listener and the scheduler
    pub fn shutdown(&self) {
        self.monitor.detach();
        self.scheduler.shutdown();
        info!("engine stopped");
    }
}
