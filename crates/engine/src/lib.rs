//! Mediaflow Engine
//!
//! Wires the tiered cache and the task scheduler to a memory-pressure
//! monitor that releases cache tiers, sheds queued work and notifies
//! resource-holding collaborators as pressure escalates.

pub mod config;
pub mod engine;
pub mod pressure;

pub use config::{ConfigError, EngineConfig};
pub use engine::{Engine, EngineError};
pub use pressure::{
    CleanupCallback, DiskResponse, MemoryPressureMonitor, PressureConfig, PressureLevel,
    PressureResponse, PressureStats, PressureThresholds, SubscriptionId,
};
