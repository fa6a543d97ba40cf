//! Mediaflow Cache Library
//!
//! Two-tier (memory + disk) byte cache with per-tier budgets and pluggable
//! eviction (LRU, LFU, FIFO, TTL). Payloads are opaque bytes; callers own
//! their serialization.

pub mod config;
pub mod disk;
pub mod entry;
pub mod policy;
pub mod ram;
pub mod tiered;

pub use config::{CacheConfig, ConfigError};
pub use disk::DiskTier;
pub use entry::{CacheEntry, CacheStore, Insertion, Lookup};
pub use policy::{select_victim, EvictionPolicy, ParsePolicyError};
pub use ram::RamTier;
pub use tiered::{CacheStats, Tier, TieredCache};

/// Cache error
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Entry larger than the tier's entire budget; nothing was evicted
    #[error("entry `{key}` is {size} bytes, larger than the tier budget of {limit} bytes")]
    Capacity { key: String, size: usize, limit: usize },

    /// Disk read or write failure
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Statistics for a single tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct TierStats {
    pub entries: usize,
    pub bytes_used: usize,
    pub bytes_limit: usize,
    pub policy: EvictionPolicy,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
}

impl TierStats {
    /// Usage relative to the budget (0.0 to 1.0)
    pub fn utilization(&self) -> f64 {
        if self.bytes_limit == 0 {
            0.0
        } else {
            self.bytes_used as f64 / self.bytes_limit as f64
        }
    }
}
