//! Two-tier cache facade
//!
//! Routes reads and writes to the RAM and disk tiers, keeps the combined
//! hit-rate metric, and swallows disk I/O failures: the cache is an
//! optimization, so a failed read is a miss and a failed write is a no-op.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::CacheConfig;
use crate::disk::DiskTier;
use crate::policy::EvictionPolicy;
use crate::ram::RamTier;
use crate::{CacheError, TierStats};

/// One of the two storage layers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Memory,
    Disk,
}

/// Snapshot of cache health across both tiers
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// Cumulative hits / (hits + misses), both tiers combined
    pub hit_rate: f64,
    pub hits: u64,
    pub misses: u64,
    pub memory_bytes_used: usize,
    pub disk_bytes_used: usize,
    pub memory_entries: usize,
    pub disk_entries: usize,
    /// Evictions across both tiers
    pub evictions: u64,
    /// Entries dropped because their TTL ran out
    pub expirations: u64,
    /// Disk reads and writes that failed and were treated as misses/no-ops
    pub io_errors: u64,
}

#[derive(Default)]
struct HitCounter {
    hits: u64,
    misses: u64,
    hit_rate: f64,
}

impl HitCounter {
    fn record(&mut self, hit: bool) {
        if hit {
            self.hits += 1;
        } else {
            self.misses += 1;
        }
        self.hit_rate = self.hits as f64 / (self.hits + self.misses) as f64;
    }
}

/// Memory + disk cache with per-tier budgets and policies
///
/// # Example
///
/// ```
/// use mediaflow_cache::{CacheConfig, TieredCache};
///
/// let dir = tempfile::tempdir().unwrap();
/// let config = CacheConfig::default()
///     .with_memory_limit(1024 * 1024)
///     .with_disk_dir(dir.path());
/// let cache = TieredCache::open(&config).unwrap();
///
/// cache.set_memory("frame:42", vec![1, 2, 3], None).unwrap();
/// assert_eq!(cache.get_memory("frame:42"), Some(vec![1, 2, 3]));
///
/// cache.set_disk("waveform:clip-1", vec![9; 16]).unwrap();
/// assert_eq!(cache.get_disk("waveform:clip-1"), Some(vec![9; 16]));
///
/// assert_eq!(cache.stats().hit_rate, 1.0);
/// ```
pub struct TieredCache {
    ram: RamTier,
    disk: DiskTier,
    default_ttl: Option<Duration>,
    lookups: Mutex<HitCounter>,
    io_errors: AtomicU64,
}

impl TieredCache {
    /// Build both tiers from configuration, creating the disk directory
    pub fn open(config: &CacheConfig) -> Result<Self, CacheError> {
        let ram = RamTier::new(config.memory_limit_bytes, config.memory_policy);
        let disk = DiskTier::open(&config.disk_dir, config.disk_limit_bytes, config.disk_policy)?;
        Ok(Self::from_tiers(ram, disk).with_default_ttl(config.default_ttl()))
    }

    /// Assemble a cache from already constructed tiers
    pub fn from_tiers(ram: RamTier, disk: DiskTier) -> Self {
        Self {
            ram,
            disk,
            default_ttl: None,
            lookups: Mutex::new(HitCounter::default()),
            io_errors: AtomicU64::new(0),
        }
    }

    /// TTL applied to memory entries stored without an explicit one
    pub fn with_default_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.default_ttl = ttl;
        self
    }

    fn record_lookup(&self, hit: bool) {
        self.lookups.lock().record(hit);
    }

    fn record_io_error(&self, tier: Tier, key: &str, error: &CacheError) {
        self.io_errors.fetch_add(1, Ordering::Relaxed);
        warn!(?tier, key, error = %error, "cache I/O failed, treating as miss");
    }

    /// Store a payload in the memory tier.
    ///
    /// Fails only with [`CacheError::Capacity`] when the payload is larger
    /// than the tier's whole budget.
    pub fn set_memory(&self, key: &str, payload: Vec<u8>, ttl: Option<Duration>) -> Result<(), CacheError> {
        self.ram.put(key, payload, ttl.or(self.default_ttl))?;
        Ok(())
    }

    /// Fetch a payload from the memory tier
    pub fn get_memory(&self, key: &str) -> Option<Vec<u8>> {
        let payload = self.ram.get(key);
        self.record_lookup(payload.is_some());
        payload
    }

    /// Store a payload in the disk tier.
    ///
    /// Fails only with [`CacheError::Capacity`]; write failures are logged,
    /// counted, and otherwise ignored.
    pub fn set_disk(&self, key: &str, payload: Vec<u8>) -> Result<(), CacheError> {
        match self.disk.put(key, &payload) {
            Ok(_) => Ok(()),
            Err(err @ CacheError::Capacity { .. }) => Err(err),
            Err(err) => {
                self.record_io_error(Tier::Disk, key, &err);
                Ok(())
            }
        }
    }

    /// Fetch a payload from the disk tier
    pub fn get_disk(&self, key: &str) -> Option<Vec<u8>> {
        let payload = self.read_disk(key);
        self.record_lookup(payload.is_some());
        payload
    }

    fn read_disk(&self, key: &str) -> Option<Vec<u8>> {
        match self.disk.get(key) {
            Ok(payload) => payload,
            Err(err) => {
                self.record_io_error(Tier::Disk, key, &err);
                None
            }
        }
    }

    /// Look in memory first, then on disk.
    ///
    /// A disk hit is copied into the memory tier. Counts as one lookup.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        if let Some(payload) = self.ram.get(key) {
            self.record_lookup(true);
            return Some(payload);
        }

        let payload = self.read_disk(key);
        if let Some(payload) = &payload {
            if let Err(err) = self.ram.put(key, payload.clone(), self.default_ttl) {
                debug!(key, error = %err, "disk hit not promoted to memory");
            }
        }
        self.record_lookup(payload.is_some());
        payload
    }

    /// Whether `key` is present in `tier`, without access bookkeeping
    pub fn contains(&self, tier: Tier, key: &str) -> bool {
        match tier {
            Tier::Memory => self.ram.contains(key),
            Tier::Disk => self.disk.contains(key),
        }
    }

    /// Remove `key` from `tier`; returns whether it was present
    pub fn remove(&self, tier: Tier, key: &str) -> bool {
        match tier {
            Tier::Memory => self.ram.remove(key),
            Tier::Disk => self.disk.remove(key),
        }
    }

    /// Wipe the memory tier; returns bytes released
    pub fn clear_memory(&self) -> usize {
        let released = self.ram.clear();
        info!(tier = "memory", bytes = released, "cleared tier");
        released
    }

    /// Wipe the disk tier and its files; returns bytes released
    pub fn clear_disk(&self) -> usize {
        self.disk.clear()
    }

    /// Wipe both tiers; returns bytes released
    pub fn clear_all(&self) -> usize {
        self.clear_memory() + self.clear_disk()
    }

    /// Evict disk entries until at most `target_bytes` remain
    pub fn shrink_disk_to(&self, target_bytes: usize) -> usize {
        self.disk.shrink_to(target_bytes)
    }

    /// Drop expired memory entries; returns how many were removed
    pub fn purge_expired(&self) -> usize {
        self.ram.purge_expired()
    }

    /// Switch a tier's eviction policy at runtime
    pub fn set_policy(&self, tier: Tier, policy: EvictionPolicy) {
        match tier {
            Tier::Memory => self.ram.set_policy(policy),
            Tier::Disk => self.disk.set_policy(policy),
        }
    }

    /// Change a tier's byte budget, evicting down to it; returns entries evicted
    pub fn set_budget(&self, tier: Tier, limit_bytes: usize) -> usize {
        match tier {
            Tier::Memory => self.ram.set_limit(limit_bytes),
            Tier::Disk => self.disk.set_limit(limit_bytes),
        }
    }

    /// Per-tier statistics
    pub fn tier_stats(&self, tier: Tier) -> TierStats {
        match tier {
            Tier::Memory => self.ram.stats(),
            Tier::Disk => self.disk.stats(),
        }
    }

    /// Combined hit rate, recomputed on every lookup
    pub fn hit_rate(&self) -> f64 {
        self.lookups.lock().hit_rate
    }

    /// Read-only snapshot of both tiers
    pub fn stats(&self) -> CacheStats {
        let memory = self.ram.stats();
        let disk = self.disk.stats();
        let lookups = self.lookups.lock();
        CacheStats {
            hit_rate: lookups.hit_rate,
            hits: lookups.hits,
            misses: lookups.misses,
            memory_bytes_used: memory.bytes_used,
            disk_bytes_used: disk.bytes_used,
            memory_entries: memory.entries,
            disk_entries: disk.entries,
            evictions: memory.evictions + disk.evictions,
            expirations: memory.expirations + disk.expirations,
            io_errors: self.io_errors.load(Ordering::Relaxed),
        }
    }
}
