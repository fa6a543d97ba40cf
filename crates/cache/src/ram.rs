//! RAM tier
//!
//! In-memory payload storage with a byte budget and policy-driven eviction.
//! This is the fast, reclaimable tier the pressure monitor clears first.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

use crate::entry::{CacheStore, Lookup};
use crate::policy::EvictionPolicy;
use crate::{CacheError, TierStats};

struct RamState {
    store: CacheStore<Vec<u8>>,
    hits: u64,
    misses: u64,
}

/// In-memory cache tier
///
/// Thread-safe: every mutation of the index and its byte counter happens
/// under one lock, so concurrent `get`/`put`/`clear` never observe a torn
/// state.
///
/// # Example
///
/// ```
/// use mediaflow_cache::{EvictionPolicy, RamTier};
///
/// let tier = RamTier::new(1024, EvictionPolicy::Lru);
/// tier.put("thumb:clip-1:0", vec![7u8; 128], None).unwrap();
///
/// assert_eq!(tier.get("thumb:clip-1:0"), Some(vec![7u8; 128]));
/// assert_eq!(tier.stats().bytes_used, 128);
/// ```
pub struct RamTier {
    state: Mutex<RamState>,
}

impl RamTier {
    /// Create a RAM tier with a byte budget and eviction policy
    pub fn new(limit_bytes: usize, policy: EvictionPolicy) -> Self {
        Self {
            state: Mutex::new(RamState {
                store: CacheStore::new(limit_bytes, policy),
                hits: 0,
                misses: 0,
            }),
        }
    }

    /// Store a payload, evicting other entries if needed.
    ///
    /// Returns the number of entries evicted to make room.
    pub fn put(&self, key: &str, payload: Vec<u8>, ttl: Option<Duration>) -> Result<usize, CacheError> {
        let size = payload.len();
        let mut state = self.state.lock();
        let insertion = state.store.insert(key, payload, size, ttl, Instant::now())?;

        for victim in &insertion.evicted {
            debug!(tier = "memory", key = %victim.key, size = victim.size, "evicted entry");
        }
        Ok(insertion.evicted.len())
    }

    /// Fetch a copy of the payload stored under `key`
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        let mut state = self.state.lock();
        let payload = match state.store.lookup(key, Instant::now()) {
            Lookup::Hit(entry) => Some(entry.payload.clone()),
            Lookup::Expired(entry) => {
                debug!(tier = "memory", key = %entry.key, "entry expired on lookup");
                None
            }
            Lookup::Missing => None,
        };

        if payload.is_some() {
            state.hits += 1;
        } else {
            state.misses += 1;
        }
        payload
    }

    /// Check for a key without touching access bookkeeping
    pub fn contains(&self, key: &str) -> bool {
        let state = self.state.lock();
        state
            .store
            .peek(key)
            .is_some_and(|entry| !entry.is_expired(Instant::now()))
    }

    /// Remove an entry; returns whether one was present
    pub fn remove(&self, key: &str) -> bool {
        self.state.lock().store.remove(key).is_some()
    }

    /// Drop every entry; returns the number of bytes released
    pub fn clear(&self) -> usize {
        let mut state = self.state.lock();
        let released = state.store.current_bytes();
        state.store.clear();
        released
    }

    /// Drop expired entries; returns how many were removed
    pub fn purge_expired(&self) -> usize {
        self.state.lock().store.purge_expired(Instant::now()).len()
    }

    /// Change the byte budget, evicting down to it; returns entries evicted
    pub fn set_limit(&self, limit_bytes: usize) -> usize {
        self.state.lock().store.set_max_bytes(limit_bytes).len()
    }

    /// Switch the eviction policy at runtime
    pub fn set_policy(&self, policy: EvictionPolicy) {
        self.state.lock().store.set_policy(policy);
    }

    /// Current statistics
    pub fn stats(&self) -> TierStats {
        let state = self.state.lock();
        TierStats {
            entries: state.store.len(),
            bytes_used: state.store.current_bytes(),
            bytes_limit: state.store.max_bytes(),
            policy: state.store.policy(),
            hits: state.hits,
            misses: state.misses,
            evictions: state.store.evictions(),
            expirations: state.store.expirations(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_basic_put_get() {
        let tier = RamTier::new(1024, EvictionPolicy::Lru);
        let payload: Vec<u8> = (0..=255).collect();
        tier.put("a", payload.clone(), None).unwrap();

        assert_eq!(tier.get("a"), Some(payload));
        let stats = tier.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.bytes_used, 256);
    }

    #[test]
    fn test_cache_miss() {
        let tier = RamTier::new(1024, EvictionPolicy::Lru);
        assert!(tier.get("missing").is_none());
        assert_eq!(tier.stats().misses, 1);
        assert_eq!(tier.stats().hits, 0);
    }

    #[test]
    fn test_lru_ordering() {
        let tier = RamTier::new(300, EvictionPolicy::Lru);
        tier.put("a", vec![0; 100], None).unwrap();
        tier.put("b", vec![0; 100], None).unwrap();
        tier.put("c", vec![0; 100], None).unwrap();

        assert!(tier.get("a").is_some());
        assert_eq!(tier.put("d", vec![0; 100], None).unwrap(), 1);

        assert!(tier.contains("a"));
        assert!(!tier.contains("b"));
        assert!(tier.contains("c"));
        assert!(tier.contains("d"));
        assert_eq!(tier.stats().evictions, 1);
    }

    #[test]
    fn test_zero_ttl_expires_immediately() {
        let tier = RamTier::new(1024, EvictionPolicy::Ttl);
        tier.put("a", vec![1; 10], Some(Duration::ZERO)).unwrap();
        assert!(tier.get("a").is_none());

        let stats = tier.stats();
        assert_eq!(stats.bytes_used, 0);
        assert_eq!(stats.entries, 0);
        assert_eq!(stats.expirations, 1);
    }

    #[test]
    fn test_oversized_rejected() {
        let tier = RamTier::new(64, EvictionPolicy::Lru);
        tier.put("small", vec![0; 32], None).unwrap();
        let err = tier.put("big", vec![0; 65], None).unwrap_err();
        assert!(matches!(err, CacheError::Capacity { .. }));
        assert!(tier.contains("small"));
    }

    #[test]
    fn test_clear_and_remove() {
        let tier = RamTier::new(1024, EvictionPolicy::Lru);
        tier.put("a", vec![0; 10], None).unwrap();
        tier.put("b", vec![0; 20], None).unwrap();

        assert!(tier.remove("a"));
        assert!(!tier.remove("a"));
        assert_eq!(tier.clear(), 20);
        assert_eq!(tier.stats().bytes_used, 0);
        assert_eq!(tier.stats().entries, 0);
    }

    #[test]
    fn test_set_limit_evicts() {
        let tier = RamTier::new(100, EvictionPolicy::Fifo);
        for key in ["a", "b", "c", "d"] {
            tier.put(key, vec![0; 25], None).unwrap();
        }
        assert_eq!(tier.set_limit(30), 3);
        assert!(tier.contains("d"));
        assert_eq!(tier.stats().bytes_limit, 30);
    }

    #[test]
    fn test_concurrent_access_stays_within_budget() {
        let tier = Arc::new(RamTier::new(4_096, EvictionPolicy::Lru));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let tier = tier.clone();
                thread::spawn(move || {
                    for i in 0..200 {
                        let key = format!("{}-{}", t, i % 17);
                        tier.put(&key, vec![t as u8; 100 + i % 300], None).unwrap();
                        tier.get(&key);
                        if i % 50 == 0 {
                            tier.clear();
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let stats = tier.stats();
        assert!(stats.bytes_used <= stats.bytes_limit);
    }
}
