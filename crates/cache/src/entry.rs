//! Cache entries and the byte-budgeted index each tier keeps
//!
//! `CacheStore` is the single place where an entry enters or leaves a tier's
//! index, so the running byte counter is updated in the same step as the map.
//! It holds no lock of its own; tiers wrap it in a mutex.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::policy::{select_victim, EvictionPolicy};
use crate::CacheError;

/// A single key → payload record
///
/// For the RAM tier `T` is the payload bytes; for the disk tier it is the
/// path of the file holding them. `size` is always the payload byte length.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    /// Key, unique within a tier
    pub key: String,

    /// Payload (or a reference to it)
    pub payload: T,

    /// Payload size in bytes
    pub size: usize,

    /// When the entry was inserted
    pub created_at: Instant,

    /// When the entry was last returned by a successful lookup
    pub last_accessed_at: Instant,

    /// Number of successful lookups
    pub access_count: u64,

    /// Expiry deadline, if the entry was stored with a TTL
    pub expires_at: Option<Instant>,

    /// Logical clock reading at insertion
    pub(crate) created_tick: u64,

    /// Logical clock reading at the last access (or insertion)
    pub(crate) accessed_tick: u64,
}

impl<T> CacheEntry<T> {
    /// Whether the entry's TTL has run out at `now`
    pub fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Outcome of a lookup in a [`CacheStore`]
#[derive(Debug)]
pub enum Lookup<'a, T> {
    /// Entry found and its access bookkeeping updated
    Hit(&'a CacheEntry<T>),
    /// Entry was present but expired; it has been removed and is returned
    Expired(CacheEntry<T>),
    /// No entry with that key
    Missing,
}

/// Result of inserting into a [`CacheStore`]
#[derive(Debug)]
pub struct Insertion<T> {
    /// Previous entry stored under the same key
    pub replaced: Option<CacheEntry<T>>,
    /// Entries removed to make room, in eviction order
    pub evicted: Vec<CacheEntry<T>>,
}

/// Byte-budgeted index for one tier
#[derive(Debug)]
pub struct CacheStore<T> {
    entries: HashMap<String, CacheEntry<T>>,
    current_bytes: usize,
    max_bytes: usize,
    policy: EvictionPolicy,
    clock: u64,
    evictions: u64,
    expirations: u64,
}

impl<T> CacheStore<T> {
    pub fn new(max_bytes: usize, policy: EvictionPolicy) -> Self {
        Self {
            entries: HashMap::new(),
            current_bytes: 0,
            max_bytes,
            policy,
            clock: 0,
            evictions: 0,
            expirations: 0,
        }
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Insert an entry, evicting others first if it would not fit.
    ///
    /// An entry larger than the whole budget is rejected with
    /// [`CacheError::Capacity`] and the store is left untouched.
    pub fn insert(
        &mut self,
        key: &str,
        payload: T,
        size: usize,
        ttl: Option<Duration>,
        now: Instant,
    ) -> Result<Insertion<T>, CacheError> {
        if size > self.max_bytes {
            return Err(CacheError::Capacity {
                key: key.to_string(),
                size,
                limit: self.max_bytes,
            });
        }

        let replaced = self.take(key);
        let evicted = self.evict_down_to(self.max_bytes - size);

        let tick = self.tick();
        let entry = CacheEntry {
            key: key.to_string(),
            payload,
            size,
            created_at: now,
            last_accessed_at: now,
            access_count: 0,
            expires_at: ttl.map(|ttl| now + ttl),
            created_tick: tick,
            accessed_tick: tick,
        };
        self.current_bytes += size;
        self.entries.insert(entry.key.clone(), entry);

        Ok(Insertion { replaced, evicted })
    }

    /// Look up `key`, updating access bookkeeping on a hit.
    ///
    /// Expired entries are removed eagerly.
    pub fn lookup(&mut self, key: &str, now: Instant) -> Lookup<'_, T> {
        let expired = match self.entries.get(key) {
            None => return Lookup::Missing,
            Some(entry) => entry.is_expired(now),
        };

        if expired {
            self.expirations += 1;
            return match self.take(key) {
                Some(entry) => Lookup::Expired(entry),
                None => Lookup::Missing,
            };
        }

        let tick = self.tick();
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.last_accessed_at = now;
                entry.access_count += 1;
                entry.accessed_tick = tick;
                Lookup::Hit(&*entry)
            }
            None => Lookup::Missing,
        }
    }

    /// Look at an entry without touching its access bookkeeping
    pub fn peek(&self, key: &str) -> Option<&CacheEntry<T>> {
        self.entries.get(key)
    }

    /// Remove an entry explicitly
    pub fn remove(&mut self, key: &str) -> Option<CacheEntry<T>> {
        self.take(key)
    }

    fn take(&mut self, key: &str) -> Option<CacheEntry<T>> {
        let entry = self.entries.remove(key)?;
        self.current_bytes = self.current_bytes.saturating_sub(entry.size);
        Some(entry)
    }

    /// Evict entries via the policy until usage is at most `target_bytes`
    pub fn evict_down_to(&mut self, target_bytes: usize) -> Vec<CacheEntry<T>> {
        let mut evicted = Vec::new();
        while self.current_bytes > target_bytes {
            let victim = match select_victim(self.policy, self.entries.values()) {
                Some(victim) => victim.key.clone(),
                None => break,
            };
            if let Some(entry) = self.take(&victim) {
                self.evictions += 1;
                evicted.push(entry);
            }
        }
        evicted
    }

    /// Evict until usage fits the configured budget
    pub fn evict_if_over_budget(&mut self) -> Vec<CacheEntry<T>> {
        self.evict_down_to(self.max_bytes)
    }

    /// Drop every expired entry
    pub fn purge_expired(&mut self, now: Instant) -> Vec<CacheEntry<T>> {
        let keys: Vec<String> = self
            .entries
            .values()
            .filter(|e| e.is_expired(now))
            .map(|e| e.key.clone())
            .collect();

        let mut purged = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(entry) = self.take(&key) {
                self.expirations += 1;
                purged.push(entry);
            }
        }
        purged
    }

    /// Remove everything, returning the removed entries
    pub fn clear(&mut self) -> Vec<CacheEntry<T>> {
        self.current_bytes = 0;
        self.entries.drain().map(|(_, entry)| entry).collect()
    }

    /// Change the budget, evicting down to it immediately
    pub fn set_max_bytes(&mut self, max_bytes: usize) -> Vec<CacheEntry<T>> {
        self.max_bytes = max_bytes;
        self.evict_if_over_budget()
    }

    pub fn set_policy(&mut self, policy: EvictionPolicy) {
        self.policy = policy;
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.policy
    }

    pub fn current_bytes(&self) -> usize {
        self.current_bytes
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn evictions(&self) -> u64 {
        self.evictions
    }

    pub fn expirations(&self) -> u64 {
        self.expirations
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}
