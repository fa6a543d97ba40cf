//! Eviction victim selection
//!
//! A pure function over a set of entries: given the tier's policy it names
//! the entry to remove next. The tier owns the removal itself.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::entry::CacheEntry;

/// Rule used to pick the next entry to evict when a tier is over budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicy {
    /// Least recently accessed entry first
    #[default]
    Lru,
    /// Least frequently accessed entry first (ties go to the least recent)
    Lfu,
    /// Oldest inserted entry first
    Fifo,
    /// Entry expiring soonest first; tiers without expiring entries fall back to FIFO
    Ttl,
}

impl EvictionPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvictionPolicy::Lru => "lru",
            EvictionPolicy::Lfu => "lfu",
            EvictionPolicy::Fifo => "fifo",
            EvictionPolicy::Ttl => "ttl",
        }
    }
}

impl fmt::Display for EvictionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown policy name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown eviction policy `{0}` (expected lru, lfu, fifo or ttl)")]
pub struct ParsePolicyError(pub String);

impl FromStr for EvictionPolicy {
    type Err = ParsePolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lru" => Ok(EvictionPolicy::Lru),
            "lfu" => Ok(EvictionPolicy::Lfu),
            "fifo" => Ok(EvictionPolicy::Fifo),
            "ttl" => Ok(EvictionPolicy::Ttl),
            _ => Err(ParsePolicyError(s.to_string())),
        }
    }
}

/// Pick the next eviction victim among `entries` according to `policy`.
///
/// Returns `None` only when `entries` is empty. Ties are broken by the
/// logical insertion/access clock so the choice is deterministic.
pub fn select_victim<'a, T, I>(policy: EvictionPolicy, entries: I) -> Option<&'a CacheEntry<T>>
where
    T: 'a,
    I: IntoIterator<Item = &'a CacheEntry<T>>,
{
    let entries = entries.into_iter();
    match policy {
        EvictionPolicy::Lru => entries.min_by_key(|e| e.accessed_tick),
        EvictionPolicy::Lfu => entries.min_by_key(|e| (e.access_count, e.accessed_tick)),
        EvictionPolicy::Fifo => entries.min_by_key(|e| e.created_tick),
        EvictionPolicy::Ttl => {
            // Single pass: track the soonest-expiring entry and the FIFO fallback together.
            let mut soonest: Option<&CacheEntry<T>> = None;
            let mut oldest: Option<&CacheEntry<T>> = None;
            for entry in entries {
                if oldest.map_or(true, |o| entry.created_tick < o.created_tick) {
                    oldest = Some(entry);
                }
                if let Some(at) = entry.expires_at {
                    let better = match soonest.and_then(|s| s.expires_at.map(|sa| (sa, s.created_tick))) {
                        None => true,
                        Some(current) => (at, entry.created_tick) < current,
                    };
                    if better {
                        soonest = Some(entry);
                    }
                }
            }
            soonest.or(oldest)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn entry(key: &str, created: u64, accessed: u64, count: u64, ttl: Option<u64>) -> CacheEntry<()> {
        let now = Instant::now();
        CacheEntry {
            key: key.to_string(),
            payload: (),
            size: 1,
            created_at: now,
            last_accessed_at: now,
            access_count: count,
            expires_at: ttl.map(|secs| now + Duration::from_secs(secs)),
            created_tick: created,
            accessed_tick: accessed,
        }
    }

    #[test]
    fn test_empty_has_no_victim() {
        let entries: Vec<CacheEntry<()>> = Vec::new();
        for policy in [EvictionPolicy::Lru, EvictionPolicy::Lfu, EvictionPolicy::Fifo, EvictionPolicy::Ttl] {
            assert!(select_victim(policy, &entries).is_none());
        }
    }

    #[test]
    fn test_lru_picks_oldest_access() {
        let entries = vec![entry("a", 1, 9, 5, None), entry("b", 2, 3, 5, None), entry("c", 3, 7, 5, None)];
        assert_eq!(select_victim(EvictionPolicy::Lru, &entries).unwrap().key, "b");
    }

    #[test]
    fn test_lfu_picks_smallest_count_then_least_recent() {
        let entries = vec![
            entry("a", 1, 9, 1, None),
            entry("b", 2, 4, 1, None),
            entry("c", 3, 2, 8, None),
        ];
        assert_eq!(select_victim(EvictionPolicy::Lfu, &entries).unwrap().key, "b");
    }

    #[test]
    fn test_fifo_ignores_access() {
        let entries = vec![entry("a", 5, 5, 0, None), entry("b", 2, 40, 99, None)];
        assert_eq!(select_victim(EvictionPolicy::Fifo, &entries).unwrap().key, "b");
    }

    #[test]
    fn test_ttl_picks_soonest_expiry() {
        let entries = vec![
            entry("never", 1, 1, 0, None),
            entry("late", 2, 2, 0, Some(600)),
            entry("soon", 3, 3, 0, Some(5)),
        ];
        assert_eq!(select_victim(EvictionPolicy::Ttl, &entries).unwrap().key, "soon");
    }

    #[test]
    fn test_ttl_falls_back_to_fifo() {
        let entries = vec![entry("b", 7, 1, 0, None), entry("a", 3, 9, 0, None)];
        assert_eq!(select_victim(EvictionPolicy::Ttl, &entries).unwrap().key, "a");
    }

    #[test]
    fn test_parse_policy() {
        assert_eq!("LRU".parse::<EvictionPolicy>().unwrap(), EvictionPolicy::Lru);
        assert_eq!(" fifo ".parse::<EvictionPolicy>().unwrap(), EvictionPolicy::Fifo);
        assert!("random".parse::<EvictionPolicy>().is_err());
        assert_eq!(EvictionPolicy::Ttl.to_string(), "ttl");
    }
}
