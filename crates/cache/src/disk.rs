//! Persistent disk tier
//!
//! Payload bytes live in files under a dedicated cache directory; the index
//! (sizes, timestamps, access counts) is the same in-memory [`CacheStore`]
//! the RAM tier uses. Each file starts with a small header carrying the
//! original key so the index can be rebuilt when the directory is reopened.
//!
//! File layout: `MFC1` magic, key length (u32 LE), key bytes, payload.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::entry::{CacheEntry, CacheStore, Lookup};
use crate::policy::EvictionPolicy;
use crate::{CacheError, TierStats};

const MAGIC: &[u8; 4] = b"MFC1";
const ENTRY_EXTENSION: &str = "entry";
const TEMP_EXTENSION: &str = "tmp";
const MAX_STEM_LEN: usize = 48;

struct DiskState {
    store: CacheStore<PathBuf>,
    dir: PathBuf,
    hits: u64,
    misses: u64,
}

impl DiskState {
    fn delete_files(&self, entries: &[CacheEntry<PathBuf>]) {
        for entry in entries {
            if let Err(e) = fs::remove_file(&entry.payload) {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!(path = %entry.payload.display(), error = %e, "failed to delete cache file");
                }
            }
        }
    }
}

/// Disk-backed cache tier
///
/// File I/O happens while holding the tier's own lock, which is never shared
/// with the scheduler.
pub struct DiskTier {
    state: Mutex<DiskState>,
}

impl DiskTier {
    /// Open (or create) a disk tier rooted at `dir`.
    ///
    /// Existing entry files are indexed; their modification times seed the
    /// recency order. Corrupt files and leftover temp files are removed.
    pub fn open<P: AsRef<Path>>(dir: P, limit_bytes: usize, policy: EvictionPolicy) -> Result<Self, CacheError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let mut state = DiskState {
            store: CacheStore::new(limit_bytes, policy),
            dir,
            hits: 0,
            misses: 0,
        };
        load_existing(&mut state)?;

        Ok(Self {
            state: Mutex::new(state),
        })
    }

    /// Write a payload to disk and index it.
    ///
    /// Returns the number of entries evicted to make room. I/O failures leave
    /// the index as it was before the call.
    pub fn put(&self, key: &str, payload: &[u8]) -> Result<usize, CacheError> {
        let mut state = self.state.lock();

        let limit = state.store.max_bytes();
        if payload.len() > limit {
            return Err(CacheError::Capacity {
                key: key.to_string(),
                size: payload.len(),
                limit,
            });
        }

        let path = state.dir.join(file_name_for(key));
        write_entry_file(&path, key, payload)?;

        let insertion = state
            .store
            .insert(key, path.clone(), payload.len(), None, Instant::now())?;

        // The replaced entry shares the path that was just rewritten.
        if let Some(old) = insertion.replaced {
            if old.payload != path {
                state.delete_files(std::slice::from_ref(&old));
            }
        }
        for victim in &insertion.evicted {
            debug!(tier = "disk", key = %victim.key, size = victim.size, "evicted entry");
        }
        state.delete_files(&insertion.evicted);

        Ok(insertion.evicted.len())
    }

    /// Read the payload stored under `key`.
    ///
    /// A file that can no longer be read is dropped from the index and the
    /// error returned; callers treat it as a miss.
    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut state = self.state.lock();

        let path = match state.store.lookup(key, Instant::now()) {
            Lookup::Hit(entry) => entry.payload.clone(),
            Lookup::Expired(entry) => {
                debug!(tier = "disk", key = %entry.key, "entry expired on lookup");
                state.delete_files(std::slice::from_ref(&entry));
                state.misses += 1;
                return Ok(None);
            }
            Lookup::Missing => {
                state.misses += 1;
                return Ok(None);
            }
        };

        match read_entry_file(&path, key) {
            Ok(payload) => {
                state.hits += 1;
                Ok(Some(payload))
            }
            Err(e) => {
                state.misses += 1;
                if let Some(stale) = state.store.remove(key) {
                    state.delete_files(std::slice::from_ref(&stale));
                }
                Err(CacheError::Io(e))
            }
        }
    }

    /// Check for a key without touching access bookkeeping
    pub fn contains(&self, key: &str) -> bool {
        self.state.lock().store.peek(key).is_some()
    }

    /// Remove an entry and its file; returns whether one was present
    pub fn remove(&self, key: &str) -> bool {
        let mut state = self.state.lock();
        match state.store.remove(key) {
            Some(entry) => {
                state.delete_files(std::slice::from_ref(&entry));
                true
            }
            None => false,
        }
    }

    /// Remove every entry and file; returns the number of bytes released
    pub fn clear(&self) -> usize {
        let mut state = self.state.lock();
        let released = state.store.current_bytes();
        let removed = state.store.clear();
        state.delete_files(&removed);
        info!(tier = "disk", entries = removed.len(), bytes = released, "cleared tier");
        released
    }

    /// Evict via the policy until usage is at most `target_bytes`.
    ///
    /// The configured limit is left unchanged. Returns entries evicted.
    pub fn shrink_to(&self, target_bytes: usize) -> usize {
        let mut state = self.state.lock();
        let evicted = state.store.evict_down_to(target_bytes);
        state.delete_files(&evicted);
        evicted.len()
    }

    /// Change the byte budget, evicting down to it; returns entries evicted
    pub fn set_limit(&self, limit_bytes: usize) -> usize {
        let mut state = self.state.lock();
        let evicted = state.store.set_max_bytes(limit_bytes);
        state.delete_files(&evicted);
        evicted.len()
    }

    /// Switch the eviction policy at runtime
    pub fn set_policy(&self, policy: EvictionPolicy) {
        self.state.lock().store.set_policy(policy);
    }

    /// Directory holding the entry files
    pub fn dir(&self) -> PathBuf {
        self.state.lock().dir.clone()
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

/// Derive a filesystem-safe, collision-resistant file name for a key
pub(crate) fn file_name_for(key: &str) -> String {
    let stem: String = key
        .chars()
        .take(MAX_STEM_LEN)
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("{}-{:016x}.{}", stem, fnv1a64(key.as_bytes()), ENTRY_EXTENSION)
}

/// FNV-1a; stable across builds, unlike `DefaultHasher`
fn fnv1a64(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}

fn header_len(key: &str) -> usize {
    MAGIC.len() + 4 + key.len()
}

fn write_entry_file(path: &Path, key: &str, payload: &[u8]) -> io::Result<()> {
    let temp = path.with_extension(TEMP_EXTENSION);
    let result = (|| {
        let mut file = File::create(&temp)?;
        file.write_all(MAGIC)?;
        file.write_all(&(key.len() as u32).to_le_bytes())?;
        file.write_all(key.as_bytes())?;
        file.write_all(payload)?;
        file.sync_all()?;
        fs::rename(&temp, path)
    })();

    if result.is_err() {
        fs::remove_file(&temp).ok();
    }
    result
}

fn read_header(file: &mut File) -> io::Result<String> {
    let mut magic = [0u8; 4];
    file.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "bad cache file magic"));
    }

    let mut len_bytes = [0u8; 4];
    file.read_exact(&mut len_bytes)?;
    let key_len = u64::from(u32::from_le_bytes(len_bytes));
    let remaining = file.metadata()?.len().saturating_sub((MAGIC.len() + 4) as u64);
    if key_len > remaining {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("cache file key length {} exceeds file size", key_len),
        ));
    }
    let mut key = vec![0u8; key_len as usize];
    file.read_exact(&mut key)?;

    String::from_utf8(key).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

fn read_entry_file(path: &Path, key: &str) -> io::Result<Vec<u8>> {
    let mut file = File::open(path)?;
    let stored_key = read_header(&mut file)?;
    if stored_key != key {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("cache file holds key `{}`", stored_key),
        ));
    }

    let mut payload = Vec::new();
    file.read_to_end(&mut payload)?;
    Ok(payload)
}

fn load_existing(state: &mut DiskState) -> io::Result<()> {
    let mut found: Vec<(SystemTime, String, PathBuf, usize)> = Vec::new();

    for dir_entry in fs::read_dir(&state.dir)? {
        let path = dir_entry?.path();
        let extension = path.extension().and_then(|s| s.to_str());

        if extension == Some(TEMP_EXTENSION) {
            fs::remove_file(&path).ok();
            continue;
        }
        if extension != Some(ENTRY_EXTENSION) {
            continue;
        }

        let indexed = File::open(&path).and_then(|mut file| {
            let key = read_header(&mut file)?;
            let metadata = file.metadata()?;
            let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            let size = (metadata.len() as usize).saturating_sub(header_len(&key));
            Ok((modified, key, size))
        });

        match indexed {
            Ok((modified, key, size)) => found.push((modified, key, path, size)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "removing unreadable cache file");
                fs::remove_file(&path).ok();
            }
        }
    }

    // Oldest first, so the most recently written files end up most recent in the index.
    found.sort_by_key(|(modified, ..)| *modified);

    let now = Instant::now();
    let mut oversized = Vec::new();
    for (_, key, path, size) in found {
        match state.store.insert(&key, path.clone(), size, None, now) {
            Ok(insertion) => state.delete_files(&insertion.evicted),
            Err(_) => oversized.push(path),
        }
    }
    for path in oversized {
        fs::remove_file(&path).ok();
    }

    if !state.store.is_empty() {
        info!(
            tier = "disk",
            entries = state.store.len(),
            bytes = state.store.current_bytes(),
            "restored disk cache index"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_tier(limit: usize, policy: EvictionPolicy) -> (DiskTier, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let tier = DiskTier::open(dir.path(), limit, policy).unwrap();
        (tier, dir)
    }

    fn entry_files(dir: &Path) -> usize {
        fs::read_dir(dir)
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some(ENTRY_EXTENSION))
            .count()
    }

    #[test]
    fn test_basic_put_get() {
        let (tier, _dir) = create_test_tier(1024, EvictionPolicy::Lru);
        let payload: Vec<u8> = (0..200u8).collect();

        tier.put("waveform/clip 1", &payload).unwrap();
        assert_eq!(tier.get("waveform/clip 1").unwrap(), Some(payload));

        let stats = tier.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.bytes_used, 200);
    }

    #[test]
    fn test_cache_miss() {
        let (tier, _dir) = create_test_tier(1024, EvictionPolicy::Lru);
        assert_eq!(tier.get("nothing").unwrap(), None);
        assert_eq!(tier.stats().misses, 1);
    }

    #[test]
    fn test_lru_eviction_deletes_files() {
        let (tier, dir) = create_test_tier(300, EvictionPolicy::Lru);
        tier.put("a", &[1; 100]).unwrap();
        tier.put("b", &[2; 100]).unwrap();
        tier.put("c", &[3; 100]).unwrap();
        tier.get("a").unwrap();

        assert_eq!(tier.put("d", &[4; 100]).unwrap(), 1);
        assert!(tier.contains("a"));
        assert!(!tier.contains("b"));
        assert_eq!(entry_files(dir.path()), 3);
    }

    #[test]
    fn test_replace_keeps_single_file() {
        let (tier, dir) = create_test_tier(1024, EvictionPolicy::Lru);
        tier.put("a", &[1; 10]).unwrap();
        tier.put("a", &[2; 20]).unwrap();

        assert_eq!(tier.get("a").unwrap(), Some(vec![2; 20]));
        assert_eq!(tier.stats().bytes_used, 20);
        assert_eq!(entry_files(dir.path()), 1);
    }

    #[test]
    fn test_oversized_rejected_writes_nothing() {
        let (tier, dir) = create_test_tier(16, EvictionPolicy::Lru);
        let err = tier.put("big", &[0; 17]).unwrap_err();
        assert!(matches!(err, CacheError::Capacity { size: 17, limit: 16, .. }));
        assert_eq!(entry_files(dir.path()), 0);
    }

    #[test]
    fn test_clear_removes_files() {
        let (tier, dir) = create_test_tier(1024, EvictionPolicy::Fifo);
        tier.put("a", &[0; 10]).unwrap();
        tier.put("b", &[0; 10]).unwrap();

        assert_eq!(tier.clear(), 20);
        assert_eq!(tier.stats().bytes_used, 0);
        assert_eq!(entry_files(dir.path()), 0);
    }

    #[test]
    fn test_missing_file_is_dropped_from_index() {
        let (tier, dir) = create_test_tier(1024, EvictionPolicy::Lru);
        tier.put("a", &[0; 10]).unwrap();
        fs::remove_file(dir.path().join(file_name_for("a"))).unwrap();

        assert!(matches!(tier.get("a"), Err(CacheError::Io(_))));
        assert!(!tier.contains("a"));
        assert_eq!(tier.stats().bytes_used, 0);
    }

    #[test]
    fn test_reopen_restores_index() {
        let dir = tempfile::tempdir().unwrap();
        {
            let tier = DiskTier::open(dir.path(), 1024, EvictionPolicy::Lru).unwrap();
            tier.put("proxy:clip-7", &[9; 64]).unwrap();
            tier.put("thumb:clip-7", &[8; 32]).unwrap();
        }
        fs::write(dir.path().join("garbage.entry"), b"not a cache file").unwrap();

        let tier = DiskTier::open(dir.path(), 1024, EvictionPolicy::Lru).unwrap();
        assert_eq!(tier.stats().entries, 2);
        assert_eq!(tier.stats().bytes_used, 96);
        assert_eq!(tier.get("proxy:clip-7").unwrap(), Some(vec![9; 64]));
        assert!(!dir.path().join("garbage.entry").exists());
    }

    #[test]
    fn test_corrupt_key_length_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corrupt.entry");
        let mut bytes = MAGIC.to_vec();
        bytes.extend_from_slice(&u32::MAX.to_le_bytes());
        bytes.extend_from_slice(b"short");
        fs::write(&path, &bytes).unwrap();

        let err = read_header(&mut File::open(&path).unwrap()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);

        let tier = DiskTier::open(dir.path(), 1024, EvictionPolicy::Lru).unwrap();
        assert_eq!(tier.stats().entries, 0);
        assert!(!path.exists());
    }

    #[test]
    fn test_reopen_with_smaller_limit_evicts() {
        let dir = tempfile::tempdir().unwrap();
        {
            let tier = DiskTier::open(dir.path(), 1024, EvictionPolicy::Lru).unwrap();
            for i in 0..4 {
                tier.put(&format!("k{}", i), &[0; 100]).unwrap();
            }
        }

        let tier = DiskTier::open(dir.path(), 250, EvictionPolicy::Lru).unwrap();
        assert!(tier.stats().bytes_used <= 250);
        assert_eq!(entry_files(dir.path()), tier.stats().entries);
    }

    #[test]
    fn test_shrink_to_keeps_limit() {
        let (tier, _dir) = create_test_tier(1000, EvictionPolicy::Fifo);
        for i in 0..5 {
            tier.put(&format!("k{}", i), &[0; 100]).unwrap();
        }
        assert_eq!(tier.shrink_to(200), 3);
        assert_eq!(tier.stats().bytes_used, 200);
        assert_eq!(tier.stats().bytes_limit, 1000);
        assert!(tier.contains("k4"));
    }

    #[test]
    fn test_file_names_are_sanitized_and_distinct() {
        let a = file_name_for("a/b");
        let b = file_name_for("a_b");
        assert_ne!(a, b);
        assert!(!a.contains('/'));
        assert!(a.ends_with(".entry"));

        let long = file_name_for(&"x".repeat(500));
        assert!(long.len() < 100);
    }
}
