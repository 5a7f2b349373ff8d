//! Persisted gazetteer lookup cache (default ~/.georef/cache.json).
//!
//! Keys are normalized query signatures (`store|name`). Values are the
//! feature list a lookup returned, or a miss marker when it returned
//! nothing. Entries expire after a TTL and the least recently accessed
//! ones are evicted past `max_entries`.
//!
//! Concurrent `get_or_compute` calls for the same key coalesce: the first
//! caller computes, later callers wait for its result. Errors are shared
//! with the waiters but never stored.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, RwLock};
use tracing::{debug, warn};

use crate::error::ResolveError;
use crate::gazetteer::GazetteerFeature;

const DAY_MS: i64 = 24 * 3600 * 1000;

type Lookup = Result<Vec<GazetteerFeature>, ResolveError>;

/// A settled cache value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "features", rename_all = "snake_case")]
pub enum CachedValue {
    Hit(Vec<GazetteerFeature>),
    Miss,
}

impl CachedValue {
    fn from_features(features: &[GazetteerFeature]) -> Self {
        if features.is_empty() {
            Self::Miss
        } else {
            Self::Hit(features.to_vec())
        }
    }

    fn into_features(self) -> Vec<GazetteerFeature> {
        match self {
            Self::Hit(features) => features,
            Self::Miss => Vec::new(),
        }
    }

    fn validate(&self, key: &str) -> Result<(), ResolveError> {
        let inconsistent = |reason: String| ResolveError::CacheInconsistency {
            key: key.to_string(),
            reason,
        };
        match self {
            Self::Miss => Ok(()),
            Self::Hit(features) if features.is_empty() => Err(inconsistent("empty hit".into())),
            Self::Hit(features) => {
                for f in features {
                    if f.id.is_empty() {
                        return Err(inconsistent("feature without id".into()));
                    }
                    f.geometry
                        .validate()
                        .map_err(|e| inconsistent(format!("feature {}: {}", f.id, e)))?;
                }
                Ok(())
            }
        }
    }
}

struct CacheEntry {
    value: CachedValue,
    stored_at: i64,
    last_access: AtomicI64,
}

/// On-disk form of an entry.
#[derive(Serialize, Deserialize)]
struct StoredEntry {
    value: CachedValue,
    stored_at: i64,
    last_access: i64,
}

/// A computation other callers can wait on.
struct InFlight {
    result: Mutex<Option<Lookup>>,
    done: Condvar,
}

pub struct ResultCache {
    path: Option<PathBuf>,
    ttl_ms: i64,
    max_entries: usize,
    settled: RwLock<HashMap<String, CacheEntry>>,
    in_flight: Mutex<HashMap<String, Arc<InFlight>>>,
    computations: AtomicUsize,
    dirty: AtomicBool,
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl ResultCache {
    /// Cache that never touches disk.
    pub fn in_memory(max_entries: usize, ttl_days: u32) -> Self {
        Self {
            path: None,
            ttl_ms: ttl_days as i64 * DAY_MS,
            max_entries: max_entries.max(1),
            settled: RwLock::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
            computations: AtomicUsize::new(0),
            dirty: AtomicBool::new(false),
        }
    }

    /// Open the cache file at `path`. A missing file starts empty; an
    /// unreadable one is logged and ignored.
    pub fn open(path: PathBuf, max_entries: usize, ttl_days: u32) -> Self {
        let mut cache = Self::in_memory(max_entries, ttl_days);
        let now = now_ms();
        if let Some(stored) = Self::read_file(&path) {
            let entries = cache.settled.get_mut().unwrap_or_else(|e| e.into_inner());
            for (key, e) in stored {
                if now - e.stored_at > cache.ttl_ms {
                    continue;
                }
                entries.insert(
                    key,
                    CacheEntry {
                        value: e.value,
                        stored_at: e.stored_at,
                        last_access: AtomicI64::new(e.last_access),
                    },
                );
            }
        }
        cache.path = Some(path);
        cache.evict();
        cache
    }

    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".georef")
            .join("cache.json")
    }

    fn read_file(path: &Path) -> Option<HashMap<String, StoredEntry>> {
        let data = fs::read_to_string(path).ok()?;
        match serde_json::from_str(&data) {
            Ok(entries) => Some(entries),
            Err(e) => {
                warn!("ignoring unreadable cache {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Settled value for `key`, or `None` when missing, expired or invalid.
    fn read_settled(&self, key: &str) -> Option<Vec<GazetteerFeature>> {
        let verdict = {
            let entries = self.settled.read().unwrap_or_else(|e| e.into_inner());
            let entry = entries.get(key)?;
            let now = now_ms();
            if now - entry.stored_at > self.ttl_ms {
                Err(None)
            } else if let Err(e) = entry.value.validate(key) {
                Err(Some(e))
            } else {
                entry.last_access.store(now, Ordering::Relaxed);
                Ok(entry.value.clone())
            }
        };
        match verdict {
            Ok(value) => Some(value.into_features()),
            Err(reason) => {
                if let Some(e) = reason {
                    warn!("{}; recomputing", e);
                }
                self.settled
                    .write()
                    .unwrap_or_else(|e| e.into_inner())
                    .remove(key);
                None
            }
        }
    }

    fn store(&self, key: &str, features: &[GazetteerFeature]) {
        let now = now_ms();
        let mut entries = self.settled.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(
            key.to_string(),
            CacheEntry {
                value: CachedValue::from_features(features),
                stored_at: now,
                last_access: AtomicI64::new(now),
            },
        );
        self.dirty.store(true, Ordering::Relaxed);
        if entries.len() > self.max_entries {
            Self::evict_lru(&mut entries, self.max_entries);
        }
    }

    fn evict(&mut self) {
        let max = self.max_entries;
        let entries = self.settled.get_mut().unwrap_or_else(|e| e.into_inner());
        Self::evict_lru(entries, max);
    }

    fn evict_lru(entries: &mut HashMap<String, CacheEntry>, max: usize) {
        if entries.len() <= max {
            return;
        }
        let mut by_age: Vec<(i64, String)> = entries
            .iter()
            .map(|(k, e)| (e.last_access.load(Ordering::Relaxed), k.clone()))
            .collect();
        by_age.sort();
        let excess = entries.len() - max;
        for (_, key) in by_age.into_iter().take(excess) {
            entries.remove(&key);
        }
        debug!("evicted {} cache entries", excess);
    }

    /// Cached lookup result for `key`, computing it at most once.
    pub fn get_or_compute(&self, key: &str, compute: impl FnOnce() -> Lookup) -> Lookup {
        if let Some(features) = self.read_settled(key) {
            return Ok(features);
        }

        let (slot, leader) = {
            let mut pending = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
            // settled between the first read and taking the lock
            if let Some(features) = self.read_settled(key) {
                return Ok(features);
            }
            match pending.get(key) {
                Some(slot) => (slot.clone(), false),
                None => {
                    let slot = Arc::new(InFlight {
                        result: Mutex::new(None),
                        done: Condvar::new(),
                    });
                    pending.insert(key.to_string(), slot.clone());
                    (slot, true)
                }
            }
        };

        if !leader {
            let mut result = slot.result.lock().unwrap_or_else(|e| e.into_inner());
            while result.is_none() {
                result = slot.done.wait(result).unwrap_or_else(|e| e.into_inner());
            }
            return result.clone().unwrap_or_else(|| Ok(Vec::new()));
        }

        let mut publish = Publish {
            cache: self,
            key,
            slot: &slot,
            result: None,
        };
        self.computations.fetch_add(1, Ordering::SeqCst);
        let result = compute();
        if let Ok(features) = &result {
            self.store(key, features);
        }
        publish.result = Some(result.clone());
        result
    }

    /// Number of computations run through `get_or_compute`.
    pub fn computations(&self) -> usize {
        self.computations.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.settled.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write settled entries to disk if anything changed.
    pub fn flush(&self) -> io::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if !self.dirty.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        let stored: HashMap<String, StoredEntry> = {
            let entries = self.settled.read().unwrap_or_else(|e| e.into_inner());
            entries
                .iter()
                .map(|(k, e)| {
                    let entry = StoredEntry {
                        value: e.value.clone(),
                        stored_at: e.stored_at,
                        last_access: e.last_access.load(Ordering::Relaxed),
                    };
                    (k.clone(), entry)
                })
                .collect()
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string(&stored).map_err(io::Error::other)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)
    }
}

/// Publishes the leader's result and clears the in-flight slot, even if
/// the computation panicked.
struct Publish<'a> {
    cache: &'a ResultCache,
    key: &'a str,
    slot: &'a Arc<InFlight>,
    result: Option<Lookup>,
}

impl Drop for Publish<'_> {
    fn drop(&mut self) {
        let result = self.result.take().unwrap_or_else(|| {
            Err(ResolveError::unavailable("cache", format!("lookup for '{}' aborted", self.key)))
        });
        self.cache
            .in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(self.key);
        *self.slot.result.lock().unwrap_or_else(|e| e.into_inner()) = Some(result);
        self.slot.done.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;
    use tempfile::TempDir;

    fn springfield() -> Vec<GazetteerFeature> {
        vec![testing::point_feature("gn:1", "Springfield", "PPL", 39.8, -89.6, &[])]
    }

    #[test]
    fn test_second_lookup_is_served_from_cache() {
        let cache = ResultCache::in_memory(100, 30);
        let first = cache.get_or_compute("geonames|springfield", || Ok(springfield())).unwrap();
        let second = cache
            .get_or_compute("geonames|springfield", || panic!("should be cached"))
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(cache.computations(), 1);
    }

    #[test]
    fn test_miss_marker_is_cached() {
        let cache = ResultCache::in_memory(100, 30);
        assert!(cache.get_or_compute("geonames|atlantis", || Ok(vec![])).unwrap().is_empty());
        assert!(cache.get_or_compute("geonames|atlantis", || panic!("cached miss")).unwrap().is_empty());
        assert_eq!(cache.computations(), 1);
    }

    #[test]
    fn test_errors_are_not_cached() {
        let cache = ResultCache::in_memory(100, 30);
        let err = cache.get_or_compute("k", || Err(ResolveError::unavailable("geonames", "down")));
        assert!(err.is_err());
        assert!(cache.get_or_compute("k", || Ok(springfield())).is_ok());
        assert_eq!(cache.computations(), 2);
    }

    #[test]
    fn test_concurrent_identical_keys_compute_once() {
        let cache = ResultCache::in_memory(100, 30);
        let calls = AtomicUsize::new(0);
        let barrier = Barrier::new(16);
        thread::scope(|s| {
            for _ in 0..16 {
                s.spawn(|| {
                    barrier.wait();
                    let found = cache
                        .get_or_compute("geonames|springfield", || {
                            calls.fetch_add(1, Ordering::SeqCst);
                            thread::sleep(Duration::from_millis(50));
                            Ok(springfield())
                        })
                        .unwrap();
                    assert_eq!(found.len(), 1);
                });
            }
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.computations(), 1);
    }

    #[test]
    fn test_invalid_entry_is_recomputed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        let mut bad = springfield();
        bad[0].geometry = crate::geometry::Shape::point(95.0, 0.0);
        let stored = serde_json::json!({
            "geonames|springfield": {
                "value": {"status": "hit", "features": bad},
                "stored_at": now_ms(),
                "last_access": now_ms()
            }
        });
        fs::write(&path, stored.to_string()).unwrap();

        let cache = ResultCache::open(path, 100, 30);
        assert_eq!(cache.len(), 1);
        let found = cache.get_or_compute("geonames|springfield", || Ok(springfield())).unwrap();
        assert_eq!(found, springfield());
        assert_eq!(cache.computations(), 1);
    }

    #[test]
    fn test_lru_eviction() {
        let cache = ResultCache::in_memory(2, 30);
        cache.get_or_compute("a", || Ok(springfield())).unwrap();
        thread::sleep(Duration::from_millis(5));
        cache.get_or_compute("b", || Ok(springfield())).unwrap();
        thread::sleep(Duration::from_millis(5));
        // touch "a" so "b" is the oldest
        cache.get_or_compute("a", || panic!("cached")).unwrap();
        thread::sleep(Duration::from_millis(5));
        cache.get_or_compute("c", || Ok(springfield())).unwrap();

        assert_eq!(cache.len(), 2);
        cache.get_or_compute("a", || panic!("a was evicted")).unwrap();
        cache.get_or_compute("b", || Ok(vec![])).unwrap();
        assert_eq!(cache.computations(), 4);
    }

    #[test]
    fn test_expired_entries_dropped_on_open() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        let stored = serde_json::json!({
            "geonames|old": {"value": {"status": "miss"}, "stored_at": 0, "last_access": 0}
        });
        fs::write(&path, stored.to_string()).unwrap();
        assert!(ResultCache::open(path, 100, 30).is_empty());
    }

    #[test]
    fn test_flush_and_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("cache.json");
        {
            let cache = ResultCache::open(path.clone(), 100, 30);
            cache.get_or_compute("geonames|springfield", || Ok(springfield())).unwrap();
            cache.get_or_compute("geonames|atlantis", || Ok(vec![])).unwrap();
            cache.flush().unwrap();
        }
        let cache = ResultCache::open(path, 100, 30);
        assert_eq!(cache.len(), 2);
        let found = cache.get_or_compute("geonames|springfield", || panic!("persisted")).unwrap();
        assert_eq!(found, springfield());
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        fs::write(&path, "{not json").unwrap();
        assert!(ResultCache::open(path, 100, 30).is_empty());
    }
}
