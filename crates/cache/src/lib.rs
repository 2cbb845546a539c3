//! Ephemeral content-addressed cache for tool outputs.
//!
//! Payloads live as files on a scratch filesystem; hot metadata (sizes,
//! access times, expiry) stays in memory. The cache is best-effort
//! throughout: any I/O problem degrades to a miss, and nothing in here may
//! fail the enclosing request.
//!
//! Eviction is LRU by last access, triggered when total bytes reach the
//! high-water mark (80% of the budget) and running until the low-water
//! mark (70%) is reached. Expired entries are dropped lazily on `get` and
//! during eviction scans. Writes go through a temp file plus rename so a
//! cancelled request can never leave a half-written payload behind.

#![deny(missing_docs)]

mod key;

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Mutex,
    time::{Duration, Instant},
};

pub use key::CacheKey;

const HIGH_WATER: f64 = 0.8;
const LOW_WATER: f64 = 0.7;

/// Aggregate counters for the `/cache-stats` endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups that returned a payload.
    pub hits: u64,
    /// Lookups that found nothing usable.
    pub misses: u64,
    /// Total payload bytes currently stored.
    pub bytes: u64,
    /// Number of live entries.
    pub count: usize,
}

#[derive(Debug)]
struct Meta {
    size: u64,
    created_at: Instant,
    last_accessed_at: Instant,
    ttl: Duration,
    hit_count: u64,
}

impl Meta {
    fn expired(&self, now: Instant) -> bool {
        now.duration_since(self.created_at) >= self.ttl
    }
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Meta>,
    bytes: u64,
    hits: u64,
    misses: u64,
}

/// File-backed content-addressed cache with a fixed byte budget.
pub struct ContentCache {
    root: PathBuf,
    budget: u64,
    inner: Mutex<Inner>,
}

impl ContentCache {
    /// Open the cache rooted at `root` with the given byte budget.
    ///
    /// The directory is created if missing, and any payload files left by
    /// a previous process are removed: the index is in-memory only, so
    /// orphan files would never be addressable again.
    pub fn new(root: impl Into<PathBuf>, budget: u64) -> std::io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;

        let mut removed = 0usize;
        for entry in std::fs::read_dir(&root)?.flatten() {
            if std::fs::remove_dir_all(entry.path())
                .or_else(|_| std::fs::remove_file(entry.path()))
                .is_ok()
            {
                removed += 1;
            }
        }

        if removed > 0 {
            log::debug!("Cleared {removed} stale cache entries from {}", root.display());
        }

        Ok(Self {
            root,
            budget,
            inner: Mutex::new(Inner::default()),
        })
    }

    /// Fetch a payload. Expired entries are dropped here; read failures
    /// degrade to a miss.
    pub async fn get(&self, key: &CacheKey) -> Option<Vec<u8>> {
        let path = self.payload_path(key);
        let now = Instant::now();

        {
            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

            let Some(meta) = inner.entries.get_mut(key.as_str()) else {
                inner.misses += 1;
                return None;
            };

            if meta.expired(now) {
                let size = meta.size;
                inner.entries.remove(key.as_str());
                inner.bytes = inner.bytes.saturating_sub(size);
                inner.misses += 1;

                remove_file_best_effort(&path);
                return None;
            }

            meta.last_accessed_at = now;
            meta.hit_count += 1;
        }

        match tokio::fs::read(&path).await {
            Ok(payload) => {
                let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
                inner.hits += 1;
                Some(payload)
            }
            Err(e) => {
                log::warn!("Cache payload read failed for {}: {e}", path.display());

                let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
                if let Some(meta) = inner.entries.remove(key.as_str()) {
                    inner.bytes = inner.bytes.saturating_sub(meta.size);
                }
                inner.misses += 1;
                None
            }
        }
    }

    /// Store a payload with the given TTL. Best-effort: failures are
    /// logged and swallowed. Payloads larger than the whole budget are
    /// refused outright.
    pub async fn put(&self, key: &CacheKey, payload: &[u8], ttl: Duration) {
        let size = payload.len() as u64;

        if size > self.budget {
            log::debug!("Refusing to cache {size} byte payload over a {} byte budget", self.budget);
            return;
        }

        let path = self.payload_path(key);
        let Some(parent) = path.parent() else { return };

        if let Err(e) = tokio::fs::create_dir_all(parent).await {
            log::warn!("Cache directory creation failed: {e}");
            return;
        }

        // Atomic publish: write to a temp file, then rename into place.
        let temp = parent.join(format!(".tmp-{}", uuid::Uuid::new_v4()));

        if let Err(e) = tokio::fs::write(&temp, payload).await {
            log::warn!("Cache write failed for {}: {e}", temp.display());
            remove_file_best_effort(&temp);
            return;
        }

        if let Err(e) = tokio::fs::rename(&temp, &path).await {
            log::warn!("Cache rename failed for {}: {e}", path.display());
            remove_file_best_effort(&temp);
            return;
        }

        let now = Instant::now();
        let evicted = {
            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

            if let Some(previous) = inner.entries.remove(key.as_str()) {
                inner.bytes = inner.bytes.saturating_sub(previous.size);
            }

            inner.entries.insert(
                key.as_str().to_string(),
                Meta {
                    size,
                    created_at: now,
                    last_accessed_at: now,
                    ttl,
                    hit_count: 0,
                },
            );
            inner.bytes += size;

            self.evict_if_needed(&mut inner, now)
        };

        for key in evicted {
            remove_file_best_effort(&self.payload_path_str(&key));
        }
    }

    /// Aggregate counters.
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            bytes: inner.bytes,
            count: inner.entries.len(),
        }
    }

    /// Keys selected for removal, metadata already updated. File removal
    /// happens outside the lock.
    fn evict_if_needed(&self, inner: &mut Inner, now: Instant) -> Vec<String> {
        let high_water = (self.budget as f64 * HIGH_WATER) as u64;

        if inner.bytes < high_water {
            return Vec::new();
        }

        let low_water = (self.budget as f64 * LOW_WATER) as u64;
        let mut removed = Vec::new();

        // Expired entries go first, regardless of recency.
        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, meta)| meta.expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in expired {
            if let Some(meta) = inner.entries.remove(&key) {
                inner.bytes = inner.bytes.saturating_sub(meta.size);
                removed.push(key);
            }
        }

        while inner.bytes > low_water {
            let Some(oldest) = inner
                .entries
                .iter()
                .min_by_key(|(_, meta)| meta.last_accessed_at)
                .map(|(key, _)| key.clone())
            else {
                break;
            };

            if let Some(meta) = inner.entries.remove(&oldest) {
                inner.bytes = inner.bytes.saturating_sub(meta.size);
                removed.push(oldest);
            }
        }

        if !removed.is_empty() {
            log::debug!(
                "Evicted {} cache entries, {} bytes remain",
                removed.len(),
                inner.bytes
            );
        }

        removed
    }

    fn payload_path(&self, key: &CacheKey) -> PathBuf {
        self.payload_path_str(key.as_str())
    }

    fn payload_path_str(&self, key: &str) -> PathBuf {
        // Shard by the first two hex characters to keep directories small.
        self.root.join(&key[..2]).join(key)
    }
}

fn remove_file_best_effort(path: &Path) {
    if let Err(e) = std::fs::remove_file(path)
        && e.kind() != std::io::ErrorKind::NotFound
    {
        log::warn!("Cache file removal failed for {}: {e}", path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache_with_budget(budget: u64) -> (tempfile::TempDir, ContentCache) {
        let dir = tempfile::tempdir().unwrap();
        let cache = ContentCache::new(dir.path().join("cache"), budget).unwrap();
        (dir, cache)
    }

    fn key(n: usize) -> CacheKey {
        CacheKey::derive("test_tool", &serde_json::json!({ "n": n }))
    }

    const TTL: Duration = Duration::from_secs(3600);

    #[tokio::test]
    async fn get_after_put_round_trips() {
        let (_dir, cache) = cache_with_budget(10_000);

        cache.put(&key(1), b"payload one", TTL).await;

        assert_eq!(cache.get(&key(1)).await.as_deref(), Some(b"payload one".as_ref()));
        assert_eq!(cache.get(&key(2)).await, None);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.count, 1);
        assert_eq!(stats.bytes, 11);
    }

    #[tokio::test]
    async fn expired_entries_are_dropped_on_get() {
        let (_dir, cache) = cache_with_budget(10_000);

        cache.put(&key(1), b"stale", Duration::ZERO).await;

        assert_eq!(cache.get(&key(1)).await, None);
        assert_eq!(cache.stats().count, 0);
        assert_eq!(cache.stats().bytes, 0);
    }

    #[tokio::test]
    async fn eviction_runs_at_high_water_down_to_low_water() {
        // Budget 1000: high water 800, low water 700.
        let (_dir, cache) = cache_with_budget(1000);

        for n in 0..8 {
            cache.put(&key(n), &[0u8; 100], TTL).await;
        }

        // The eighth put reached 800 bytes and must evict down to 700.
        let stats = cache.stats();
        assert_eq!(stats.bytes, 700);
        assert_eq!(stats.count, 7);

        // The least recently used entry (the first) is the one gone.
        assert_eq!(cache.get(&key(0)).await, None);
        assert!(cache.get(&key(7)).await.is_some());
    }

    #[tokio::test]
    async fn recently_read_entries_survive_eviction() {
        let (_dir, cache) = cache_with_budget(1000);

        for n in 0..7 {
            cache.put(&key(n), &[0u8; 100], TTL).await;
        }

        // Touch the oldest entry so the second-oldest becomes the victim.
        assert!(cache.get(&key(0)).await.is_some());

        cache.put(&key(7), &[0u8; 100], TTL).await;

        assert!(cache.get(&key(0)).await.is_some());
        assert_eq!(cache.get(&key(1)).await, None);
    }

    #[tokio::test]
    async fn replacing_a_key_does_not_double_count() {
        let (_dir, cache) = cache_with_budget(10_000);

        cache.put(&key(1), &[0u8; 100], TTL).await;
        cache.put(&key(1), &[0u8; 40], TTL).await;

        let stats = cache.stats();
        assert_eq!(stats.bytes, 40);
        assert_eq!(stats.count, 1);
    }

    #[tokio::test]
    async fn oversized_payloads_are_refused() {
        let (_dir, cache) = cache_with_budget(100);

        cache.put(&key(1), &[0u8; 101], TTL).await;

        assert_eq!(cache.stats().count, 0);
        assert_eq!(cache.get(&key(1)).await, None);
    }
}
