// Block cache — TTL cache with at-most-one in-flight computation per key.
//
// The first caller for a key runs the computation; everyone else who asks
// for the same key while it is running waits on the same slot and receives
// the same outcome. Failures are cached exactly like successes until the
// TTL runs out, so a known-bad operation is not retried by every waiter.
//
// Entries are kept in an IndexMap in least-recently-used order (front is
// oldest). Only completed entries can be evicted; an in-flight computation
// always keeps its slot.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

tokio::task_local! {
    /// (cache id, key) pairs whose computation is running further up the
    /// current task.
    static COMPUTING: Vec<(u64, String)>;
}

static NEXT_CACHE_ID: AtomicU64 = AtomicU64::new(0);

/// Errors returned by [`BlockCache::with_cache_do`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    /// The computation for `key` asked the cache for `key` again.
    #[error("re-entrant computation for cache key `{key}`")]
    Reentrant { key: String },

    /// The computation failed. Every caller in the same cache window gets
    /// a handle to the same underlying error.
    #[error("{0:#}")]
    Compute(Arc<anyhow::Error>),
}

impl CacheError {
    /// True when both errors are the same cached failure.
    pub fn same_failure(&self, other: &CacheError) -> bool {
        match (self, other) {
            (CacheError::Compute(a), CacheError::Compute(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

struct Slot<V> {
    created: Instant,
    cell: OnceCell<Result<V, CacheError>>,
}

impl<V> Slot<V> {
    fn new() -> Self {
        Self {
            created: Instant::now(),
            cell: OnceCell::new(),
        }
    }

    fn completed(&self) -> bool {
        self.cell.initialized()
    }

    // In-flight slots never expire; waiters would otherwise start a
    // second computation for the same key.
    fn is_expired(&self, ttl: Duration) -> bool {
        self.completed() && self.created.elapsed() > ttl
    }
}

/// Hit/miss counters for a cache instance.
#[derive(Debug, Default)]
struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

/// Point-in-time view of cache activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub resident: usize,
}

/// Generic singleflight cache keyed by opaque strings.
pub struct BlockCache<V> {
    id: u64,
    entries: Mutex<IndexMap<String, Arc<Slot<V>>>>,
    ttl: Duration,
    capacity: usize,
    counters: CacheCounters,
}

impl<V> BlockCache<V>
where
    V: Clone + Send + Sync,
{
    /// Create a cache holding at most `capacity` completed entries, each
    /// live for `ttl` after it was first requested.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            id: NEXT_CACHE_ID.fetch_add(1, Ordering::Relaxed),
            entries: Mutex::new(IndexMap::new()),
            ttl,
            capacity: capacity.max(1),
            counters: CacheCounters::default(),
        }
    }

    /// Return the cached outcome for `key`, running `compute` if there is none.
    ///
    /// Concurrent callers for the same key share a single run of `compute`.
    /// If `compute` itself asks this cache for `key` within the same task
    /// the inner call fails with [`CacheError::Reentrant`] instead of waiting forever.
    pub async fn with_cache_do<F, Fut>(&self, key: &str, compute: F) -> Result<V, CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<V>>,
    {
        let stack = COMPUTING.try_with(|s| s.clone()).unwrap_or_default();
        if stack.iter().any(|(id, k)| *id == self.id && k == key) {
            warn!(key, "Re-entrant block cache lookup rejected");
            return Err(CacheError::Reentrant {
                key: key.to_string(),
            });
        }

        let id = self.id;
        let slot = self.slot(key);
        let outcome = slot
            .cell
            .get_or_init(|| async move {
                let mut stack = stack;
                stack.push((id, key.to_string()));
                debug!(key, "Block cache computing");
                COMPUTING
                    .scope(stack, compute())
                    .await
                    .map_err(|e| CacheError::Compute(Arc::new(e)))
            })
            .await;

        outcome.clone()
    }

    /// Drop the entry for `key`, if any. In-flight waiters keep their slot.
    pub fn remove(&self, key: &str) -> bool {
        self.lock().shift_remove(key).is_some()
    }

    /// Drop every completed entry whose TTL has passed.
    pub fn purge_expired(&self) -> usize {
        let mut map = self.lock();
        let before = map.len();
        map.retain(|_, slot| !slot.is_expired(self.ttl));
        before - map.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            resident: self.len(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, IndexMap<String, Arc<Slot<V>>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Find the live slot for `key` or install a fresh one.
    fn slot(&self, key: &str) -> Arc<Slot<V>> {
        let mut map = self.lock();

        if let Some(idx) = map.get_index_of(key) {
            let live = map
                .get_index(idx)
                .filter(|(_, slot)| !slot.is_expired(self.ttl))
                .map(|(_, slot)| Arc::clone(slot));
            match live {
                Some(slot) => {
                    // Touch: move to the back for LRU ordering
                    let last = map.len() - 1;
                    map.move_index(idx, last);
                    self.counters.hits.fetch_add(1, Ordering::Relaxed);
                    return slot;
                }
                None => {
                    map.shift_remove_index(idx);
                }
            }
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        self.evict_to_fit(&mut map);

        let slot = Arc::new(Slot::new());
        map.insert(key.to_string(), Arc::clone(&slot));
        slot
    }

    fn evict_to_fit(&self, map: &mut IndexMap<String, Arc<Slot<V>>>) {
        map.retain(|_, slot| !slot.is_expired(self.ttl));

        while map.len() >= self.capacity {
            let Some(idx) = map.values().position(|slot| slot.completed()) else {
                // Everything resident is in flight; let the map grow past
                // capacity until something completes.
                debug!(resident = map.len(), "Block cache over capacity, nothing evictable");
                break;
            };
            map.shift_remove_index(idx);
            self.counters.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lru_touch_protects_recent_entry() {
        let cache: BlockCache<u32> = BlockCache::new(2, Duration::from_secs(60));
        cache.with_cache_do("a", || async { Ok(1) }).await.unwrap();
        cache.with_cache_do("b", || async { Ok(2) }).await.unwrap();
        // Touch "a" so "b" becomes the oldest
        cache.with_cache_do("a", || async { Ok(10) }).await.unwrap();
        cache.with_cache_do("c", || async { Ok(3) }).await.unwrap();

        let map = cache.lock();
        assert!(map.contains_key("a"));
        assert!(!map.contains_key("b"));
        assert!(map.contains_key("c"));
    }

    #[tokio::test]
    async fn test_remove_forces_recompute() {
        let cache: BlockCache<u32> = BlockCache::new(8, Duration::from_secs(60));
        cache.with_cache_do("k", || async { Ok(1) }).await.unwrap();
        assert!(cache.remove("k"));
        let v = cache.with_cache_do("k", || async { Ok(2) }).await.unwrap();
        assert_eq!(v, 2);
    }

    #[tokio::test]
    async fn test_stats_count_hits_and_misses() {
        let cache: BlockCache<u32> = BlockCache::new(8, Duration::from_secs(60));
        cache.with_cache_do("k", || async { Ok(1) }).await.unwrap();
        cache.with_cache_do("k", || async { Ok(1) }).await.unwrap();
        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.resident, 1);
    }
}
