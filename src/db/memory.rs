// MemoryKvStore — in-process KvStore used by tests and sqlite-less builds.
//
// A BTreeMap keeps keys ordered so prefix scans come back in key order, the
// same as the SQLite backend.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;

use super::traits::KvStore;

struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |t| t > now)
    }
}

#[derive(Default)]
pub struct MemoryKvStore {
    entries: Mutex<BTreeMap<String, Entry>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let now = Instant::now();
        Ok(self
            .lock()
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.value.clone()))
    }

    async fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
        no_overwrite: bool,
    ) -> Result<bool> {
        let now = Instant::now();
        let mut entries = self.lock();
        if no_overwrite && entries.get(key).is_some_and(|e| e.is_live(now)) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value,
                // A TTL past the clock's range never expires.
                expires_at: ttl.and_then(|d| now.checked_add(d)),
            },
        );
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let now = Instant::now();
        Ok(self.lock().remove(key).is_some_and(|e| e.is_live(now)))
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let now = Instant::now();
        Ok(self
            .lock()
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .filter(|(_, e)| e.is_live(now))
            .map(|(k, _)| k.clone())
            .collect())
    }

    async fn purge_expired(&self) -> Result<usize> {
        let now = Instant::now();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, e| e.is_live(now));
        Ok(before - entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_prefix_scan_is_ordered_and_bounded() {
        let store = MemoryKvStore::new();
        for key in ["a:state:2", "a:state:1", "a:config:1", "b:state:1"] {
            store.set(key, b"{}".to_vec(), None, false).await.unwrap();
        }
        let keys = store.keys_with_prefix("a:state:").await.unwrap();
        assert_eq!(keys, vec!["a:state:1".to_string(), "a:state:2".to_string()]);
    }

    #[tokio::test]
    async fn test_no_overwrite_and_expiry() {
        let store = MemoryKvStore::new();
        let ttl = Some(Duration::from_millis(20));
        assert!(store.set("k", b"1".to_vec(), ttl, true).await.unwrap());
        assert!(!store.set("k", b"2".to_vec(), ttl, true).await.unwrap());
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(store.get("k").await.unwrap().is_none());
        assert!(store.set("k", b"3".to_vec(), None, true).await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some(b"3".to_vec()));
    }

    #[tokio::test]
    async fn test_unbounded_ttl_never_expires() {
        let store = MemoryKvStore::new();
        assert!(store.set("k", b"1".to_vec(), Some(Duration::MAX), false).await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some(b"1".to_vec()));
        assert_eq!(store.purge_expired().await.unwrap(), 0);
    }
}
