// KV store trait — backend-agnostic async interface for all persisted state.
//
// Implementors: SqliteKvStore (wraps rusqlite), MemoryKvStore (in-process).
// All methods are async so both sync (rusqlite via Mutex) and native async
// backends fit behind a single interface. The store is byte-oriented; typed
// JSON access lives one layer up in `state::StateStore`.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait KvStore: Send + Sync {
    /// Get the live value for `key`. Expired values read as absent.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Write `value` under `key`, optionally expiring after `ttl`.
    ///
    /// With `no_overwrite`, an existing live value is left untouched and
    /// the call returns `false`. Otherwise returns `true`.
    async fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
        no_overwrite: bool,
    ) -> Result<bool>;

    /// Delete `key`. Returns whether a live value existed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Every live key that starts with `prefix`, in key order.
    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>>;

    /// Reclaim storage held by expired keys. Returns how many were removed.
    async fn purge_expired(&self) -> Result<usize>;
}
