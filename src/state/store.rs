// Typed state store — JSON values over the byte KV store, keyed by KeyCodec.
//
// One StateStore per site. Reads distinguish "nothing stored" from "stored
// bytes are garbage" so callers can treat the first as a first observation
// and log the second before overwriting it.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::db::KvStore;
use crate::keys::{KeyCodec, KeyId, KeyKind};

/// Failure modes of typed state access.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("no value stored at {key}")]
    NotFound { key: String },

    #[error("value at {key} could not be decoded: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("value already present at {key}")]
    Exists { key: String },

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// Write options: expiry and no-overwrite.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetOpts {
    pub ttl: Option<Duration>,
    pub no_overwrite: bool,
}

impl SetOpts {
    /// Expire the key after `ttl`.
    pub fn expire(ttl: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            no_overwrite: false,
        }
    }

    /// Fail with [`StoreError::Exists`] instead of replacing a live value.
    pub fn no_overwrite(mut self) -> Self {
        self.no_overwrite = true;
        self
    }
}

#[derive(Clone)]
pub struct StateStore {
    kv: Arc<dyn KvStore>,
    codec: KeyCodec,
}

impl StateStore {
    pub fn new(kv: Arc<dyn KvStore>, codec: KeyCodec) -> Self {
        Self { kv, codec }
    }

    pub fn codec(&self) -> &KeyCodec {
        &self.codec
    }

    pub fn site(&self) -> &str {
        self.codec.site()
    }

    pub fn key(&self, kind: KeyKind, ids: &[KeyId]) -> String {
        self.codec.build(kind, ids)
    }

    /// Read and decode the value stored under `(kind, ids)`.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        kind: KeyKind,
        ids: &[KeyId],
    ) -> Result<T, StoreError> {
        let key = self.key(kind, ids);
        let bytes = self
            .kv
            .get(&key)
            .await?
            .ok_or_else(|| StoreError::NotFound { key: key.clone() })?;
        serde_json::from_slice(&bytes).map_err(|source| StoreError::Decode { key, source })
    }

    /// Encode and write `value` under `(kind, ids)`.
    pub async fn set_json<T: Serialize + ?Sized>(
        &self,
        kind: KeyKind,
        ids: &[KeyId],
        value: &T,
        opts: SetOpts,
    ) -> Result<(), StoreError> {
        let key = self.key(kind, ids);
        let bytes = serde_json::to_vec(value)
            .map_err(|e| anyhow::anyhow!("Failed to encode value for {key}: {e}"))?;
        let written = self
            .kv
            .set(&key, bytes, opts.ttl, opts.no_overwrite)
            .await?;
        if !written {
            return Err(StoreError::Exists { key });
        }
        Ok(())
    }

    /// Delete `(kind, ids)`. Returns whether a value existed.
    pub async fn delete(&self, kind: KeyKind, ids: &[KeyId]) -> Result<bool, StoreError> {
        let key = self.key(kind, ids);
        Ok(self.kv.delete(&key).await?)
    }

    /// Inverse of the state key construction.
    pub fn parse_state_key(&self, key: &str) -> anyhow::Result<(i64, KeyId)> {
        self.codec.parse_state_key(key)
    }

    /// Every persisted `(group, target)` pair for this site.
    ///
    /// Keys that fail to parse are logged and skipped.
    pub async fn scan_state_keys(&self) -> Result<Vec<(i64, KeyId)>, StoreError> {
        let keys = self
            .kv
            .keys_with_prefix(&self.codec.prefix(KeyKind::State))
            .await?;

        let mut pairs = Vec::with_capacity(keys.len());
        for key in keys {
            match self.parse_state_key(&key) {
                Ok(pair) => pairs.push(pair),
                Err(e) => warn!(site = self.site(), key, error = %e, "Skipping malformed state key"),
            }
        }
        Ok(pairs)
    }
}
