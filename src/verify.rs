// Verify context — the session/credentials pollers fetch with.
//
// Owned and injected rather than global. `get` hands out the current
// credentials, refreshing them first if they are missing or expired; only
// one refresh runs at a time. After each refresh a timer task invalidates
// the credentials at their expiry. The timer holds a Weak, so it never
// keeps a dropped context alive, and a generation counter stops an old
// timer from wiping newer credentials.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    /// Cookie/token values, by name.
    pub values: HashMap<String, String>,
    /// None means the credentials never expire.
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credentials {
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(true, |t| t > now)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }
}

/// Where fresh credentials come from (login flow, config, remote signer).
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn fetch(&self) -> Result<Credentials>;
}

pub struct VerifyContext {
    source: Arc<dyn CredentialSource>,
    current: RwLock<Option<Arc<Credentials>>>,
    refreshing: tokio::sync::Mutex<()>,
    generation: AtomicU64,
    expiry: Mutex<Option<JoinHandle<()>>>,
}

impl VerifyContext {
    pub fn new(source: Arc<dyn CredentialSource>) -> Arc<Self> {
        Arc::new(Self {
            source,
            current: RwLock::new(None),
            refreshing: tokio::sync::Mutex::new(()),
            generation: AtomicU64::new(0),
            expiry: Mutex::new(None),
        })
    }

    /// Valid credentials, refreshing if needed.
    pub async fn get(self: &Arc<Self>) -> Result<Arc<Credentials>> {
        if let Some(creds) = self.current_valid().await {
            return Ok(creds);
        }

        let _guard = self.refreshing.lock().await;
        // Someone else may have refreshed while we waited.
        if let Some(creds) = self.current_valid().await {
            return Ok(creds);
        }
        self.refresh_locked().await
    }

    /// Fetch new credentials now, replacing the current ones.
    pub async fn refresh(self: &Arc<Self>) -> Result<Arc<Credentials>> {
        let _guard = self.refreshing.lock().await;
        self.refresh_locked().await
    }

    /// Forget the current credentials; the next `get` refreshes.
    pub async fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        *self.current.write().await = None;
        if let Some(task) = self.lock_expiry().take() {
            task.abort();
        }
        debug!("Credentials invalidated");
    }

    /// The stored credentials without refreshing, expired or not.
    pub async fn current(&self) -> Option<Arc<Credentials>> {
        self.current.read().await.clone()
    }

    async fn current_valid(&self) -> Option<Arc<Credentials>> {
        self.current
            .read()
            .await
            .clone()
            .filter(|c| c.is_valid_at(Utc::now()))
    }

    async fn refresh_locked(self: &Arc<Self>) -> Result<Arc<Credentials>> {
        let creds = Arc::new(
            self.source
                .fetch()
                .await
                .context("Failed to refresh credentials")?,
        );
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *self.current.write().await = Some(Arc::clone(&creds));
        info!(expires_at = ?creds.expires_at, "Credentials refreshed");

        let task = creds
            .expires_at
            .map(|at| spawn_expiry(Arc::downgrade(self), generation, at));
        if let Some(old) = std::mem::replace(&mut *self.lock_expiry(), task) {
            old.abort();
        }
        Ok(creds)
    }

    fn lock_expiry(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.expiry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for VerifyContext {
    fn drop(&mut self) {
        if let Some(task) = self.lock_expiry().take() {
            task.abort();
        }
    }
}

fn spawn_expiry(ctx: Weak<VerifyContext>, generation: u64, at: DateTime<Utc>) -> JoinHandle<()> {
    let delay = at
        .signed_duration_since(Utc::now())
        .to_std()
        .unwrap_or_default();
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let Some(ctx) = ctx.upgrade() else {
            return;
        };
        if ctx.generation.load(Ordering::SeqCst) != generation {
            return;
        }
        ctx.generation.fetch_add(1, Ordering::SeqCst);
        *ctx.current.write().await = None;
        info!("Credentials expired");
    })
}
