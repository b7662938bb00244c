// Poller — drives one site adapter through fetch → diff → notify → commit.
//
// Fetches go through a BlockCache keyed by target, so concurrent polls of
// the same target share one request and a failed fetch is not retried until
// the cooldown runs out. The snapshot is committed only after every event
// from the diff has been queued; a crash in between means re-delivery on
// the next cycle, never a lost notification.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::cache::{BlockCache, CacheError};
use crate::notify::{Notifier, PipelineClosed};
use crate::state::{ConcernStateManager, Observation, StoreError, Target};

/// Fetches the current state of a target from one site.
#[async_trait]
pub trait SiteAdapter: Send + Sync {
    fn site(&self) -> &str;

    async fn fetch(&self, target: &Target) -> anyhow::Result<Observation>;
}

#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("fetch failed for {target}: {source}")]
    Fetch {
        target: String,
        #[source]
        source: CacheError,
    },

    #[error("fetch for {target} timed out after {timeout:?}")]
    Timeout { target: String, timeout: Duration },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    PipelineClosed(#[from] PipelineClosed),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub timeout: Duration,
    pub concurrency: usize,
    pub fetch_cooldown: Duration,
    pub cache_capacity: usize,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            timeout: Duration::from_secs(30),
            concurrency: 8,
            fetch_cooldown: Duration::from_secs(10),
            cache_capacity: 1024,
        }
    }
}

/// Result of one successful poll of one target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollReport {
    pub events: usize,
    pub committed: bool,
}

pub struct Poller {
    adapter: Arc<dyn SiteAdapter>,
    manager: ConcernStateManager,
    notifier: Notifier,
    fetches: BlockCache<Arc<Observation>>,
    settings: PollSettings,
}

impl Poller {
    pub fn new(
        adapter: Arc<dyn SiteAdapter>,
        manager: ConcernStateManager,
        notifier: Notifier,
        settings: PollSettings,
    ) -> Self {
        Self {
            fetches: BlockCache::new(settings.cache_capacity, settings.fetch_cooldown),
            adapter,
            manager,
            notifier,
            settings,
        }
    }

    pub fn manager(&self) -> &ConcernStateManager {
        &self.manager
    }

    /// One full cycle for one target.
    pub async fn poll_once(&self, target: &Target) -> Result<PollReport, PollError> {
        let observation = self.fetch(target).await?;

        let previous = self.manager.get_snapshot(target).await?;
        let outcome = self
            .manager
            .diff(target, previous.as_ref(), Observation::clone(&observation));

        let mut report = PollReport::default();
        if !outcome.changes.is_empty() {
            let subs = self.manager.subscriptions_for(target).await?;
            let events = self.manager.events_for(target, &outcome, &subs);
            report.events = self.notifier.send_all(events).await?;
            debug!(
                site = self.manager.site(),
                target = %target,
                changes = outcome.changes.len(),
                events = report.events,
                "Queued notifications"
            );
        }

        if outcome.changed {
            self.manager.commit(target, &outcome.snapshot).await?;
            report.committed = true;
        }
        Ok(report)
    }

    async fn fetch(&self, target: &Target) -> Result<Arc<Observation>, PollError> {
        let key = target.to_string();
        let adapter = Arc::clone(&self.adapter);
        let fetch = self.fetches.with_cache_do(&key, || async move {
            adapter.fetch(target).await.map(Arc::new)
        });

        match tokio::time::timeout(self.settings.timeout, fetch).await {
            Ok(Ok(observation)) => Ok(observation),
            Ok(Err(source)) => Err(PollError::Fetch { target: key, source }),
            Err(_) => Err(PollError::Timeout {
                target: key,
                timeout: self.settings.timeout,
            }),
        }
    }

    /// Poll every subscribed target once, with bounded concurrency.
    ///
    /// Per-target failures are logged and skipped. Only a closed pipeline
    /// aborts the cycle.
    pub async fn poll_all(&self) -> Result<usize, PipelineClosed> {
        let targets = match self.manager.targets().await {
            Ok(targets) => targets,
            Err(e) => {
                warn!(site = self.manager.site(), error = %e, "Failed to list targets, skipping cycle");
                return Ok(0);
            }
        };

        let results: Vec<(Target, Result<PollReport, PollError>)> = stream::iter(
            targets.into_iter().map(|target| async move {
                let result = self.poll_once(&target).await;
                (target, result)
            }),
        )
        .buffer_unordered(self.settings.concurrency.max(1))
        .collect()
        .await;

        let mut events = 0;
        for (target, result) in results {
            match result {
                Ok(report) => events += report.events,
                Err(PollError::PipelineClosed(e)) => return Err(e),
                Err(e) => {
                    warn!(site = self.manager.site(), target = %target, error = %e, "Poll failed, retrying next cycle");
                }
            }
        }

        self.fetches.purge_expired();
        Ok(events)
    }

    /// Poll on the configured interval until `shutdown` resolves or the
    /// pipeline goes away.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) {
        let mut ticker = tokio::time::interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!(
            site = self.manager.site(),
            interval_secs = self.settings.interval.as_secs(),
            concurrency = self.settings.concurrency,
            "Poller started"
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!(site = self.manager.site(), "Poller stopping");
                    return;
                }
                _ = ticker.tick() => {
                    match self.poll_all().await {
                        Ok(events) => debug!(site = self.manager.site(), events, "Poll cycle finished"),
                        Err(e) => {
                            warn!(site = self.manager.site(), error = %e, "Notify pipeline gone, poller stopping");
                            return;
                        }
                    }
                }
            }
        }
    }
}
