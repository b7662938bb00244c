// Concern state manager — subscriptions, snapshots and change detection.
//
// Per site, one manager owns:
//   concern_state:{group}:{target}   which kinds the group follows (the
//                                    enumerable subscription record)
//   concern_config:{group}:{target}  per-group notification settings
//   current:{target}                 last snapshot, refreshed with a TTL
//   fresh:{target}                   "polled recently" marker
//
// Diffing is pure: it takes the stored snapshot and a fresh observation and
// returns the changes plus the snapshot to persist. Commit is a separate
// step the poller takes only after the events are queued.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::snapshot::{ContentItem, ItemPayload, Observation, Snapshot, Target};
use super::store::{SetOpts, StateStore, StoreError};
use super::GroupId;
use crate::card::CacheCard;
use crate::keys::{KeyId, KeyKind};
use crate::notify::{LiveNotice, NotificationEvent, NotifyContent, NotifyKind, PostNotice};

const CURRENT: KeyKind = KeyKind::Extra("current");

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConcernKind {
    Live,
    News,
}

impl ConcernKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConcernKind::Live => "live",
            ConcernKind::News => "news",
        }
    }

    fn of(kind: NotifyKind) -> Self {
        match kind {
            NotifyKind::NewContent => ConcernKind::News,
            _ => ConcernKind::Live,
        }
    }
}

/// The persisted subscription record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConcernState {
    pub kinds: BTreeSet<ConcernKind>,
    pub added_at: DateTime<Utc>,
}

/// Per-group notification settings. Absent means default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupConcernConfig {
    /// Overrides the site's offline-notification policy.
    pub notify_offline: Option<bool>,
    pub notify_title_change: bool,
    /// Only content containing one of these is forwarded; empty passes all.
    pub keyword_filter: Vec<String>,
    pub at_all: bool,
}

impl GroupConcernConfig {
    fn matches_keywords(&self, content: &NotifyContent) -> bool {
        if self.keyword_filter.is_empty() {
            return true;
        }
        let text = content.text().to_lowercase();
        self.keyword_filter
            .iter()
            .any(|k| text.contains(&k.to_lowercase()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub group: GroupId,
    pub target: Target,
    pub state: ConcernState,
    pub config: GroupConcernConfig,
}

/// Site-level diff settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffPolicy {
    /// Emit an event when a live stream ends. Groups may override.
    pub notify_offline: bool,
    /// How long a stored snapshot lives without being refreshed.
    pub snapshot_ttl: Duration,
}

impl Default for DiffPolicy {
    fn default() -> Self {
        Self {
            notify_offline: false,
            snapshot_ttl: Duration::from_secs(7 * 24 * 60 * 60),
        }
    }
}

/// One detected change on a target, before group fan-out.
#[derive(Debug, Clone)]
pub struct Change {
    pub kind: NotifyKind,
    pub content: Arc<NotifyContent>,
    pub title_changed: bool,
    pub compact_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DiffOutcome {
    /// Oldest first.
    pub changes: Vec<Change>,
    /// The snapshot to commit.
    pub snapshot: Snapshot,
    /// Whether the snapshot needs writing.
    pub changed: bool,
}

#[derive(Clone)]
pub struct ConcernStateManager {
    store: StateStore,
    policy: DiffPolicy,
}

impl ConcernStateManager {
    pub fn new(store: StateStore, policy: DiffPolicy) -> Self {
        Self { store, policy }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn site(&self) -> &str {
        self.store.site()
    }

    pub fn policy(&self) -> &DiffPolicy {
        &self.policy
    }

    pub fn target(&self, id: impl Into<KeyId>) -> Target {
        Target::new(self.site(), id)
    }

    // --- Subscriptions ---

    /// Subscribe `group` to `kinds` on `target`, merging with existing kinds.
    pub async fn subscribe(
        &self,
        group: GroupId,
        target: &Target,
        kinds: &[ConcernKind],
    ) -> Result<ConcernState, StoreError> {
        let ids = pair(group, target);
        let mut state = match self.store.get_json::<ConcernState>(KeyKind::State, &ids).await {
            Ok(state) => state,
            Err(StoreError::NotFound { .. }) => ConcernState {
                kinds: BTreeSet::new(),
                added_at: Utc::now(),
            },
            Err(StoreError::Decode { key, source }) => {
                warn!(key, error = %source, "Replacing undecodable subscription");
                ConcernState {
                    kinds: BTreeSet::new(),
                    added_at: Utc::now(),
                }
            }
            Err(e) => return Err(e),
        };
        state.kinds.extend(kinds.iter().copied());
        self.store
            .set_json(KeyKind::State, &ids, &state, SetOpts::default())
            .await?;
        debug!(site = self.site(), group, target = %target.id, "Subscribed");
        Ok(state)
    }

    /// Remove the subscription and its configuration. Returns whether it existed.
    pub async fn unsubscribe(&self, group: GroupId, target: &Target) -> Result<bool, StoreError> {
        let ids = pair(group, target);
        let existed = self.store.delete(KeyKind::State, &ids).await?;
        self.store.delete(KeyKind::Config, &ids).await?;
        Ok(existed)
    }

    pub async fn subscription(
        &self,
        group: GroupId,
        target: &Target,
    ) -> Result<Option<Subscription>, StoreError> {
        let ids = pair(group, target);
        let state = match self.store.get_json::<ConcernState>(KeyKind::State, &ids).await {
            Ok(state) => state,
            Err(StoreError::NotFound { .. }) => return Ok(None),
            Err(StoreError::Decode { key, source }) => {
                warn!(key, error = %source, "Skipping undecodable subscription");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        Ok(Some(Subscription {
            group,
            target: target.clone(),
            state,
            config: self.group_config(group, target).await?,
        }))
    }

    /// Every subscription on this site, in key order.
    pub async fn list_subscriptions(&self) -> Result<Vec<Subscription>, StoreError> {
        let mut subs = Vec::new();
        for (group, id) in self.store.scan_state_keys().await? {
            let target = self.target(id);
            if let Some(sub) = self.subscription(group, &target).await? {
                subs.push(sub);
            }
        }
        Ok(subs)
    }

    pub async fn subscriptions_for(&self, target: &Target) -> Result<Vec<Subscription>, StoreError> {
        Ok(self
            .list_subscriptions()
            .await?
            .into_iter()
            .filter(|s| &s.target == target)
            .collect())
    }

    /// Groups following `target` for `kind`.
    pub async fn groups_for(
        &self,
        target: &Target,
        kind: ConcernKind,
    ) -> Result<Vec<GroupId>, StoreError> {
        Ok(self
            .subscriptions_for(target)
            .await?
            .into_iter()
            .filter(|s| s.state.kinds.contains(&kind))
            .map(|s| s.group)
            .collect())
    }

    /// Distinct subscribed targets.
    pub async fn targets(&self) -> Result<Vec<Target>, StoreError> {
        let ids: BTreeSet<KeyId> = self
            .store
            .scan_state_keys()
            .await?
            .into_iter()
            .map(|(_, id)| id)
            .collect();
        Ok(ids.into_iter().map(|id| self.target(id)).collect())
    }

    pub async fn group_config(
        &self,
        group: GroupId,
        target: &Target,
    ) -> Result<GroupConcernConfig, StoreError> {
        match self
            .store
            .get_json::<GroupConcernConfig>(KeyKind::Config, &pair(group, target))
            .await
        {
            Ok(config) => Ok(config),
            Err(StoreError::NotFound { .. }) => Ok(GroupConcernConfig::default()),
            Err(StoreError::Decode { key, source }) => {
                warn!(key, error = %source, "Using default for undecodable group config");
                Ok(GroupConcernConfig::default())
            }
            Err(e) => Err(e),
        }
    }

    pub async fn set_group_config(
        &self,
        group: GroupId,
        target: &Target,
        config: &GroupConcernConfig,
    ) -> Result<(), StoreError> {
        self.store
            .set_json(KeyKind::Config, &pair(group, target), config, SetOpts::default())
            .await
    }

    // --- Snapshots ---

    /// The stored snapshot. Missing and undecodable both read as `None`.
    pub async fn get_snapshot(&self, target: &Target) -> Result<Option<Snapshot>, StoreError> {
        match self
            .store
            .get_json::<Snapshot>(CURRENT, std::slice::from_ref(&target.id))
            .await
        {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(StoreError::NotFound { .. }) => Ok(None),
            Err(StoreError::Decode { key, source }) => {
                warn!(key, error = %source, "Stored snapshot is corrupt, treating as first observation");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Persist `snapshot` as the target's current state.
    pub async fn commit(&self, target: &Target, snapshot: &Snapshot) -> Result<(), StoreError> {
        self.store
            .set_json(
                CURRENT,
                std::slice::from_ref(&target.id),
                snapshot,
                SetOpts::expire(self.policy.snapshot_ttl),
            )
            .await
    }

    /// Claim the right to poll `target` for `ttl`. False if someone already has.
    pub async fn check_fresh(&self, target: &Target, ttl: Duration) -> Result<bool, StoreError> {
        let now = Utc::now().timestamp_millis();
        match self
            .store
            .set_json(
                KeyKind::Fresh,
                std::slice::from_ref(&target.id),
                &now,
                SetOpts::expire(ttl).no_overwrite(),
            )
            .await
        {
            Ok(()) => Ok(true),
            Err(StoreError::Exists { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    // --- Change detection ---

    /// Compare a fresh observation against the stored snapshot.
    pub fn diff(
        &self,
        target: &Target,
        previous: Option<&Snapshot>,
        current: Observation,
    ) -> DiffOutcome {
        let now = Utc::now();
        let Observation {
            name,
            status,
            title,
            url,
            cover,
            mut items,
        } = current;
        items.sort_by(|a, b| (a.timestamp, &a.id).cmp(&(b.timestamp, &b.id)));

        let mut next = Snapshot {
            name,
            status,
            title,
            url,
            cover,
            last_content_id: None,
            last_timestamp: 0,
            updated_at: now,
            status_changed: false,
            title_changed: false,
        };

        let Some(prev) = previous else {
            // First sighting: remember where the feed is, announce nothing.
            if let Some(newest) = items.last() {
                next.last_content_id = Some(newest.id.clone());
                next.last_timestamp = newest.timestamp;
            }
            debug!(target = %target, "First observation, initializing snapshot");
            return DiffOutcome {
                changes: Vec::new(),
                snapshot: next,
                changed: true,
            };
        };

        let mut changes = Vec::new();

        next.status_changed = prev.status != next.status;
        let live_kind = match (prev.status.is_living(), next.status.is_living()) {
            (false, true) => Some(NotifyKind::WentLive),
            (true, false) => Some(NotifyKind::LiveEnded),
            (true, true) if prev.title != next.title => {
                next.title_changed = true;
                Some(NotifyKind::TitleChanged)
            }
            _ => None,
        };
        if let Some(kind) = live_kind {
            let notice = LiveNotice {
                kind,
                name: next.name.clone(),
                status: next.status,
                title: next.title.clone(),
                url: next.url.clone(),
                cover: next.cover.clone(),
                observed_at: now,
            };
            changes.push(Change {
                kind,
                content: NotifyContent::live(notice),
                title_changed: kind == NotifyKind::TitleChanged,
                compact_key: None,
            });
        }

        // A stored snapshot without a cursor saw an empty feed, so everything
        // after it is new. The cursor advances per item, which also drops
        // repeats of one id within a single observation.
        next.last_content_id = prev.last_content_id.clone();
        next.last_timestamp = prev.last_timestamp;
        for item in items {
            if next
                .cursor()
                .is_some_and(|cursor| (item.timestamp, &item.id) <= cursor)
            {
                continue;
            }
            next.last_content_id = Some(item.id.clone());
            next.last_timestamp = item.timestamp;
            changes.push(content_change(&next, item));
        }

        let stale = now
            .signed_duration_since(prev.updated_at)
            .to_std()
            .map_or(false, |age| age > self.policy.snapshot_ttl / 2);
        let changed = !changes.is_empty()
            || next.status_changed
            || prev.title != next.title
            || prev.name != next.name
            || prev.last_content_id != next.last_content_id
            || stale;

        DiffOutcome {
            changes,
            snapshot: next,
            changed,
        }
    }

    /// Fan changes out to the subscribed groups, applying group settings.
    ///
    /// Events come out change by change (oldest first), then group by group.
    pub fn events_for(
        &self,
        target: &Target,
        outcome: &DiffOutcome,
        subscriptions: &[Subscription],
    ) -> Vec<NotificationEvent> {
        let mut events = Vec::new();
        for change in &outcome.changes {
            let concern = ConcernKind::of(change.kind);
            for sub in subscriptions {
                if &sub.target != target || !sub.state.kinds.contains(&concern) {
                    continue;
                }
                let wanted = match change.kind {
                    NotifyKind::LiveEnded => sub
                        .config
                        .notify_offline
                        .unwrap_or(self.policy.notify_offline),
                    NotifyKind::TitleChanged => sub.config.notify_title_change,
                    NotifyKind::NewContent => sub.config.matches_keywords(&change.content),
                    NotifyKind::WentLive => true,
                };
                if !wanted {
                    continue;
                }
                events.push(NotificationEvent {
                    group: sub.group,
                    target: target.clone(),
                    kind: change.kind,
                    content: Arc::clone(&change.content),
                    title_changed: change.title_changed,
                    compact_key: change.compact_key.clone(),
                    at_all: sub.config.at_all,
                });
            }
        }
        events
    }
}

fn pair(group: GroupId, target: &Target) -> [KeyId; 2] {
    [KeyId::Int(group), target.id.clone()]
}

fn content_change(snapshot: &Snapshot, item: ContentItem) -> Change {
    let compact_key = item.compaction_key();
    let content = match item.payload {
        ItemPayload::Card(raw) => NotifyContent::card(CacheCard::new(raw)),
        ItemPayload::Post { title, text, url } => NotifyContent::post(PostNotice {
            id: item.id,
            author: snapshot.name.clone(),
            title,
            text,
            url,
            timestamp: item.timestamp,
        }),
    };
    Change {
        kind: NotifyKind::NewContent,
        content,
        title_changed: false,
        compact_key,
    }
}

