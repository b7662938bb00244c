// Composition tests — the full poll → diff → notify → commit path.
//
// A scripted site adapter feeds observations; a recording dispatcher
// stands in for the chat transport; all state lives in MemoryKvStore.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use watchpost::card::RawCard;
use watchpost::db::{KvStore, MemoryKvStore};
use watchpost::keys::{KeyCodec, TargetIdKind};
use watchpost::notify::{
    DeliveryError, DeliveryReceipt, Dispatcher, Message, NotifyPipeline, TextRenderer,
};
use watchpost::poller::{PollError, PollSettings, Poller, SiteAdapter};
use watchpost::state::{
    ConcernKind, ConcernStateManager, ContentItem, DiffPolicy, GroupId, LiveStatus, Observation,
    StateStore, Target,
};

/// Hands out queued observations in order; repeats the last one when empty.
struct ScriptedAdapter {
    script: Mutex<VecDeque<anyhow::Result<Observation>>>,
    last: Mutex<Option<Observation>>,
    fetches: AtomicUsize,
    delay: Duration,
}

impl ScriptedAdapter {
    fn new(script: Vec<anyhow::Result<Observation>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(None),
            fetches: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }
}

#[async_trait]
impl SiteAdapter for ScriptedAdapter {
    fn site(&self) -> &str {
        "bilibili"
    }

    async fn fetch(&self, _target: &Target) -> anyhow::Result<Observation> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Ok(obs)) => {
                *self.last.lock().unwrap() = Some(obs.clone());
                Ok(obs)
            }
            Some(Err(e)) => Err(e),
            None => self
                .last
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| anyhow::anyhow!("script exhausted")),
        }
    }
}

#[derive(Default)]
struct RecordingDispatcher {
    sent: Mutex<Vec<(GroupId, Message)>>,
}

#[async_trait]
impl Dispatcher for RecordingDispatcher {
    async fn send(&self, group: GroupId, message: &Message) -> Result<DeliveryReceipt, DeliveryError> {
        let mut sent = self.sent.lock().unwrap();
        sent.push((group, message.clone()));
        Ok(DeliveryReceipt {
            message_id: format!("m{}", sent.len()),
        })
    }
}

fn settings() -> PollSettings {
    PollSettings {
        interval: Duration::from_millis(20),
        timeout: Duration::from_millis(200),
        concurrency: 4,
        // Zero cooldown: every poll is a fresh fetch
        fetch_cooldown: Duration::ZERO,
        cache_capacity: 64,
    }
}

fn live(status: LiveStatus, title: &str) -> Observation {
    Observation {
        name: "streamer".into(),
        status,
        title: title.into(),
        ..Default::default()
    }
}

fn card(id: &str, timestamp: i64, author: &str) -> ContentItem {
    let raw: RawCard = serde_json::from_value(json!({
        "desc": {
            "type": 1,
            "dynamic_id_str": id,
            "orig_dy_id_str": "123",
            "timestamp": timestamp,
            "user_profile": { "info": { "uname": author } }
        },
        "card": json!({
            "item": { "content": format!("{author} says hi"), "orig_type": 4 },
            "origin": json!({ "item": { "content": "original post" } }).to_string()
        }).to_string()
    }))
    .unwrap();
    ContentItem::card(raw)
}

struct Harness {
    kv: Arc<MemoryKvStore>,
    manager: ConcernStateManager,
    dispatcher: Arc<RecordingDispatcher>,
}

impl Harness {
    fn new() -> Self {
        let kv = Arc::new(MemoryKvStore::new());
        let store = StateStore::new(kv.clone(), KeyCodec::new("bilibili", TargetIdKind::Int));
        Self {
            kv,
            manager: ConcernStateManager::new(store, DiffPolicy::default()),
            dispatcher: Arc::new(RecordingDispatcher::default()),
        }
    }

    fn pipeline(&self) -> (watchpost::notify::Notifier, NotifyPipeline) {
        NotifyPipeline::new(
            8,
            Arc::new(TextRenderer),
            self.dispatcher.clone(),
            self.kv.clone(),
            Duration::from_secs(3600),
        )
    }

    fn sent(&self) -> Vec<(GroupId, Message)> {
        self.dispatcher.sent.lock().unwrap().clone()
    }
}

// ============================================================
// Live notifications end to end
// ============================================================

#[tokio::test]
async fn live_cycle_notifies_subscribed_groups_once() {
    let h = Harness::new();
    let target = h.manager.target(1_i64);
    h.manager.subscribe(10, &target, &[ConcernKind::Live]).await.unwrap();
    h.manager.subscribe(20, &target, &[ConcernKind::News]).await.unwrap();

    let adapter = Arc::new(ScriptedAdapter::new(vec![
        Ok(live(LiveStatus::Offline, "")),
        Ok(live(LiveStatus::Living, "T")),
        Ok(live(LiveStatus::Living, "T")),
    ]));
    let (notifier, pipeline) = h.pipeline();
    let run = tokio::spawn(pipeline.run());
    let poller = Poller::new(adapter, h.manager.clone(), notifier, settings());

    assert_eq!(poller.poll_once(&target).await.unwrap().events, 0);
    let report = poller.poll_once(&target).await.unwrap();
    assert_eq!(report.events, 1);
    assert!(report.committed);
    assert_eq!(poller.poll_once(&target).await.unwrap().events, 0);

    drop(poller);
    let stats = run.await.unwrap();
    assert_eq!(stats.delivered, 1);

    let sent = h.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, 10);
    assert!(sent[0].1.plain_text().contains("streamer is live now"));

    let stored = h.manager.get_snapshot(&target).await.unwrap().unwrap();
    assert_eq!(stored.status, LiveStatus::Living);
}

// ============================================================
// Feed notifications with compaction
// ============================================================

#[tokio::test]
async fn co_posted_cards_collapse_into_reply() {
    let h = Harness::new();
    let alice = h.manager.target(1_i64);
    let bob = h.manager.target(2_i64);
    h.manager.subscribe(10, &alice, &[ConcernKind::News]).await.unwrap();
    h.manager.subscribe(10, &bob, &[ConcernKind::News]).await.unwrap();

    let (notifier, pipeline) = h.pipeline();
    let run = tokio::spawn(pipeline.run());

    let alice_poller = Poller::new(
        Arc::new(ScriptedAdapter::new(vec![Ok(Observation {
            name: "alice".into(),
            items: vec![card("501", 100, "alice")],
            ..Default::default()
        })])),
        h.manager.clone(),
        notifier.clone(),
        settings(),
    );
    let bob_poller = Poller::new(
        Arc::new(ScriptedAdapter::new(vec![Ok(Observation {
            name: "bob".into(),
            items: vec![card("502", 101, "bob")],
            ..Default::default()
        })])),
        h.manager.clone(),
        notifier,
        settings(),
    );

    // First sightings initialize without backfill
    assert_eq!(alice_poller.poll_once(&alice).await.unwrap().events, 0);
    assert_eq!(bob_poller.poll_once(&bob).await.unwrap().events, 0);
    // Seen items stay quiet on the next poll
    assert_eq!(alice_poller.poll_once(&alice).await.unwrap().events, 0);
    assert_eq!(bob_poller.poll_once(&bob).await.unwrap().events, 0);

    drop(alice_poller);
    drop(bob_poller);
    assert_eq!(run.await.unwrap().delivered, 0);

    // Next round: both repost the same original
    let (notifier, pipeline) = h.pipeline();
    let run = tokio::spawn(pipeline.run());
    let alice_poller = Poller::new(
        Arc::new(ScriptedAdapter::new(vec![Ok(Observation {
            name: "alice".into(),
            items: vec![card("503", 200, "alice"), card("501", 100, "alice")],
            ..Default::default()
        })])),
        h.manager.clone(),
        notifier.clone(),
        settings(),
    );
    let bob_poller = Poller::new(
        Arc::new(ScriptedAdapter::new(vec![Ok(Observation {
            name: "bob".into(),
            items: vec![card("504", 201, "bob")],
            ..Default::default()
        })])),
        h.manager.clone(),
        notifier,
        settings(),
    );
    assert_eq!(alice_poller.poll_once(&alice).await.unwrap().events, 1);
    assert_eq!(bob_poller.poll_once(&bob).await.unwrap().events, 1);
    drop(alice_poller);
    drop(bob_poller);

    let stats = run.await.unwrap();
    assert_eq!(stats.delivered, 2);
    assert_eq!(stats.compacted, 1);

    let sent = h.sent();
    assert_eq!(sent[0].1.reply_to, None);
    assert!(sent[0].1.plain_text().contains("original post"));
    assert_eq!(sent[1].1.reply_to.as_deref(), Some("m1"));
    assert!(sent[1].1.plain_text().starts_with("bob also shared this"));
}

// ============================================================
// Failure handling
// ============================================================

#[tokio::test]
async fn fetch_failure_leaves_state_untouched() {
    let h = Harness::new();
    let target = h.manager.target(1_i64);
    h.manager.subscribe(10, &target, &[ConcernKind::Live]).await.unwrap();

    let adapter = Arc::new(ScriptedAdapter::new(vec![
        Ok(live(LiveStatus::Offline, "")),
        Err(anyhow::anyhow!("HTTP 412")),
        Ok(live(LiveStatus::Living, "T")),
    ]));
    let (notifier, pipeline) = h.pipeline();
    let run = tokio::spawn(pipeline.run());
    let poller = Poller::new(adapter, h.manager.clone(), notifier, settings());

    poller.poll_once(&target).await.unwrap();
    let before = h.manager.get_snapshot(&target).await.unwrap();

    let err = poller.poll_once(&target).await.unwrap_err();
    assert!(matches!(err, PollError::Fetch { .. }));
    assert_eq!(h.manager.get_snapshot(&target).await.unwrap(), before);

    // The next cycle recovers and notifies
    assert_eq!(poller.poll_once(&target).await.unwrap().events, 1);
    drop(poller);
    assert_eq!(run.await.unwrap().delivered, 1);
}

#[tokio::test]
async fn slow_fetch_times_out_without_commit() {
    let h = Harness::new();
    let target = h.manager.target(1_i64);
    let mut adapter = ScriptedAdapter::new(vec![Ok(live(LiveStatus::Living, "T"))]);
    adapter.delay = Duration::from_millis(500);

    let (notifier, _pipeline) = h.pipeline();
    let poller = Poller::new(Arc::new(adapter), h.manager.clone(), notifier, settings());

    let err = poller.poll_once(&target).await.unwrap_err();
    assert!(matches!(err, PollError::Timeout { .. }));
    assert!(h.manager.get_snapshot(&target).await.unwrap().is_none());
}

#[tokio::test]
async fn cooldown_shares_fetch_between_polls() {
    let h = Harness::new();
    let target = h.manager.target(1_i64);
    let adapter = Arc::new(ScriptedAdapter::new(vec![Ok(live(LiveStatus::Offline, ""))]));
    let (notifier, _pipeline) = h.pipeline();
    let poller = Poller::new(
        adapter.clone(),
        h.manager.clone(),
        notifier,
        PollSettings {
            fetch_cooldown: Duration::from_secs(60),
            ..settings()
        },
    );

    let (a, b) = tokio::join!(poller.poll_once(&target), poller.poll_once(&target));
    a.unwrap();
    b.unwrap();
    poller.poll_once(&target).await.unwrap();
    assert_eq!(adapter.fetches.load(Ordering::SeqCst), 1);
}

// ============================================================
// Scheduled polling
// ============================================================

#[tokio::test]
async fn run_polls_every_subscribed_target_until_shutdown() {
    let h = Harness::new();
    for id in [1_i64, 2, 3] {
        let target = h.manager.target(id);
        h.manager.subscribe(10, &target, &[ConcernKind::Live]).await.unwrap();
    }

    let adapter = Arc::new(ScriptedAdapter::new(vec![Ok(live(LiveStatus::Offline, ""))]));
    let (notifier, pipeline) = h.pipeline();
    let run = tokio::spawn(pipeline.run());
    let poller = Poller::new(adapter.clone(), h.manager.clone(), notifier, settings());

    poller
        .run(tokio::time::sleep(Duration::from_millis(100)))
        .await;
    drop(poller);
    run.await.unwrap();

    assert!(adapter.fetches.load(Ordering::SeqCst) >= 3);
    for id in [1_i64, 2, 3] {
        let snapshot = h.manager.get_snapshot(&h.manager.target(id)).await.unwrap();
        assert!(snapshot.is_some(), "target {id} was never polled");
    }
    // State written by the poller is visible through the raw store too
    assert!(h.kv.get("bilibili:current:1").await.unwrap().is_some());
}
