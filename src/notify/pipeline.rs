// Notify pipeline — many pollers in, one dispatcher out.
//
// Pollers hold cheap Notifier clones; the pipeline owns the only receiver,
// so delivery attempts are totally ordered within the process. The channel
// is bounded: a full buffer parks the sending poller until the dispatcher
// catches up.
//
// Per event: before-hooks (may veto) → compaction lookup → render (memoized
// per content) → dispatch → compaction record → after-hooks.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::callback::{CallbackChain, NotifyCallback};
use super::compact::{condensed, Compactor};
use super::dispatch::Dispatcher;
use super::event::NotificationEvent;
use super::render::{Message, Renderer};
use crate::db::KvStore;

/// The receiving side has shut down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("notify pipeline is closed")]
pub struct PipelineClosed;

/// Producer handle for the pipeline.
#[derive(Clone)]
pub struct Notifier {
    tx: mpsc::Sender<NotificationEvent>,
}

impl Notifier {
    /// Queue one event, waiting for buffer space if the pipeline is behind.
    pub async fn send(&self, event: NotificationEvent) -> Result<(), PipelineClosed> {
        self.tx.send(event).await.map_err(|_| PipelineClosed)
    }

    /// Queue events in order. Stops at the first failure.
    pub async fn send_all(
        &self,
        events: impl IntoIterator<Item = NotificationEvent>,
    ) -> Result<usize, PipelineClosed> {
        let mut sent = 0;
        for event in events {
            self.send(event).await?;
            sent += 1;
        }
        Ok(sent)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// What happened to the events that went through [`NotifyPipeline::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub delivered: u64,
    pub dropped: u64,
    pub compacted: u64,
    pub render_failed: u64,
    pub delivery_failed: u64,
}

pub struct NotifyPipeline {
    rx: mpsc::Receiver<NotificationEvent>,
    callbacks: CallbackChain,
    renderer: Arc<dyn Renderer>,
    dispatcher: Arc<dyn Dispatcher>,
    compactor: Compactor,
    stats: PipelineStats,
}

impl NotifyPipeline {
    /// Build a pipeline with room for `buffer` queued events.
    pub fn new(
        buffer: usize,
        renderer: Arc<dyn Renderer>,
        dispatcher: Arc<dyn Dispatcher>,
        kv: Arc<dyn KvStore>,
        compact_window: Duration,
    ) -> (Notifier, Self) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let pipeline = Self {
            rx,
            callbacks: CallbackChain::new(),
            renderer,
            dispatcher,
            compactor: Compactor::new(kv, compact_window),
            stats: PipelineStats::default(),
        };
        (Notifier { tx }, pipeline)
    }

    /// Register a hook. Hooks run in registration order.
    pub fn add_callback(&mut self, callback: Arc<dyn NotifyCallback>) {
        self.callbacks.push(callback);
    }

    /// Dispatch until every Notifier is dropped.
    pub async fn run(mut self) -> PipelineStats {
        info!(callbacks = self.callbacks.len(), "Notify pipeline started");
        while let Some(event) = self.rx.recv().await {
            self.handle(event).await;
        }
        info!(
            delivered = self.stats.delivered,
            dropped = self.stats.dropped,
            compacted = self.stats.compacted,
            render_failed = self.stats.render_failed,
            delivery_failed = self.stats.delivery_failed,
            "Notify pipeline stopped"
        );
        self.stats
    }

    async fn handle(&mut self, event: NotificationEvent) {
        if !self.callbacks.before(Some(&event)) {
            debug!(group = event.group, target = %event.target, kind = %event.kind, "Notification vetoed");
            self.stats.dropped += 1;
            return;
        }

        let site = event.target.site.as_str();
        let reply_to = match &event.compact_key {
            Some(key) => match self.compactor.previous(site, event.group, key).await {
                Ok(found) => found,
                Err(e) => {
                    warn!(group = event.group, compact_key = %key, error = %e, "Compaction lookup failed, sending in full");
                    None
                }
            },
            None => None,
        };

        let mut message = match &reply_to {
            Some(first) => {
                self.stats.compacted += 1;
                Message::reply(first.clone(), condensed(&event.content))
            }
            None => match event.content.rendered(self.renderer.as_ref()) {
                Ok(message) => message,
                Err(e) => {
                    warn!(group = event.group, target = %event.target, kind = %event.kind, error = %e, "Failed to render notification");
                    self.stats.render_failed += 1;
                    return;
                }
            },
        };
        message.at_all = event.at_all && reply_to.is_none();

        let outcome = self.dispatcher.send(event.group, &message).await;
        match &outcome {
            Ok(receipt) => {
                self.stats.delivered += 1;
                if let (Some(key), None) = (&event.compact_key, &reply_to) {
                    if let Err(e) = self
                        .compactor
                        .record(site, event.group, key, &receipt.message_id)
                        .await
                    {
                        warn!(group = event.group, compact_key = %key, error = %e, "Failed to record delivered message");
                    }
                }
            }
            Err(e) => {
                self.stats.delivery_failed += 1;
                warn!(group = event.group, target = %event.target, kind = %event.kind, error = %e, "Failed to deliver notification");
            }
        }

        self.callbacks.after(&event, outcome.as_ref());
    }
}
