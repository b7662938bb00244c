// Notify callbacks — ordered hooks around each delivery.
//
// `before` runs ahead of rendering and can veto the event. `after` sees the
// delivery outcome and cannot change anything.

use std::sync::Arc;

use tracing::debug;

use super::dispatch::{DeliveryError, DeliveryReceipt};
use super::event::NotificationEvent;

pub trait NotifyCallback: Send + Sync {
    /// Return false to drop the event.
    fn before(&self, _event: &NotificationEvent) -> bool {
        true
    }

    fn after(
        &self,
        _event: &NotificationEvent,
        _outcome: Result<&DeliveryReceipt, &DeliveryError>,
    ) {
    }
}

/// Lets everything through and logs outcomes at debug.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCallback;

impl NotifyCallback for DefaultCallback {
    fn after(&self, event: &NotificationEvent, outcome: Result<&DeliveryReceipt, &DeliveryError>) {
        match outcome {
            Ok(receipt) => debug!(
                group = event.group,
                target = %event.target,
                kind = %event.kind,
                message_id = %receipt.message_id,
                "Notification delivered"
            ),
            Err(e) => debug!(
                group = event.group,
                target = %event.target,
                kind = %event.kind,
                error = %e,
                "Notification not delivered"
            ),
        }
    }
}

/// Callbacks in registration order.
#[derive(Clone, Default)]
pub struct CallbackChain {
    callbacks: Vec<Arc<dyn NotifyCallback>>,
}

impl CallbackChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, callback: Arc<dyn NotifyCallback>) {
        self.callbacks.push(callback);
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    /// Run every `before` hook until one vetoes. A missing event is a
    /// no-op that proceeds.
    pub fn before(&self, event: Option<&NotificationEvent>) -> bool {
        let Some(event) = event else {
            return true;
        };
        self.callbacks.iter().all(|cb| cb.before(event))
    }

    pub fn after(
        &self,
        event: &NotificationEvent,
        outcome: Result<&DeliveryReceipt, &DeliveryError>,
    ) {
        for cb in &self.callbacks {
            cb.after(event, outcome);
        }
    }
}
