// Dispatcher — the chat transport, seen from this side.

use async_trait::async_trait;

use super::render::Message;
use crate::state::GroupId;

/// Proof of delivery; the id is what later replies point at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub message_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("group {0} is not reachable")]
    Unreachable(GroupId),

    #[error("send rejected: {0}")]
    Rejected(String),

    #[error("transport error: {0}")]
    Transport(String),
}

/// Sends a rendered message to a group. Retries are the implementor's
/// business; the pipeline reports a failure and moves on.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn send(&self, group: GroupId, message: &Message) -> Result<DeliveryReceipt, DeliveryError>;
}
