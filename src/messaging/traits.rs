//! Stream collaborator seams used by the check loop.

use async_trait::async_trait;
use std::time::Duration;

use super::errors::MessagingResult;
use super::message::RawNotification;

/// Inbound stream of item notifications
#[async_trait]
pub trait NotificationSource: Send + Sync + 'static {
    /// Read up to `max_messages`, waiting at most `wait` for the first one
    ///
    /// An empty result means the read timed out with nothing available.
    async fn receive(
        &self,
        max_messages: usize,
        wait: Duration,
    ) -> MessagingResult<Vec<RawNotification>>;

    /// Stream name for logging
    fn source_name(&self) -> &str;
}

/// Outbound announcement of committed batches
#[async_trait]
pub trait UpdatePublisher: Send + Sync + 'static {
    async fn publish(&self, topic: &str, payload: &serde_json::Value) -> MessagingResult<()>;
}
