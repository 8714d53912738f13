//! # In-Memory Stream Clients
//!
//! Channel-backed notification source and recording update publisher. They back
//! the `memory` stream backend and the test suite, and can inject read and
//! publish faults.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

use super::errors::{MessagingError, MessagingResult};
use super::message::RawNotification;
use super::traits::{NotificationSource, UpdatePublisher};

/// Notification source fed through [`InMemorySource::push_json`] and friends
///
/// Several workers may share one source; each message is delivered once.
#[derive(Debug)]
pub struct InMemorySource {
    name: String,
    sender: mpsc::UnboundedSender<RawNotification>,
    receiver: tokio::sync::Mutex<mpsc::UnboundedReceiver<RawNotification>>,
    next_id: AtomicI64,
    fail_next_receive: AtomicBool,
}

impl InMemorySource {
    pub fn new(name: impl Into<String>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            name: name.into(),
            sender,
            receiver: tokio::sync::Mutex::new(receiver),
            next_id: AtomicI64::new(1),
            fail_next_receive: AtomicBool::new(false),
        }
    }

    pub fn push_raw(&self, payload: impl Into<String>) {
        let message_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        // The receiver lives as long as `self`, so the channel cannot be closed here
        let _ = self
            .sender
            .send(RawNotification::new(Some(message_id), payload));
    }

    pub fn push_json(&self, payload: &serde_json::Value) {
        self.push_raw(payload.to_string());
    }

    /// Queue one single-item notification per key, with an `s3_url` info field
    pub fn push_keys<'a>(&self, keys: impl IntoIterator<Item = &'a str>) {
        for key in keys {
            self.push_json(&serde_json::json!({
                "sha1": key,
                "s3_url": format!("s3://images/{key}"),
            }));
        }
    }

    /// Make the next `receive` fail with a queue error
    pub fn fail_next_receive(&self) {
        self.fail_next_receive.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl NotificationSource for InMemorySource {
    async fn receive(
        &self,
        max_messages: usize,
        wait: Duration,
    ) -> MessagingResult<Vec<RawNotification>> {
        if self.fail_next_receive.swap(false, Ordering::SeqCst) {
            return Err(MessagingError::queue_operation(
                &self.name,
                "receive",
                "injected read fault",
            ));
        }

        let mut receiver = self.receiver.lock().await;
        let first = match tokio::time::timeout(wait, receiver.recv()).await {
            Ok(Some(message)) => message,
            Ok(None) => return Err(MessagingError::stream_closed(&self.name)),
            Err(_) => return Ok(Vec::new()),
        };

        let mut messages = vec![first];
        while messages.len() < max_messages {
            match receiver.try_recv() {
                Ok(message) => messages.push(message),
                Err(_) => break,
            }
        }
        Ok(messages)
    }

    fn source_name(&self) -> &str {
        &self.name
    }
}

/// Publisher that records every announcement
#[derive(Debug, Default)]
pub struct InMemoryPublisher {
    published: Mutex<Vec<(String, serde_json::Value)>>,
    failing: AtomicBool,
}

impl InMemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `(topic, payload)` published so far
    pub fn published(&self) -> Vec<(String, serde_json::Value)> {
        self.published.lock().clone()
    }

    /// Make every subsequent publish fail
    pub fn fail_publishes(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl UpdatePublisher for InMemoryPublisher {
    async fn publish(&self, topic: &str, payload: &serde_json::Value) -> MessagingResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(MessagingError::queue_operation(
                topic,
                "publish",
                "injected publish fault",
            ));
        }
        self.published
            .lock()
            .push((topic.to_string(), payload.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_receive_times_out_with_empty_batch() {
        let source = InMemorySource::new("images_ready");
        let messages = source
            .receive(10, Duration::from_millis(250))
            .await
            .unwrap();
        assert!(messages.is_empty());
    }

    #[tokio::test]
    async fn test_receive_drains_up_to_max() {
        let source = InMemorySource::new("images_ready");
        source.push_keys(["AA", "BB", "CC"]);

        let first = source.receive(2, Duration::from_secs(1)).await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].message_id, Some(1));

        let second = source.receive(2, Duration::from_secs(1)).await.unwrap();
        assert_eq!(second.len(), 1);
    }

    #[tokio::test]
    async fn test_injected_read_fault_is_one_shot() {
        let source = InMemorySource::new("images_ready");
        source.push_keys(["AA"]);
        source.fail_next_receive();

        assert!(source.receive(1, Duration::from_secs(1)).await.is_err());
        assert_eq!(
            source.receive(1, Duration::from_secs(1)).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn test_publisher_records_payloads() {
        let publisher = InMemoryPublisher::new();
        publisher
            .publish("updates_out", &serde_json::json!({"u1": "AA,BB"}))
            .await
            .unwrap();

        let published = publisher.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "updates_out");
    }
}
