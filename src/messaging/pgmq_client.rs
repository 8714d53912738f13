//! # PostgreSQL Message Queue Client
//!
//! Thin `sqlx` client over the pgmq extension functions. Notifications are read
//! with `pgmq.read_with_poll` and deleted as soon as they are read, matching an
//! auto-committing consumer; announcements are sent with `pgmq.send`.

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::time::Duration;
use tracing::{debug, info};

use super::errors::{MessagingError, MessagingResult};
use super::message::RawNotification;
use super::traits::{NotificationSource, UpdatePublisher};

/// pgmq client sharing one connection pool
#[derive(Debug, Clone)]
pub struct PgmqClient {
    pool: PgPool,
}

impl PgmqClient {
    /// Connect a dedicated pool
    pub async fn connect(database_url: &str) -> MessagingResult<Self> {
        info!("🚀 Connecting to pgmq");

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(|e| MessagingError::database_connection(e.to_string()))?;

        info!("✅ Connected to pgmq");
        Ok(Self { pool })
    }

    /// Create client using an existing connection pool (BYOP)
    pub fn new_with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create queue if it doesn't exist
    pub async fn create_queue(&self, queue_name: &str) -> MessagingResult<()> {
        debug!("📋 Creating queue: {}", queue_name);

        sqlx::query("SELECT pgmq.create($1)")
            .bind(queue_name)
            .execute(&self.pool)
            .await
            .map_err(|e| MessagingError::queue_operation(queue_name, "create", e.to_string()))?;

        Ok(())
    }

    /// Send a JSON message, returning its id
    pub async fn send_json_message(
        &self,
        queue_name: &str,
        message: &serde_json::Value,
    ) -> MessagingResult<i64> {
        let row = sqlx::query("SELECT pgmq.send($1, $2) AS msg_id")
            .bind(queue_name)
            .bind(message)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MessagingError::queue_operation(queue_name, "send", e.to_string()))?;

        let msg_id: i64 = row.get("msg_id");
        debug!("📤 Message {} sent to queue: {}", msg_id, queue_name);
        Ok(msg_id)
    }

    /// Read up to `qty` messages, polling for at most `max_poll`
    pub async fn read_with_poll(
        &self,
        queue_name: &str,
        visibility_timeout_seconds: i32,
        qty: i32,
        max_poll: Duration,
    ) -> MessagingResult<Vec<(i64, serde_json::Value)>> {
        // pgmq polls in whole seconds
        let max_poll_seconds = i32::try_from(max_poll.as_secs().max(1)).unwrap_or(i32::MAX);

        let rows = sqlx::query(
            "SELECT msg_id, message FROM pgmq.read_with_poll($1, $2, $3, $4, $5)",
        )
        .bind(queue_name)
        .bind(visibility_timeout_seconds)
        .bind(qty)
        .bind(max_poll_seconds)
        .bind(100_i32)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MessagingError::queue_operation(queue_name, "read", e.to_string()))?;

        let messages = rows
            .iter()
            .map(|row| (row.get("msg_id"), row.get("message")))
            .collect::<Vec<(i64, serde_json::Value)>>();

        debug!(
            "📨 Read {} messages from queue: {}",
            messages.len(),
            queue_name
        );
        Ok(messages)
    }

    /// Delete messages by id
    pub async fn delete_messages(&self, queue_name: &str, message_ids: &[i64]) -> MessagingResult<()> {
        if message_ids.is_empty() {
            return Ok(());
        }

        sqlx::query("SELECT pgmq.delete($1, $2::BIGINT[])")
            .bind(queue_name)
            .bind(message_ids)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MessagingError::queue_operation(queue_name, "delete", e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl UpdatePublisher for PgmqClient {
    async fn publish(&self, topic: &str, payload: &serde_json::Value) -> MessagingResult<()> {
        self.send_json_message(topic, payload).await.map(|_| ())
    }
}

/// Notification source reading one pgmq queue
#[derive(Debug, Clone)]
pub struct PgmqNotificationSource {
    client: PgmqClient,
    queue_name: String,
    visibility_timeout_seconds: i32,
}

impl PgmqNotificationSource {
    pub fn new(client: PgmqClient, queue_name: impl Into<String>, visibility_timeout_seconds: i32) -> Self {
        Self {
            client,
            queue_name: queue_name.into(),
            visibility_timeout_seconds,
        }
    }
}

#[async_trait]
impl NotificationSource for PgmqNotificationSource {
    async fn receive(
        &self,
        max_messages: usize,
        wait: Duration,
    ) -> MessagingResult<Vec<RawNotification>> {
        let qty = i32::try_from(max_messages).unwrap_or(i32::MAX);
        let messages = self
            .client
            .read_with_poll(&self.queue_name, self.visibility_timeout_seconds, qty, wait)
            .await?;

        let ids: Vec<i64> = messages.iter().map(|(id, _)| *id).collect();
        self.client.delete_messages(&self.queue_name, &ids).await?;

        Ok(messages
            .into_iter()
            .map(|(id, message)| RawNotification::new(Some(id), message.to_string()))
            .collect())
    }

    fn source_name(&self) -> &str {
        &self.queue_name
    }
}
