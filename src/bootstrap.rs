//! # Checker Bootstrap
//!
//! Builds the collaborators a check loop needs from configuration: the column
//! store, the notification source and the optional update announcer.

use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

use crate::checker::committer::Announcer;
use crate::config::{CheckerConfig, ConfigurationError, StoreBackend, StreamBackend};
use crate::error::CheckerResult;
use crate::messaging::{
    InMemoryPublisher, InMemorySource, NotificationSource, PgmqClient, PgmqNotificationSource,
    UpdatePublisher,
};
use crate::store::{ColumnStore, InMemoryColumnStore, PgColumnStore};

/// Shared collaborators for check loops
#[derive(Clone)]
pub struct CheckerContext {
    pub config: Arc<CheckerConfig>,
    pub store: Arc<dyn ColumnStore>,
    pub source: Arc<dyn NotificationSource>,
    pub announcer: Option<Announcer>,
}

impl fmt::Debug for CheckerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckerContext")
            .field("fingerprint", &self.config.checker.fingerprint().to_string())
            .field("store", &self.store.backend_name())
            .field("source", &self.source.source_name())
            .field(
                "updates_out_topic",
                &self.announcer.as_ref().map(|a| a.topic.as_str()),
            )
            .finish()
    }
}

impl CheckerContext {
    /// Assemble a context from already-built collaborators
    pub fn new(
        config: Arc<CheckerConfig>,
        store: Arc<dyn ColumnStore>,
        source: Arc<dyn NotificationSource>,
        announcer: Option<Announcer>,
    ) -> Self {
        Self {
            config,
            store,
            source,
            announcer,
        }
    }

    /// Connect every collaborator named by `config`
    pub async fn connect(config: Arc<CheckerConfig>) -> CheckerResult<Self> {
        let store: Arc<dyn ColumnStore> = match config.store.backend {
            StoreBackend::Memory => Arc::new(InMemoryColumnStore::new()),
            StoreBackend::Postgres => {
                let url = config.store.database_url.as_deref().ok_or_else(|| {
                    ConfigurationError::missing_required_field("database_url", "store")
                })?;
                Arc::new(PgColumnStore::connect(url, config.store.max_connections).await?)
            }
        };

        let stream = &config.stream;
        let (source, publisher): (Arc<dyn NotificationSource>, Arc<dyn UpdatePublisher>) =
            match stream.backend {
                StreamBackend::Memory => (
                    Arc::new(InMemorySource::new(&stream.consumer_queue)),
                    Arc::new(InMemoryPublisher::new()),
                ),
                StreamBackend::Pgmq => {
                    let url = stream.database_url.as_deref().ok_or_else(|| {
                        ConfigurationError::missing_required_field("database_url", "stream")
                    })?;
                    let client = PgmqClient::connect(url).await?;
                    client.create_queue(&stream.consumer_queue).await?;
                    if let Some(topic) = &stream.updates_out_topic {
                        client.create_queue(topic).await?;
                    }
                    (
                        Arc::new(PgmqNotificationSource::new(
                            client.clone(),
                            &stream.consumer_queue,
                            stream.visibility_timeout_seconds,
                        )),
                        Arc::new(client),
                    )
                }
            };

        let announcer = match &stream.updates_out_topic {
            Some(topic) => Some(Announcer {
                publisher,
                topic: topic.clone(),
            }),
            None => {
                warn!("Could not find 'updates_out_topic'. Will write only to the store.");
                None
            }
        };

        info!(
            store = store.backend_name(),
            source = source.source_name(),
            "Checker collaborators connected"
        );

        Ok(Self::new(config, store, source, announcer))
    }
}
