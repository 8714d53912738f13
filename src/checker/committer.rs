//! # Committer
//!
//! Persists an assembled batch as a sequential pipeline:
//!
//! 1. item rows (staged info + batch marker) into the item table
//! 2. one summary row keyed by the batch identifier into the update table
//! 3. optionally, `{"<batch id>": "<joined keys>"}` on the updates topic
//!
//! The steps are not transactional. A failure in step 1 or 2 is returned as a
//! fatal [`CheckerError::CommitFailed`] and nothing later runs, so a batch whose
//! item rows landed but whose summary row did not stays that way; no
//! reconciliation is attempted. A failed announcement only degrades visibility
//! and is logged.

use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

use super::batch_assembler::AssembledBatch;
use crate::error::{CheckerError, CheckerResult, CommitStage};
use crate::messaging::UpdatePublisher;
use crate::store::{ColumnStore, Row, RowBatch, StoreLayout};

/// Timestamp format of the `created` column of summary rows
pub const CREATED_FORMAT: &str = "%Y-%m-%d:%H.%M.%S";

/// Outcome of a successful commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitReceipt {
    pub batch_id: String,
    pub items: usize,
    pub announced: bool,
}

/// Announcement target; absent means store-only visibility
#[derive(Clone)]
pub struct Announcer {
    pub publisher: Arc<dyn UpdatePublisher>,
    pub topic: String,
}

pub struct Committer {
    store: Arc<dyn ColumnStore>,
    layout: StoreLayout,
    announcer: Option<Announcer>,
}

impl fmt::Debug for Committer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Committer")
            .field("backend", &self.store.backend_name())
            .field("layout", &self.layout)
            .field(
                "updates_out_topic",
                &self.announcer.as_ref().map(|a| a.topic.as_str()),
            )
            .finish()
    }
}

impl Committer {
    pub fn new(store: Arc<dyn ColumnStore>, layout: StoreLayout, announcer: Option<Announcer>) -> Self {
        if announcer.is_none() {
            warn!("No updates topic configured, batches will be written to the store only");
        }
        Self {
            store,
            layout,
            announcer,
        }
    }

    pub fn announces(&self) -> bool {
        self.announcer.is_some()
    }

    pub async fn commit(&self, batch: &AssembledBatch) -> CheckerResult<CommitReceipt> {
        let batch_id = batch.identifier.to_string();
        let joined = batch.joined_members();

        info!(
            batch_id = %batch_id,
            table = %self.layout.item_table,
            items = batch.len(),
            "Pushing item rows for update"
        );
        self.store
            .put_rows(&self.layout.item_table, &batch.item_rows)
            .await
            .map_err(|e| CheckerError::commit_failed(&batch_id, CommitStage::ItemRows, e))?;

        let summary = RowBatch::from([(
            batch_id.clone(),
            Row::from([
                (self.layout.list_sha1s_column(), joined.clone()),
                (
                    self.layout.created_column(),
                    Utc::now().format(CREATED_FORMAT).to_string(),
                ),
            ]),
        )]);

        info!(
            batch_id = %batch_id,
            table = %self.layout.update_table,
            "Pushing update summary"
        );
        self.store
            .put_rows(&self.layout.update_table, &summary)
            .await
            .map_err(|e| CheckerError::commit_failed(&batch_id, CommitStage::BatchSummary, e))?;

        let announced = match &self.announcer {
            Some(announcer) => {
                let mut announcement = serde_json::Map::new();
                announcement.insert(batch_id.clone(), serde_json::Value::String(joined));
                let payload = serde_json::Value::Object(announcement);
                match announcer.publisher.publish(&announcer.topic, &payload).await {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(
                            batch_id = %batch_id,
                            topic = %announcer.topic,
                            error = %e,
                            "Failed to announce committed update"
                        );
                        false
                    }
                }
            }
            None => false,
        };

        Ok(CommitReceipt {
            batch_id,
            items: batch.len(),
            announced,
        })
    }
}
