//! Test harness wiring check loops to in-memory collaborators.

#![allow(dead_code)]

use std::sync::Arc;

use extraction_checker::bootstrap::CheckerContext;
use extraction_checker::checker::{
    Announcer, AssemblyMode, CheckLoop, WorkerDiscriminator, CREATED_FORMAT,
};
use extraction_checker::config::{CheckerConfig, CheckerSettings};
use extraction_checker::messaging::{InMemoryPublisher, InMemorySource};
use extraction_checker::store::{InMemoryColumnStore, Row, RowBatch};

pub const UPDATES_TOPIC: &str = "updates_out";
pub const PROCESSED_COLUMN: &str = "ext:sbpycaffeimg_feat_full_image_processed";
pub const UPDATE_ID_COLUMN: &str = "ext:sbpycaffeimg_feat_full_image_updateid";

/// Settings with short stream reads so paused-clock tests cycle quickly
pub fn settings(batch_update_size: usize, max_delay_seconds: u64) -> CheckerSettings {
    let mut settings = CheckerSettings::new("sbpycaffeimg", "full", "image");
    settings.batch_update_size = batch_update_size;
    settings.max_delay_seconds = max_delay_seconds;
    settings.read_timeout_ms = 100;
    settings.restart_backoff_unit_ms = 100;
    settings
}

/// A committed batch as seen in the update table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryRow {
    pub batch_id: String,
    pub keys: Vec<String>,
    pub created: String,
}

pub struct CheckerHarness {
    pub store: Arc<InMemoryColumnStore>,
    pub source: Arc<InMemorySource>,
    pub publisher: Arc<InMemoryPublisher>,
    pub context: CheckerContext,
}

impl CheckerHarness {
    pub fn new(settings: CheckerSettings) -> Self {
        Self::with_store(settings, Arc::new(InMemoryColumnStore::new()))
    }

    /// Another worker's view: its own stream, the same store
    pub fn sharing_store(&self) -> Self {
        Self::with_store(self.context.config.checker.clone(), self.store.clone())
    }

    fn with_store(settings: CheckerSettings, store: Arc<InMemoryColumnStore>) -> Self {
        let source = Arc::new(InMemorySource::new("images_ready"));
        let publisher = Arc::new(InMemoryPublisher::new());
        let context = CheckerContext::new(
            Arc::new(CheckerConfig::in_memory(settings)),
            store.clone(),
            source.clone(),
            Some(Announcer {
                publisher: publisher.clone(),
                topic: UPDATES_TOPIC.to_string(),
            }),
        );
        Self {
            store,
            source,
            publisher,
            context,
        }
    }

    pub fn check_loop(&self, worker: &str, mode: AssemblyMode) -> CheckLoop {
        let worker = WorkerDiscriminator::new(worker).expect("valid discriminator");
        CheckLoop::new(&self.context, worker, mode)
    }

    /// Mark `keys` as already processed by this pipeline
    pub async fn mark_processed(&self, keys: &[&str]) {
        use extraction_checker::store::ColumnStore;

        let rows: RowBatch = keys
            .iter()
            .map(|key| {
                (
                    key.to_string(),
                    Row::from([(PROCESSED_COLUMN.to_string(), "1".to_string())]),
                )
            })
            .collect();
        self.store
            .put_rows("sha1_infos", &rows)
            .await
            .expect("seed processed markers");
    }

    pub fn summaries(&self) -> Vec<SummaryRow> {
        self.store
            .rows("update_infos")
            .into_iter()
            .map(|row| SummaryRow {
                keys: row.columns["info:list_sha1s"]
                    .split(',')
                    .map(str::to_string)
                    .collect(),
                created: row.columns["info:created"].clone(),
                batch_id: row.row_key,
            })
            .collect()
    }
}

/// Whether `created` parses with the summary timestamp format
pub fn is_created_timestamp(created: &str) -> bool {
    chrono::NaiveDateTime::parse_from_str(created, CREATED_FORMAT).is_ok()
}
