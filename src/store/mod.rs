//! # Persisted Column Store
//!
//! The store is the only state shared between checker workers. Item rows carry
//! the claimed markers, update rows carry the summary of each committed batch,
//! and a per-pipeline, per-day counter seeds batch identifiers.
//!
//! Cells are addressed HBase-style as `family:qualifier` columns on string row
//! keys. Two backends ship with the crate:
//!
//! - [`InMemoryColumnStore`] for tests and local runs
//! - [`PgColumnStore`] persisting cells in PostgreSQL through `sqlx`

pub mod errors;
pub mod in_memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use errors::{StoreError, StoreResult};
pub use in_memory::InMemoryColumnStore;
pub use postgres::PgColumnStore;

use crate::checker::types::PipelineFingerprint;

/// Column name to value for one row
pub type Row = BTreeMap<String, String>;

/// Rows to write, keyed by row key
pub type RowBatch = BTreeMap<String, Row>;

/// A row returned by a column lookup, holding only the requested columns it has
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRow {
    pub row_key: String,
    pub columns: Row,
}

#[async_trait]
pub trait ColumnStore: Send + Sync + 'static {
    /// Rows among `row_keys` holding at least one of `columns`
    ///
    /// Rows holding none of the columns are omitted from the result.
    async fn rows_with_columns(
        &self,
        table: &str,
        row_keys: &[String],
        columns: &[String],
    ) -> StoreResult<Vec<StoredRow>>;

    /// Write every row of `rows` into `table`, overwriting existing cells
    async fn put_rows(&self, table: &str, rows: &RowBatch) -> StoreResult<()>;

    /// Next value of the update counter for `scope` on `day`, starting at 1
    async fn next_update_sequence(&self, scope: &str, day: NaiveDate) -> StoreResult<u64>;

    /// Backend name for logging
    fn backend_name(&self) -> &'static str;
}

/// Table and column-family names owned by the store deployment
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreLayout {
    /// Item table holding markers and info columns, one row per item key
    pub item_table: String,
    /// Update table holding one summary row per committed batch
    pub update_table: String,
    /// Family of the claimed-marker columns on item rows
    pub extraction_family: String,
    /// Family of the staged info columns on item rows
    pub item_info_family: String,
    /// Family of the summary columns on update rows
    pub update_info_family: String,
    pub list_sha1s_qualifier: String,
    pub created_qualifier: String,
}

impl Default for StoreLayout {
    fn default() -> Self {
        Self {
            item_table: "sha1_infos".to_string(),
            update_table: "update_infos".to_string(),
            extraction_family: "ext".to_string(),
            item_info_family: "info".to_string(),
            update_info_family: "info".to_string(),
            list_sha1s_qualifier: "list_sha1s".to_string(),
            created_qualifier: "created".to_string(),
        }
    }
}

impl StoreLayout {
    /// Presence marks an item as processed by this pipeline
    pub fn processed_column(&self, fingerprint: &PipelineFingerprint) -> String {
        format!("{}:{}_processed", self.extraction_family, fingerprint)
    }

    /// Batch identifier marker on an item row
    pub fn update_id_column(&self, fingerprint: &PipelineFingerprint) -> String {
        format!("{}:{}_updateid", self.extraction_family, fingerprint)
    }

    /// Both claimed-marker columns, checked together
    pub fn check_columns(&self, fingerprint: &PipelineFingerprint) -> Vec<String> {
        vec![
            self.processed_column(fingerprint),
            self.update_id_column(fingerprint),
        ]
    }

    pub fn item_info_column(&self, field: &str) -> String {
        format!("{}:{}", self.item_info_family, field)
    }

    pub fn list_sha1s_column(&self) -> String {
        format!("{}:{}", self.update_info_family, self.list_sha1s_qualifier)
    }

    pub fn created_column(&self) -> String {
        format!("{}:{}", self.update_info_family, self.created_qualifier)
    }
}

/// Split `family:qualifier`, rejecting names without a family
pub fn split_column(column: &str) -> StoreResult<(&str, &str)> {
    match column.split_once(':') {
        Some((family, qualifier)) if !family.is_empty() && !qualifier.is_empty() => {
            Ok((family, qualifier))
        }
        _ => Err(StoreError::invalid_column(column)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_columns_are_scoped_by_fingerprint() {
        let layout = StoreLayout::default();
        let fingerprint = PipelineFingerprint::new("sbpycaffeimg", "full", "image");
        assert_eq!(
            layout.check_columns(&fingerprint),
            vec![
                "ext:sbpycaffeimg_feat_full_image_processed".to_string(),
                "ext:sbpycaffeimg_feat_full_image_updateid".to_string(),
            ]
        );
        assert_eq!(layout.item_info_column("s3_url"), "info:s3_url");
        assert_eq!(layout.list_sha1s_column(), "info:list_sha1s");
        assert_eq!(layout.created_column(), "info:created");
    }

    #[test]
    fn test_split_column() {
        assert_eq!(split_column("info:img_info").unwrap(), ("info", "img_info"));
        assert!(split_column("img_info").is_err());
        assert!(split_column(":img_info").is_err());
    }
}
