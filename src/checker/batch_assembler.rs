//! # Batch Assembler
//!
//! Turns a bounded list of unclaimed keys into the rows a commit writes: each
//! item row carries its staged info under the item info family plus the batch
//! identifier under this pipeline's `_updateid` column.

use tracing::debug;

use super::batch_id::{BatchIdGenerator, BatchIdentifier};
use super::pending_cache::PendingInfoCache;
use super::types::{AssemblyMode, ItemKey, PipelineFingerprint};
use crate::store::{Row, RowBatch, StoreLayout, StoreResult};

/// Rows and identifier of one batch, ready to commit
#[derive(Debug, Clone)]
pub struct AssembledBatch {
    pub identifier: BatchIdentifier,
    /// Keys included in the batch, in assembly order
    pub members: Vec<ItemKey>,
    /// Item rows keyed by item key
    pub item_rows: RowBatch,
    /// Keys left out because their staged info vanished (daemon mode only)
    pub dropped: Vec<ItemKey>,
}

impl AssembledBatch {
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Member keys joined with `,` as stored in the summary row and announcement
    pub fn joined_members(&self) -> String {
        self.members
            .iter()
            .map(ItemKey::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[derive(Debug)]
pub struct BatchAssembler {
    id_generator: BatchIdGenerator,
    layout: StoreLayout,
    update_id_column: String,
    mode: AssemblyMode,
}

impl BatchAssembler {
    pub fn new(
        id_generator: BatchIdGenerator,
        layout: StoreLayout,
        fingerprint: &PipelineFingerprint,
        mode: AssemblyMode,
    ) -> Self {
        let update_id_column = layout.update_id_column(fingerprint);
        Self {
            id_generator,
            layout,
            update_id_column,
            mode,
        }
    }

    pub fn mode(&self) -> AssemblyMode {
        self.mode
    }

    /// Allocate a fresh identifier and build the item rows for `keys`
    pub async fn assemble(
        &self,
        keys: &[ItemKey],
        cache: &PendingInfoCache,
    ) -> StoreResult<AssembledBatch> {
        let identifier = self.id_generator.next_identifier().await?;
        let rendered_id = identifier.to_string();

        let mut members = Vec::with_capacity(keys.len());
        let mut item_rows = RowBatch::new();
        let mut dropped = Vec::new();

        for key in keys {
            if item_rows.contains_key(key.as_str()) {
                continue;
            }

            let mut row = Row::new();
            match (cache.get(key), self.mode) {
                (Some(info), _) => {
                    for (field, value) in info {
                        row.insert(self.layout.item_info_column(field), value.clone());
                    }
                }
                // Another worker claimed it between our intake and this commit
                (None, AssemblyMode::Daemon) => {
                    dropped.push(key.clone());
                    continue;
                }
                (None, AssemblyMode::Single) => {}
            }

            row.insert(self.update_id_column.clone(), rendered_id.clone());
            item_rows.insert(key.as_str().to_string(), row);
            members.push(key.clone());
        }

        debug!(
            batch_id = %rendered_id,
            members = members.len(),
            dropped = dropped.len(),
            "Batch assembled"
        );

        Ok(AssembledBatch {
            identifier,
            members,
            item_rows,
            dropped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::batch_id::WorkerDiscriminator;
    use crate::checker::types::PendingInfoRecord;
    use crate::store::{ColumnStore, InMemoryColumnStore};
    use std::sync::Arc;

    fn assembler(mode: AssemblyMode) -> BatchAssembler {
        let store: Arc<dyn ColumnStore> = Arc::new(InMemoryColumnStore::new());
        let fingerprint = PipelineFingerprint::new("sbpycaffeimg", "full", "image");
        let generator = BatchIdGenerator::new(
            store,
            &fingerprint,
            WorkerDiscriminator::new("ec7").unwrap(),
        );
        BatchAssembler::new(generator, StoreLayout::default(), &fingerprint, mode)
    }

    fn staged_cache() -> PendingInfoCache {
        let mut cache = PendingInfoCache::new();
        cache.stage(
            ItemKey::from("AA"),
            PendingInfoRecord::from([("s3_url".to_string(), "s3://aa".to_string())]),
        );
        cache
    }

    #[tokio::test]
    async fn test_rows_carry_info_and_batch_marker() {
        let batch = assembler(AssemblyMode::Daemon)
            .assemble(&[ItemKey::from("AA")], &staged_cache())
            .await
            .unwrap();

        let row = &batch.item_rows["AA"];
        assert_eq!(row["info:s3_url"], "s3://aa");
        assert_eq!(
            row["ext:sbpycaffeimg_feat_full_image_updateid"],
            batch.identifier.to_string()
        );
        assert_eq!(batch.joined_members(), "AA");
    }

    #[tokio::test]
    async fn test_daemon_mode_drops_keys_without_info() {
        let keys = [ItemKey::from("AA"), ItemKey::from("BB")];
        let batch = assembler(AssemblyMode::Daemon)
            .assemble(&keys, &staged_cache())
            .await
            .unwrap();

        assert_eq!(batch.members, vec![ItemKey::from("AA")]);
        assert_eq!(batch.dropped, vec![ItemKey::from("BB")]);
        assert!(!batch.item_rows.contains_key("BB"));
    }

    #[tokio::test]
    async fn test_single_mode_keeps_keys_without_info() {
        let keys = [ItemKey::from("AA"), ItemKey::from("BB")];
        let batch = assembler(AssemblyMode::Single)
            .assemble(&keys, &staged_cache())
            .await
            .unwrap();

        assert_eq!(batch.len(), 2);
        assert!(batch.dropped.is_empty());
        assert_eq!(batch.item_rows["BB"].len(), 1);
        assert_eq!(batch.joined_members(), "AA,BB");
    }
}
