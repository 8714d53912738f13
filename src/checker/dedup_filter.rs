//! # Dedup Filter
//!
//! Resolves freshly gathered keys against the claimed markers in the item table.
//! A key is claimed when its row holds either the `_processed` or the `_updateid`
//! column of this pipeline fingerprint. Claimed keys lose their staged info.
//!
//! The check is a plain read with no claim taken, so two workers can both see a
//! key as unclaimed before either commits it. That race is accepted: a key may
//! end up in two batches.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use super::pending_cache::PendingInfoCache;
use super::types::{ItemKey, PipelineFingerprint};
use crate::store::{ColumnStore, StoreLayout, StoreResult};

/// Claimed/unclaimed partition of one checked key set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DedupOutcome {
    /// Unclaimed keys, each once, in first-seen order
    pub unclaimed: Vec<ItemKey>,
    pub claimed: Vec<ItemKey>,
}

pub struct DedupFilter {
    store: Arc<dyn ColumnStore>,
    item_table: String,
    check_columns: Vec<String>,
}

impl fmt::Debug for DedupFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DedupFilter")
            .field("backend", &self.store.backend_name())
            .field("item_table", &self.item_table)
            .field("check_columns", &self.check_columns)
            .finish()
    }
}

impl DedupFilter {
    pub fn new(
        store: Arc<dyn ColumnStore>,
        layout: &StoreLayout,
        fingerprint: &PipelineFingerprint,
    ) -> Self {
        Self {
            store,
            item_table: layout.item_table.clone(),
            check_columns: layout.check_columns(fingerprint),
        }
    }

    pub fn check_columns(&self) -> &[String] {
        &self.check_columns
    }

    /// Partition `keys`, deleting the staged info of every claimed key
    pub async fn check(
        &self,
        keys: &[ItemKey],
        cache: &mut PendingInfoCache,
    ) -> StoreResult<DedupOutcome> {
        let mut seen = HashSet::new();
        let unique: Vec<ItemKey> = keys
            .iter()
            .filter(|key| seen.insert(*key))
            .cloned()
            .collect();

        if unique.is_empty() {
            return Ok(DedupOutcome::default());
        }

        let row_keys: Vec<String> = unique.iter().map(|key| key.as_str().to_string()).collect();
        let found = self
            .store
            .rows_with_columns(&self.item_table, &row_keys, &self.check_columns)
            .await?;

        let claimed_rows: HashSet<&str> = found.iter().map(|row| row.row_key.as_str()).collect();
        let (claimed, unclaimed): (Vec<ItemKey>, Vec<ItemKey>) = unique
            .into_iter()
            .partition(|key| claimed_rows.contains(key.as_str()));

        cache.remove_all(&claimed);

        debug!(
            checked = row_keys.len(),
            claimed = claimed.len(),
            unclaimed = unclaimed.len(),
            "Dedup check complete"
        );

        Ok(DedupOutcome { unclaimed, claimed })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::types::PendingInfoRecord;
    use crate::store::{InMemoryColumnStore, Row, RowBatch};

    fn fingerprint() -> PipelineFingerprint {
        PipelineFingerprint::new("sbpycaffeimg", "full", "image")
    }

    async fn mark(store: &InMemoryColumnStore, key: &str, column: String) {
        let rows = RowBatch::from([(key.to_string(), Row::from([(column, "1".to_string())]))]);
        store.put_rows("sha1_infos", &rows).await.unwrap();
    }

    #[tokio::test]
    async fn test_claimed_keys_are_removed_with_their_info() {
        let store = Arc::new(InMemoryColumnStore::new());
        let layout = StoreLayout::default();
        mark(&store, "AA", layout.processed_column(&fingerprint())).await;
        mark(&store, "BB", layout.update_id_column(&fingerprint())).await;
        mark(&store, "CC", "ext:other_pipeline_processed".to_string()).await;

        let mut cache = PendingInfoCache::new();
        for key in ["AA", "BB", "CC", "DD"] {
            cache.stage(ItemKey::from(key), PendingInfoRecord::new());
        }

        let filter = DedupFilter::new(store, &layout, &fingerprint());
        let keys: Vec<ItemKey> = ["AA", "BB", "CC", "DD", "DD"]
            .into_iter()
            .map(ItemKey::from)
            .collect();
        let outcome = filter.check(&keys, &mut cache).await.unwrap();

        assert_eq!(
            outcome.unclaimed,
            vec![ItemKey::from("CC"), ItemKey::from("DD")]
        );
        assert_eq!(outcome.claimed.len(), 2);
        assert!(!cache.contains(&ItemKey::from("AA")));
        assert!(!cache.contains(&ItemKey::from("BB")));
        assert!(cache.contains(&ItemKey::from("CC")));
    }

    #[tokio::test]
    async fn test_empty_check_skips_store() {
        let store = Arc::new(InMemoryColumnStore::new());
        store.fail_reads_from("sha1_infos");
        let filter = DedupFilter::new(store, &StoreLayout::default(), &fingerprint());

        let outcome = filter.check(&[], &mut PendingInfoCache::new()).await.unwrap();
        assert_eq!(outcome, DedupOutcome::default());
    }

    #[tokio::test]
    async fn test_claimed_key_without_staged_info_is_tolerated() {
        let store = Arc::new(InMemoryColumnStore::new());
        let layout = StoreLayout::default();
        mark(&store, "AA", layout.processed_column(&fingerprint())).await;

        let filter = DedupFilter::new(store, &layout, &fingerprint());
        let outcome = filter
            .check(&[ItemKey::from("AA")], &mut PendingInfoCache::new())
            .await
            .unwrap();
        assert_eq!(outcome.claimed, vec![ItemKey::from("AA")]);
        assert!(outcome.unclaimed.is_empty());
    }
}
