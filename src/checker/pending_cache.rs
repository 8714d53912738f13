//! Per-worker staging area for item info awaiting a batch.

use std::collections::HashMap;

use super::types::{ItemKey, PendingInfoRecord};

/// Staged info records keyed by item, owned by exactly one check loop
#[derive(Debug, Default)]
pub struct PendingInfoCache {
    records: HashMap<ItemKey, PendingInfoRecord>,
}

impl PendingInfoCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage `record` for `key`, replacing any earlier record wholesale
    pub fn stage(&mut self, key: ItemKey, record: PendingInfoRecord) {
        self.records.insert(key, record);
    }

    pub fn get(&self, key: &ItemKey) -> Option<&PendingInfoRecord> {
        self.records.get(key)
    }

    pub fn contains(&self, key: &ItemKey) -> bool {
        self.records.contains_key(key)
    }

    /// Drop the records of `keys`; absent keys are ignored
    ///
    /// Another worker may already have claimed an item, so a missing entry is routine.
    pub fn remove_all<'a>(&mut self, keys: impl IntoIterator<Item = &'a ItemKey>) -> usize {
        keys.into_iter()
            .filter(|key| self.records.remove(*key).is_some())
            .count()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
