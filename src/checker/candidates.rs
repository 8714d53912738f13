//! Unclaimed keys accumulated across intake rounds, awaiting a batch.

use std::collections::{HashSet, VecDeque};

use super::types::ItemKey;

/// Insertion-ordered set of candidate keys
#[derive(Debug, Default)]
pub struct CandidateSet {
    order: VecDeque<ItemKey>,
    members: HashSet<ItemKey>,
}

impl CandidateSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add keys not already present; returns how many were new
    pub fn extend(&mut self, keys: impl IntoIterator<Item = ItemKey>) -> usize {
        let mut added = 0;
        for key in keys {
            if self.members.insert(key.clone()) {
                self.order.push_back(key);
                added += 1;
            }
        }
        added
    }

    /// The oldest `limit` keys, left in place until [`Self::remove_all`]
    pub fn peek_batch(&self, limit: usize) -> Vec<ItemKey> {
        self.order.iter().take(limit).cloned().collect()
    }

    pub fn remove_all<'a>(&mut self, keys: impl IntoIterator<Item = &'a ItemKey>) {
        let mut removed = false;
        for key in keys {
            removed |= self.members.remove(key);
        }
        if removed {
            let members = &self.members;
            self.order.retain(|key| members.contains(key));
        }
    }

    pub fn contains(&self, key: &ItemKey) -> bool {
        self.members.contains(key)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
