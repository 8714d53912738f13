//! Proptest strategies for item keys and worker layouts.

#![allow(dead_code)]

use proptest::prelude::*;

/// Short hex keys drawn from a small space so duplicates are common
pub fn item_key_strategy() -> impl Strategy<Value = String> {
    "[0-9A-F]{2}"
}

pub fn key_stream_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(item_key_strategy(), 1..40)
}

pub fn batch_size_strategy() -> impl Strategy<Value = usize> {
    1usize..8
}

/// (workers, identifiers per worker)
pub fn worker_load_strategy() -> impl Strategy<Value = (usize, usize)> {
    (1usize..6, 1usize..25)
}
