//! # In-Memory Column Store
//!
//! Column store kept in process memory. Backs the `memory` store backend and the
//! test suite; write and read faults can be injected per table to exercise the
//! partial-failure paths of a commit.

use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use tracing::debug;

use super::{split_column, ColumnStore, Row, RowBatch, StoreError, StoreResult, StoredRow};

type Table = HashMap<String, Row>;

#[derive(Debug, Default)]
pub struct InMemoryColumnStore {
    tables: RwLock<HashMap<String, Table>>,
    counters: DashMap<(String, NaiveDate), u64>,
    failing_writes: Mutex<HashSet<String>>,
    failing_reads: Mutex<HashSet<String>>,
}

impl InMemoryColumnStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `put_rows` on `table` fail
    pub fn fail_writes_to(&self, table: &str) {
        self.failing_writes.lock().insert(table.to_string());
    }

    /// Make every subsequent lookup on `table` fail
    pub fn fail_reads_from(&self, table: &str) {
        self.failing_reads.lock().insert(table.to_string());
    }

    pub fn clear_faults(&self) {
        self.failing_writes.lock().clear();
        self.failing_reads.lock().clear();
    }

    /// Snapshot of one row
    pub fn row(&self, table: &str, row_key: &str) -> Option<Row> {
        self.tables
            .read()
            .get(table)
            .and_then(|rows| rows.get(row_key))
            .cloned()
    }

    /// Snapshot of every row in `table`, sorted by row key
    pub fn rows(&self, table: &str) -> Vec<StoredRow> {
        let tables = self.tables.read();
        let mut rows: Vec<StoredRow> = tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .map(|(row_key, columns)| StoredRow {
                        row_key: row_key.clone(),
                        columns: columns.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        rows.sort_by(|a, b| a.row_key.cmp(&b.row_key));
        rows
    }
}

#[async_trait]
impl ColumnStore for InMemoryColumnStore {
    async fn rows_with_columns(
        &self,
        table: &str,
        row_keys: &[String],
        columns: &[String],
    ) -> StoreResult<Vec<StoredRow>> {
        if self.failing_reads.lock().contains(table) {
            return Err(StoreError::read(table, "injected read fault"));
        }

        let tables = self.tables.read();
        let Some(rows) = tables.get(table) else {
            return Ok(Vec::new());
        };

        let mut seen = HashSet::new();
        let found = row_keys
            .iter()
            .filter(|row_key| seen.insert(row_key.as_str()))
            .filter_map(|row_key| {
                let row = rows.get(row_key)?;
                let matched: Row = columns
                    .iter()
                    .filter_map(|column| {
                        row.get(column)
                            .map(|value| (column.clone(), value.clone()))
                    })
                    .collect();
                (!matched.is_empty()).then(|| StoredRow {
                    row_key: row_key.clone(),
                    columns: matched,
                })
            })
            .collect();

        Ok(found)
    }

    async fn put_rows(&self, table: &str, rows: &RowBatch) -> StoreResult<()> {
        if self.failing_writes.lock().contains(table) {
            return Err(StoreError::write(table, "injected write fault"));
        }

        for columns in rows.values() {
            for column in columns.keys() {
                split_column(column)?;
            }
        }

        let mut tables = self.tables.write();
        let stored = tables.entry(table.to_string()).or_default();
        for (row_key, columns) in rows {
            stored
                .entry(row_key.clone())
                .or_default()
                .extend(columns.iter().map(|(k, v)| (k.clone(), v.clone())));
        }

        debug!(table = %table, rows = rows.len(), "In-memory rows written");
        Ok(())
    }

    async fn next_update_sequence(&self, scope: &str, day: NaiveDate) -> StoreResult<u64> {
        let mut counter = self.counters.entry((scope.to_string(), day)).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
