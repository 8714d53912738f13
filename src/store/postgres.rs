//! # PostgreSQL Column Store
//!
//! Stores cells as `(table_name, row_key, column_name, value)` tuples so the
//! column-family layout of the item and update tables maps onto a single
//! relational table. Update counters live in their own table and are advanced
//! with an upsert, which keeps them monotonic across concurrent workers.

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row as SqlxRow};
use tracing::{debug, error, info, instrument};

use super::{split_column, ColumnStore, Row, RowBatch, StoreError, StoreResult, StoredRow};

const CREATE_CELLS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS extraction_cells (
        table_name  TEXT NOT NULL,
        row_key     TEXT NOT NULL,
        column_name TEXT NOT NULL,
        value       TEXT NOT NULL,
        updated_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
        PRIMARY KEY (table_name, row_key, column_name)
    )
"#;

const CREATE_COUNTERS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS extraction_update_counters (
        scope   TEXT NOT NULL,
        day     DATE NOT NULL,
        counter BIGINT NOT NULL,
        PRIMARY KEY (scope, day)
    )
"#;

/// PostgreSQL-backed [`ColumnStore`]
#[derive(Debug, Clone)]
pub struct PgColumnStore {
    pool: PgPool,
}

impl PgColumnStore {
    /// Create a store on an existing pool (BYOP)
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a dedicated pool and make sure the schema exists
    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        info!("🚀 Connecting column store to PostgreSQL");

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::database_connection(e.to_string()))?;

        let store = Self::new(pool);
        store.ensure_schema().await?;

        info!("✅ Column store connected");
        Ok(store)
    }

    /// Create the cell and counter tables when missing
    pub async fn ensure_schema(&self) -> StoreResult<()> {
        for statement in [CREATE_CELLS_TABLE, CREATE_COUNTERS_TABLE] {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::database_connection(format!("schema setup: {e}")))?;
        }
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ColumnStore for PgColumnStore {
    #[instrument(skip(self, row_keys, columns), fields(rows = row_keys.len()))]
    async fn rows_with_columns(
        &self,
        table: &str,
        row_keys: &[String],
        columns: &[String],
    ) -> StoreResult<Vec<StoredRow>> {
        if row_keys.is_empty() || columns.is_empty() {
            return Ok(Vec::new());
        }

        let query = r#"
            SELECT row_key, column_name, value
            FROM extraction_cells
            WHERE table_name = $1
              AND row_key = ANY($2)
              AND column_name = ANY($3)
            ORDER BY row_key, column_name
        "#;

        let rows = sqlx::query(query)
            .bind(table)
            .bind(row_keys)
            .bind(columns)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to read columns from {}: {}", table, e);
                StoreError::read(table, e.to_string())
            })?;

        let mut found: Vec<StoredRow> = Vec::new();
        for row in rows {
            let row_key: String = row.get("row_key");
            let column_name: String = row.get("column_name");
            let value: String = row.get("value");

            match found.last_mut() {
                Some(last) if last.row_key == row_key => {
                    last.columns.insert(column_name, value);
                }
                _ => found.push(StoredRow {
                    row_key,
                    columns: Row::from([(column_name, value)]),
                }),
            }
        }

        debug!(table = %table, found = found.len(), "Column lookup complete");
        Ok(found)
    }

    #[instrument(skip(self, rows), fields(rows = rows.len()))]
    async fn put_rows(&self, table: &str, rows: &RowBatch) -> StoreResult<()> {
        let mut row_keys = Vec::new();
        let mut column_names = Vec::new();
        let mut values = Vec::new();

        for (row_key, columns) in rows {
            for (column, value) in columns {
                split_column(column)?;
                row_keys.push(row_key.clone());
                column_names.push(column.clone());
                values.push(value.clone());
            }
        }

        if row_keys.is_empty() {
            return Ok(());
        }

        let query = r#"
            INSERT INTO extraction_cells (table_name, row_key, column_name, value)
            SELECT $1, cells.row_key, cells.column_name, cells.value
            FROM UNNEST($2::TEXT[], $3::TEXT[], $4::TEXT[])
                AS cells(row_key, column_name, value)
            ON CONFLICT (table_name, row_key, column_name)
            DO UPDATE SET value = EXCLUDED.value, updated_at = now()
        "#;

        sqlx::query(query)
            .bind(table)
            .bind(&row_keys)
            .bind(&column_names)
            .bind(&values)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to write {} rows to {}: {}", rows.len(), table, e);
                StoreError::write(table, e.to_string())
            })?;

        Ok(())
    }

    async fn next_update_sequence(&self, scope: &str, day: NaiveDate) -> StoreResult<u64> {
        let query = r#"
            INSERT INTO extraction_update_counters (scope, day, counter)
            VALUES ($1, $2, 1)
            ON CONFLICT (scope, day)
            DO UPDATE SET counter = extraction_update_counters.counter + 1
            RETURNING counter
        "#;

        let row = sqlx::query(query)
            .bind(scope)
            .bind(day)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::sequence(scope, e.to_string()))?;

        let counter: i64 = row.get("counter");
        u64::try_from(counter)
            .map_err(|_| StoreError::sequence(scope, format!("negative counter {counter}")))
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}
