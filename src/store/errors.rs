//! # Store Error Types
//!
//! Errors raised by the persisted column store collaborator.

use thiserror::Error;

/// Errors raised by [`ColumnStore`](super::ColumnStore) implementations
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database connection error: {message}")]
    DatabaseConnection { message: String },

    #[error("Store read failed: {table}: {message}")]
    Read { table: String, message: String },

    #[error("Store write failed: {table}: {message}")]
    Write { table: String, message: String },

    #[error("Update sequence allocation failed for {scope}: {message}")]
    Sequence { scope: String, message: String },

    #[error("Invalid column name '{column}': expected 'family:qualifier'")]
    InvalidColumn { column: String },
}

impl StoreError {
    pub fn database_connection(message: impl Into<String>) -> Self {
        Self::DatabaseConnection {
            message: message.into(),
        }
    }

    pub fn read(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Read {
            table: table.into(),
            message: message.into(),
        }
    }

    pub fn write(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Write {
            table: table.into(),
            message: message.into(),
        }
    }

    pub fn sequence(scope: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Sequence {
            scope: scope.into(),
            message: message.into(),
        }
    }

    pub fn invalid_column(column: impl Into<String>) -> Self {
        Self::InvalidColumn {
            column: column.into(),
        }
    }
}

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;
