//! Error types for the extraction checker.

use std::backtrace::Backtrace;
use std::fmt;
use thiserror::Error;

use crate::config::ConfigurationError;
use crate::messaging::MessagingError;
use crate::store::StoreError;

/// Sequential write steps of a commit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitStage {
    ItemRows,
    BatchSummary,
}

impl fmt::Display for CommitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommitStage::ItemRows => f.write_str("item rows"),
            CommitStage::BatchSummary => f.write_str("batch summary row"),
        }
    }
}

#[derive(Debug, Error)]
pub enum CheckerError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Messaging error: {0}")]
    Messaging(#[from] MessagingError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// A store write of a commit failed; the batch may be partially visible
    #[error("Commit of batch {batch_id} failed writing {stage}: {source}\n{trace}")]
    CommitFailed {
        batch_id: String,
        stage: CommitStage,
        source: StoreError,
        trace: String,
    },

    #[error("Worker {worker} panicked: {message}")]
    WorkerPanicked { worker: String, message: String },
}

impl CheckerError {
    /// Wrap a failed commit write, capturing where it happened
    pub fn commit_failed(batch_id: impl Into<String>, stage: CommitStage, source: StoreError) -> Self {
        Self::CommitFailed {
            batch_id: batch_id.into(),
            stage,
            source,
            trace: Backtrace::force_capture().to_string(),
        }
    }

    /// Whether the error must end the check loop instead of the current cycle
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CheckerError::CommitFailed { .. }
                | CheckerError::Configuration(_)
                | CheckerError::WorkerPanicked { .. }
        )
    }
}

pub type CheckerResult<T> = Result<T, CheckerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_failures_are_fatal() {
        let err = CheckerError::commit_failed(
            "index_update_x_2026-10-16_1-ec1-1.5",
            CommitStage::BatchSummary,
            StoreError::write("update_infos", "unavailable"),
        );
        assert!(err.is_fatal());
        let display = err.to_string();
        assert!(display.contains("batch summary row"));
        assert!(display.contains("update_infos"));
    }

    #[test]
    fn test_read_failures_are_not_fatal() {
        let err: CheckerError = StoreError::read("sha1_infos", "timeout").into();
        assert!(!err.is_fatal());

        let err: CheckerError = MessagingError::timeout("receive", 100).into();
        assert!(!err.is_fatal());
    }
}
