//! # Batch Identifiers
//!
//! A batch identifier combines three parts so it stays unique across workers,
//! restarts and days without any distributed lock:
//!
//! 1. a store-issued sequence, monotonic per pipeline fingerprint and day
//! 2. the discriminator of the worker instance that assembled the batch
//! 3. the wall-clock time of assembly, to the microsecond
//!
//! The parts stay typed until the identifier crosses the store or stream
//! boundary, where it is rendered as
//! `index_update_<fingerprint>_<YYYY-MM-DD>_<counter>-<worker>-<seconds>.<micros>`.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use super::types::PipelineFingerprint;
use crate::store::{ColumnStore, StoreResult};

const SEQUENCE_PREFIX: &str = "index_update_";
const DAY_FORMAT: &str = "%Y-%m-%d";

/// Store-issued part of a batch identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UpdateSequence {
    pub scope: String,
    pub day: NaiveDate,
    pub counter: u64,
}

impl fmt::Display for UpdateSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{SEQUENCE_PREFIX}{}_{}_{}",
            self.scope,
            self.day.format(DAY_FORMAT),
            self.counter
        )
    }
}

/// Identifies one worker instance inside batch identifiers
///
/// Never contains `-` or `_`, which delimit the identifier parts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WorkerDiscriminator(String);

impl WorkerDiscriminator {
    pub fn new(value: impl Into<String>) -> Result<Self, BatchIdParseError> {
        let value = value.into();
        if value.is_empty() || value.contains(['-', '_']) {
            return Err(BatchIdParseError::new(
                &value,
                "worker discriminator must be non-empty without '-' or '_'",
            ));
        }
        Ok(Self(value))
    }

    /// `ec<pid>`, plus `w<slot>` for supervised workers
    pub fn for_process(slot: Option<usize>) -> Self {
        let pid = std::process::id();
        match slot {
            Some(slot) => Self(format!("ec{pid}w{slot}")),
            None => Self(format!("ec{pid}")),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerDiscriminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for WorkerDiscriminator {
    type Error = BatchIdParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<WorkerDiscriminator> for String {
    fn from(value: WorkerDiscriminator) -> Self {
        value.0
    }
}

/// Globally unique identifier of one committed batch
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BatchIdentifier {
    pub sequence: UpdateSequence,
    pub worker: WorkerDiscriminator,
    pub created_at: DateTime<Utc>,
}

impl fmt::Display for BatchIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{}.{:06}",
            self.sequence,
            self.worker,
            self.created_at.timestamp(),
            self.created_at.timestamp_subsec_micros()
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid batch identifier '{value}': {reason}")]
pub struct BatchIdParseError {
    value: String,
    reason: String,
}

impl BatchIdParseError {
    fn new(value: &str, reason: impl Into<String>) -> Self {
        Self {
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

impl FromStr for BatchIdentifier {
    type Err = BatchIdParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let mut parts = value.rsplitn(3, '-');
        let (Some(timestamp), Some(worker), Some(sequence)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(BatchIdParseError::new(value, "expected three '-' separated parts"));
        };

        let sequence = sequence
            .strip_prefix(SEQUENCE_PREFIX)
            .ok_or_else(|| BatchIdParseError::new(value, "missing sequence prefix"))?;
        let mut sequence_parts = sequence.rsplitn(3, '_');
        let (Some(counter), Some(day), Some(scope)) = (
            sequence_parts.next(),
            sequence_parts.next(),
            sequence_parts.next(),
        ) else {
            return Err(BatchIdParseError::new(value, "malformed sequence part"));
        };

        let counter = counter
            .parse::<u64>()
            .map_err(|e| BatchIdParseError::new(value, format!("counter: {e}")))?;
        let day = NaiveDate::parse_from_str(day, DAY_FORMAT)
            .map_err(|e| BatchIdParseError::new(value, format!("day: {e}")))?;

        let (seconds, micros) = timestamp
            .split_once('.')
            .ok_or_else(|| BatchIdParseError::new(value, "timestamp without fraction"))?;
        let seconds = seconds
            .parse::<i64>()
            .map_err(|e| BatchIdParseError::new(value, format!("timestamp: {e}")))?;
        let micros = micros
            .parse::<u32>()
            .map_err(|e| BatchIdParseError::new(value, format!("timestamp: {e}")))?;
        let created_at = DateTime::from_timestamp(seconds, micros * 1_000)
            .ok_or_else(|| BatchIdParseError::new(value, "timestamp out of range"))?;

        Ok(Self {
            sequence: UpdateSequence {
                scope: scope.to_string(),
                day,
                counter,
            },
            worker: WorkerDiscriminator::new(worker)?,
            created_at,
        })
    }
}

/// Issues identifiers for one worker instance
#[derive(Clone)]
pub struct BatchIdGenerator {
    store: Arc<dyn ColumnStore>,
    scope: String,
    worker: WorkerDiscriminator,
}

impl fmt::Debug for BatchIdGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchIdGenerator")
            .field("backend", &self.store.backend_name())
            .field("scope", &self.scope)
            .field("worker", &self.worker)
            .finish()
    }
}

impl BatchIdGenerator {
    pub fn new(
        store: Arc<dyn ColumnStore>,
        fingerprint: &PipelineFingerprint,
        worker: WorkerDiscriminator,
    ) -> Self {
        Self {
            store,
            scope: fingerprint.to_string(),
            worker,
        }
    }

    pub fn worker(&self) -> &WorkerDiscriminator {
        &self.worker
    }

    /// Allocate the next identifier, consuming one store sequence value
    pub async fn next_identifier(&self) -> StoreResult<BatchIdentifier> {
        let day = Utc::now().date_naive();
        let counter = self.store.next_update_sequence(&self.scope, day).await?;
        Ok(BatchIdentifier {
            sequence: UpdateSequence {
                scope: self.scope.clone(),
                day,
                counter,
            },
            worker: self.worker.clone(),
            created_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryColumnStore;
    use chrono::TimeZone;

    fn sample() -> BatchIdentifier {
        BatchIdentifier {
            sequence: UpdateSequence {
                scope: "sbpycaffeimg_feat_full_image".to_string(),
                day: NaiveDate::from_ymd_opt(2026, 10, 16).unwrap(),
                counter: 42,
            },
            worker: WorkerDiscriminator::new("ec311w2").unwrap(),
            created_at: Utc.timestamp_opt(1_792_108_800, 123_456_000).unwrap(),
        }
    }

    #[test]
    fn test_render_at_store_boundary() {
        assert_eq!(
            sample().to_string(),
            "index_update_sbpycaffeimg_feat_full_image_2026-10-16_42-ec311w2-1792108800.123456"
        );
    }

    #[test]
    fn test_parse_rendered_identifier() {
        let rendered = sample().to_string();
        let parsed: BatchIdentifier = rendered.parse().unwrap();
        assert_eq!(parsed, sample());
    }

    #[test]
    fn test_parse_rejects_malformed_identifiers() {
        assert!("index_update_x".parse::<BatchIdentifier>().is_err());
        assert!("update_x_2026-10-16_1-ec1-1.5".parse::<BatchIdentifier>().is_err());
        assert!("index_update_x_2026-10-16_one-ec1-1.5"
            .parse::<BatchIdentifier>()
            .is_err());
    }

    #[test]
    fn test_discriminator_rejects_delimiters() {
        assert!(WorkerDiscriminator::new("ec1-2").is_err());
        assert!(WorkerDiscriminator::new("ec_1").is_err());
        assert!(WorkerDiscriminator::new("").is_err());
        assert!(WorkerDiscriminator::for_process(Some(3))
            .as_str()
            .ends_with("w3"));
    }

    #[tokio::test]
    async fn test_generator_consumes_store_sequence() {
        let store: Arc<dyn ColumnStore> = Arc::new(InMemoryColumnStore::new());
        let fingerprint = PipelineFingerprint::new("sbpycaffeimg", "full", "image");
        let generator = BatchIdGenerator::new(
            store,
            &fingerprint,
            WorkerDiscriminator::new("ec1").unwrap(),
        );

        let first = generator.next_identifier().await.unwrap();
        let second = generator.next_identifier().await.unwrap();
        assert_eq!(first.sequence.counter + 1, second.sequence.counter);
        assert_ne!(first.to_string(), second.to_string());
    }
}
