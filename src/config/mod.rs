//! # Extraction Checker Configuration
//!
//! Configuration for one checker process: the extraction-pipeline identity, the
//! batching thresholds, and the connection settings of the store and stream
//! collaborators.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use extraction_checker::config::ConfigManager;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load(Path::new("config/checker.toml"), "EXTR")?;
//! let fingerprint = manager.config().checker.fingerprint();
//! println!("checking items for {fingerprint}");
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::{ConfigManager, DEFAULT_ENV_PREFIX};

use crate::checker::types::PipelineFingerprint;
use crate::store::StoreLayout;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CheckerConfig {
    /// Pipeline identity and batching behaviour
    pub checker: CheckerSettings,

    /// Persisted column store connection and layout
    #[serde(default)]
    pub store: StoreConfig,

    /// Inbound notification stream and outbound update topic
    #[serde(default)]
    pub stream: StreamConfig,
}

/// Pipeline identity and batching thresholds
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CheckerSettings {
    #[serde(default)]
    pub featurizer_type: String,
    #[serde(default)]
    pub detector_type: String,
    #[serde(default)]
    pub input_type: String,

    /// Seconds without a commit before pending items are flushed regardless of count
    #[serde(default = "default_max_delay_seconds")]
    pub max_delay_seconds: u64,

    /// Maximum number of items per committed batch
    #[serde(default = "default_batch_update_size")]
    pub batch_update_size: usize,

    /// Stream read timeout ending one intake round
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Messages requested per stream read
    #[serde(default = "default_read_batch_size")]
    pub read_batch_size: usize,

    /// Interval between progress lines, `max_delay / 60` when unset
    #[serde(default)]
    pub status_interval_seconds: Option<u64>,

    /// Worker restart backoff is `10 x deaths x unit`
    #[serde(default = "default_restart_backoff_unit_ms")]
    pub restart_backoff_unit_ms: u64,
}

fn default_max_delay_seconds() -> u64 {
    3600
}

fn default_batch_update_size() -> usize {
    1000
}

fn default_read_timeout_ms() -> u64 {
    10_000
}

fn default_read_batch_size() -> usize {
    100
}

fn default_restart_backoff_unit_ms() -> u64 {
    1000
}

impl CheckerSettings {
    /// Settings for a pipeline with every optional value at its default
    pub fn new(
        featurizer_type: impl Into<String>,
        detector_type: impl Into<String>,
        input_type: impl Into<String>,
    ) -> Self {
        Self {
            featurizer_type: featurizer_type.into(),
            detector_type: detector_type.into(),
            input_type: input_type.into(),
            max_delay_seconds: default_max_delay_seconds(),
            batch_update_size: default_batch_update_size(),
            read_timeout_ms: default_read_timeout_ms(),
            read_batch_size: default_read_batch_size(),
            status_interval_seconds: None,
            restart_backoff_unit_ms: default_restart_backoff_unit_ms(),
        }
    }

    pub fn fingerprint(&self) -> PipelineFingerprint {
        PipelineFingerprint::new(&self.featurizer_type, &self.detector_type, &self.input_type)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_secs(self.max_delay_seconds)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn status_interval(&self) -> Duration {
        match self.status_interval_seconds {
            Some(seconds) => Duration::from_secs(seconds),
            None => self.max_delay() / 60,
        }
    }

    pub fn restart_backoff_unit(&self) -> Duration {
        Duration::from_millis(self.restart_backoff_unit_ms)
    }

    fn validate(&self) -> ConfigResult<()> {
        for (field, value) in [
            ("featurizer_type", &self.featurizer_type),
            ("detector_type", &self.detector_type),
            ("input_type", &self.input_type),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigurationError::missing_required_field(
                    field, "checker",
                ));
            }
        }

        if self.batch_update_size == 0 {
            return Err(ConfigurationError::invalid_value(
                "batch_update_size",
                "0",
                "batches must hold at least one item",
            ));
        }

        if self.read_batch_size == 0 {
            return Err(ConfigurationError::invalid_value(
                "read_batch_size",
                "0",
                "stream reads must request at least one message",
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Postgres,
}

/// Persisted column store settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default)]
    pub layout: StoreLayout,
}

fn default_max_connections() -> u32 {
    5
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            database_url: None,
            max_connections: default_max_connections(),
            layout: StoreLayout::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamBackend {
    #[default]
    Memory,
    Pgmq,
}

/// Inbound notification stream and optional outbound announcement topic
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StreamConfig {
    #[serde(default)]
    pub backend: StreamBackend,
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default = "default_consumer_queue")]
    pub consumer_queue: String,
    /// When unset, batches are visible through the store only
    #[serde(default)]
    pub updates_out_topic: Option<String>,
    #[serde(default = "default_visibility_timeout_seconds")]
    pub visibility_timeout_seconds: i32,
}

fn default_consumer_queue() -> String {
    "images_ready".to_string()
}

fn default_visibility_timeout_seconds() -> i32 {
    30
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            backend: StreamBackend::default(),
            database_url: None,
            consumer_queue: default_consumer_queue(),
            updates_out_topic: None,
            visibility_timeout_seconds: default_visibility_timeout_seconds(),
        }
    }
}

impl CheckerConfig {
    /// In-memory collaborators with default layout, used by tests and local runs
    pub fn in_memory(checker: CheckerSettings) -> Self {
        Self {
            checker,
            store: StoreConfig::default(),
            stream: StreamConfig::default(),
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        self.checker.validate()?;

        if self.store.backend == StoreBackend::Postgres && self.store.database_url.is_none() {
            return Err(ConfigurationError::missing_required_field(
                "database_url",
                "store (postgres backend)",
            ));
        }

        if self.stream.backend == StreamBackend::Pgmq && self.stream.database_url.is_none() {
            return Err(ConfigurationError::missing_required_field(
                "database_url",
                "stream (pgmq backend)",
            ));
        }

        if self.stream.consumer_queue.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "consumer_queue",
                "stream",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_follow_pipeline_settings() {
        let settings = CheckerSettings::new("sbpycaffeimg", "dlibface", "face");
        assert_eq!(settings.max_delay(), Duration::from_secs(3600));
        assert_eq!(settings.status_interval(), Duration::from_secs(60));
        assert_eq!(settings.batch_update_size, 1000);
        assert_eq!(
            settings.fingerprint().to_string(),
            "sbpycaffeimg_feat_dlibface_face"
        );
    }

    #[test]
    fn test_missing_pipeline_identity_is_rejected() {
        let config = CheckerConfig::in_memory(CheckerSettings::new("sbpycaffeimg", "", "face"));
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::MissingRequiredField { ref field, .. } if field == "detector_type"
        ));
    }

    #[test]
    fn test_postgres_backend_requires_url() {
        let mut config =
            CheckerConfig::in_memory(CheckerSettings::new("sbpycaffeimg", "full", "image"));
        config.store.backend = StoreBackend::Postgres;
        assert!(config.validate().is_err());

        config.store.database_url = Some("postgresql://localhost/extraction".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_batch_size_is_rejected() {
        let mut settings = CheckerSettings::new("sbpycaffeimg", "full", "image");
        settings.batch_update_size = 0;
        let config = CheckerConfig::in_memory(settings);
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidValue { .. })
        ));
    }
}
