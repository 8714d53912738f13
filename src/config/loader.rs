//! Configuration Loader
//!
//! Reads a configuration file (format inferred from its extension) and layers
//! environment overrides of the form `<PREFIX>__<SECTION>__<KEY>` on top.

use super::error::{ConfigResult, ConfigurationError};
use super::CheckerConfig;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Default environment prefix, matching the checker's configuration prefix
pub const DEFAULT_ENV_PREFIX: &str = "EXTR";

/// Loaded and validated checker configuration
#[derive(Debug)]
pub struct ConfigManager {
    config: CheckerConfig,
    source_path: PathBuf,
    env_prefix: String,
}

impl ConfigManager {
    /// Load configuration from `path`, applying environment overrides under `env_prefix`
    pub fn load(path: &Path, env_prefix: &str) -> ConfigResult<Arc<ConfigManager>> {
        if !path.is_file() {
            return Err(ConfigurationError::config_file_not_found(path));
        }

        debug!(
            "Loading checker configuration from {} (env prefix '{}')",
            path.display(),
            env_prefix
        );

        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(
                config::Environment::with_prefix(env_prefix)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigurationError::load_error(path.display().to_string(), e))?;

        let config: CheckerConfig = settings
            .try_deserialize()
            .map_err(|e| ConfigurationError::load_error(path.display().to_string(), e))?;

        Self::from_config(config, path.to_path_buf(), env_prefix)
    }

    /// Wrap an already-built configuration, validating it first
    pub fn from_config(
        config: CheckerConfig,
        source_path: PathBuf,
        env_prefix: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;

        debug!(
            "Configuration loaded successfully: {}",
            serde_json::to_string(&Self::sanitize_config_for_logging(&config))
                .unwrap_or_else(|_| "[serialization error]".to_string())
        );

        info!(
            fingerprint = %config.checker.fingerprint(),
            batch_update_size = config.checker.batch_update_size,
            max_delay_seconds = config.checker.max_delay_seconds,
            updates_out_topic = ?config.stream.updates_out_topic,
            "Checker configuration loaded"
        );

        Ok(Arc::new(ConfigManager {
            config,
            source_path,
            env_prefix: env_prefix.to_string(),
        }))
    }

    pub fn config(&self) -> &CheckerConfig {
        &self.config
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn env_prefix(&self) -> &str {
        &self.env_prefix
    }

    /// Configuration as JSON with connection strings masked
    pub fn debug_config(&self) -> serde_json::Value {
        Self::sanitize_config_for_logging(&self.config)
    }

    fn sanitize_config_for_logging(config: &CheckerConfig) -> serde_json::Value {
        let mut config_json = serde_json::json!(config);
        Self::sanitize_json_recursive(&mut config_json, &["url", "password", "secret"]);
        config_json
    }

    fn sanitize_json_recursive(value: &mut serde_json::Value, sensitive_patterns: &[&str]) {
        match value {
            serde_json::Value::Object(map) => {
                for (key, val) in map.iter_mut() {
                    let key_lower = key.to_lowercase();
                    let is_sensitive = sensitive_patterns
                        .iter()
                        .any(|pattern| key_lower.contains(pattern));

                    if is_sensitive && val.is_string() {
                        *val = serde_json::Value::String("[MASKED]".to_string());
                    } else {
                        Self::sanitize_json_recursive(val, sensitive_patterns);
                    }
                }
            }
            serde_json::Value::Array(items) => {
                for item in items {
                    Self::sanitize_json_recursive(item, sensitive_patterns);
                }
            }
            _ => {}
        }
    }
}
