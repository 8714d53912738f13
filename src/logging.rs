//! # Structured Logging Module
//!
//! Environment-aware structured logging: a console layer always, plus a JSON
//! file layer under `log/` when file output is requested.

use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Where log lines go besides the console
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogOutput {
    ConsoleOnly,
    ConsoleAndFile { directory: PathBuf },
}

/// Initialize structured logging once per process
///
/// `RUST_LOG` overrides the environment's default level. Calling this again,
/// or after another subscriber was installed, is a no-op.
pub fn init_structured_logging(output: LogOutput) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let log_level = get_log_level(&environment);

        let console = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_level(true)
            .with_filter(env_filter(&log_level));

        let (file_layer, guard, log_path) = match &output {
            LogOutput::ConsoleOnly => (None, None, None),
            LogOutput::ConsoleAndFile { directory } => match open_log_file(directory, &environment)
            {
                Ok((appender, path)) => {
                    let (writer, guard) = tracing_appender::non_blocking(appender);
                    let layer = fmt::layer()
                        .with_writer(writer)
                        .with_target(true)
                        .with_thread_ids(true)
                        .with_ansi(false)
                        .json()
                        .with_filter(env_filter(&log_level));
                    (Some(layer), Some(guard), Some(path))
                }
                Err(e) => {
                    eprintln!("Could not create log directory {}: {e}", directory.display());
                    (None, None, None)
                }
            },
        };

        if tracing_subscriber::registry()
            .with(console)
            .with(file_layer)
            .try_init()
            .is_err()
        {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
        }

        tracing::info!(
            pid = process::id(),
            environment = %environment,
            log_file = ?log_path.as_ref().map(|p: &PathBuf| p.display().to_string()),
            "🔧 STRUCTURED LOGGING: Initialized"
        );

        // The file writer must outlive every log call
        if let Some(guard) = guard {
            std::mem::forget(guard);
        }
    });
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

fn open_log_file(
    directory: &Path,
    environment: &str,
) -> std::io::Result<(tracing_appender::rolling::RollingFileAppender, PathBuf)> {
    fs::create_dir_all(directory)?;
    let file_name = format!(
        "{}.{}.{}.log",
        environment,
        process::id(),
        Utc::now().format("%Y%m%d_%H%M%S")
    );
    let path = directory.join(&file_name);
    Ok((tracing_appender::rolling::never(directory, file_name), path))
}

/// Current environment from environment variables
fn get_environment() -> String {
    std::env::var("EXTRACTION_CHECKER_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

fn get_log_level(environment: &str) -> String {
    match environment {
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}
