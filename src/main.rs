//! # Extraction Checker
//!
//! Command-line entry point. Runs one check loop in the foreground, or a
//! supervised pool of loops in daemon mode.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use extraction_checker::bootstrap::CheckerContext;
use extraction_checker::checker::{AssemblyMode, CheckLoop, WorkerDiscriminator};
use extraction_checker::config::{ConfigManager, DEFAULT_ENV_PREFIX};
use extraction_checker::logging::{init_structured_logging, LogOutput};
use extraction_checker::supervisor::{
    run_with_restarts, CheckLoopFactory, RestartPolicy, WorkerSupervisor,
};

#[derive(Parser, Debug)]
#[command(name = "extraction-checker")]
#[command(about = "Claim unprocessed items for an extraction pipeline in batches")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(short = 'c', long = "conf")]
    conf: PathBuf,

    /// Prefix of environment variables overriding the configuration file
    #[arg(short = 'p', long = "prefix", default_value = DEFAULT_ENV_PREFIX)]
    prefix: String,

    /// Run a supervised pool of workers that restart when they die
    #[arg(short = 'd', long = "daemon")]
    daemon: bool,

    /// Number of workers in daemon mode
    #[arg(short = 'w', long = "workers", default_value_t = 1)]
    workers: usize,

    /// Also write JSON logs to this directory
    #[arg(long = "log-dir")]
    log_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_structured_logging(match cli.log_dir {
        Some(directory) => LogOutput::ConsoleAndFile { directory },
        None => LogOutput::ConsoleOnly,
    });

    let manager = ConfigManager::load(&cli.conf, &cli.prefix)
        .with_context(|| format!("loading configuration from {}", cli.conf.display()))?;
    let config = std::sync::Arc::new(manager.config().clone());
    let policy = RestartPolicy::new(config.checker.restart_backoff_unit());

    info!(
        conf = %cli.conf.display(),
        fingerprint = %config.checker.fingerprint(),
        daemon = cli.daemon,
        workers = cli.workers,
        config = %manager.debug_config(),
        "Extraction checker starting"
    );

    if cli.daemon {
        WorkerSupervisor::new(CheckLoopFactory::connecting(config), cli.workers, policy)
            .run()
            .await;
    } else {
        let context = CheckerContext::connect(config)
            .await
            .context("connecting store and stream")?;
        let mut check_loop = CheckLoop::new(
            &context,
            WorkerDiscriminator::for_process(None),
            AssemblyMode::Single,
        );
        run_with_restarts(&mut check_loop, policy).await;
    }

    Ok(())
}
