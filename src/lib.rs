#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Extraction Checker
//!
//! Claims unprocessed items for one feature-extraction pipeline and hands them
//! to the extraction workers in bounded, uniquely identified batches.
//!
//! ## Overview
//!
//! Item notifications arrive on a stream. Each worker stages the notified
//! item's info, drops items some worker already claimed for this pipeline and
//! accumulates the rest. Once enough items are pending, or enough time passed
//! since the last batch, it writes a batch marker on every item row, a summary
//! row for the batch and optionally announces the batch on an updates topic.
//!
//! ## Module Organization
//!
//! - [`checker`] - Check loop, dedup filter, batch assembly and commit
//! - [`store`] - Column store trait with in-memory and PostgreSQL backends
//! - [`messaging`] - Notification source and update publisher (in-memory, pgmq)
//! - [`supervisor`] - Worker pool with restart backoff
//! - [`bootstrap`] - Wiring collaborators from configuration
//! - [`config`] - File and environment configuration
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use extraction_checker::bootstrap::CheckerContext;
//! use extraction_checker::checker::{AssemblyMode, CheckLoop, WorkerDiscriminator};
//! use extraction_checker::config::{CheckerConfig, CheckerSettings};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = CheckerSettings::new("sbpycaffeimg", "full", "image");
//! let context = CheckerContext::connect(Arc::new(CheckerConfig::in_memory(settings))).await?;
//! let mut check_loop = CheckLoop::new(
//!     &context,
//!     WorkerDiscriminator::for_process(None),
//!     AssemblyMode::Single,
//! );
//! check_loop.run_cycle().await?;
//! # Ok(())
//! # }
//! ```

pub mod bootstrap;
pub mod checker;
pub mod config;
pub mod error;
pub mod logging;
pub mod messaging;
pub mod store;
pub mod supervisor;

pub use bootstrap::CheckerContext;
pub use checker::{CheckLoop, ItemKey, PipelineFingerprint};
pub use config::{CheckerConfig, ConfigManager};
pub use error::{CheckerError, CheckerResult};
pub use supervisor::{CheckLoopFactory, RestartPolicy, WorkerSupervisor};
