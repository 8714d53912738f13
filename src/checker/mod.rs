//! # Checker
//!
//! The per-worker pipeline: staged item info, dedup against claimed markers,
//! batch assembly and the sequential commit, driven by [`CheckLoop`].

pub mod batch_assembler;
pub mod batch_id;
pub mod candidates;
pub mod check_loop;
pub mod committer;
pub mod dedup_filter;
pub mod pending_cache;
pub mod types;

pub use batch_assembler::{AssembledBatch, BatchAssembler};
pub use batch_id::{BatchIdGenerator, BatchIdParseError, BatchIdentifier, UpdateSequence, WorkerDiscriminator};
pub use candidates::CandidateSet;
pub use check_loop::{CheckLoop, CheckLoopStats, CheckPhase, CycleReport};
pub use committer::{Announcer, CommitReceipt, Committer, CREATED_FORMAT};
pub use dedup_filter::{DedupFilter, DedupOutcome};
pub use pending_cache::PendingInfoCache;
pub use types::{AssemblyMode, ItemKey, PendingInfoRecord, PipelineFingerprint};
