//! # Check Loop
//!
//! One worker's accumulate, check and commit cycle:
//!
//! ```text
//! Intaking -> Filtering -> (threshold not met) -> Intaking
//!                       -> Assembling -> Committing -> Intaking
//! ```
//!
//! Intake reads notifications until a batch worth of keys is gathered or the
//! stream read times out. Only the freshly gathered keys go through the dedup
//! filter; unclaimed ones join the candidate set. A batch of at most
//! `batch_update_size` candidates is committed once the candidate set is full or
//! `max_delay` has passed since the last commit.
//!
//! Errors inside a cycle are logged and the loop carries on, except a failed
//! store write during a commit, which ends [`CheckLoop::run`]. The candidate set
//! and staged info live only in this loop; a restarted worker starts empty and
//! relies on the store's claimed markers.

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::batch_assembler::BatchAssembler;
use super::batch_id::{BatchIdGenerator, WorkerDiscriminator};
use super::candidates::CandidateSet;
use super::committer::{CommitReceipt, Committer};
use super::dedup_filter::DedupFilter;
use super::pending_cache::PendingInfoCache;
use super::types::{AssemblyMode, ItemKey, PendingInfoRecord};
use crate::bootstrap::CheckerContext;
use crate::error::CheckerResult;
use crate::messaging::{Notification, NotificationSource, RawNotification};
use crate::supervisor::Worker;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckPhase {
    Intaking,
    Filtering,
    Assembling,
    Committing,
}

/// Thresholds copied out of the checker settings
#[derive(Debug, Clone)]
struct LoopLimits {
    batch_update_size: usize,
    max_delay: Duration,
    read_timeout: Duration,
    read_batch_size: usize,
    status_interval: Duration,
}

/// Running counters, reported in progress lines
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckLoopStats {
    pub items_checked: u64,
    pub items_unprocessed: u64,
    pub items_pushed: u64,
    pub batches_committed: u64,
    pub notifications_skipped: u64,
}

/// What one cycle did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub gathered: usize,
    pub unclaimed: usize,
    pub committed: Option<CommitReceipt>,
}

pub struct CheckLoop {
    worker_name: String,
    source: Arc<dyn NotificationSource>,
    dedup: DedupFilter,
    assembler: BatchAssembler,
    committer: Committer,
    limits: LoopLimits,
    cache: PendingInfoCache,
    candidates: CandidateSet,
    /// Keys whose dedup query failed, checked again next cycle
    unchecked: Vec<ItemKey>,
    phase: CheckPhase,
    last_commit: Instant,
    last_status: Instant,
    last_reported_unprocessed: u64,
    stats: CheckLoopStats,
}

impl fmt::Debug for CheckLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckLoop")
            .field("worker_name", &self.worker_name)
            .field("phase", &self.phase)
            .field("candidates", &self.candidates.len())
            .field("staged", &self.cache.len())
            .field("stats", &self.stats)
            .finish()
    }
}

impl CheckLoop {
    pub fn new(context: &CheckerContext, worker: WorkerDiscriminator, mode: AssemblyMode) -> Self {
        let settings = &context.config.checker;
        let layout = &context.config.store.layout;
        let fingerprint = settings.fingerprint();
        let worker_name = fingerprint.pretty_name(Some(worker.as_str()));

        let id_generator = BatchIdGenerator::new(context.store.clone(), &fingerprint, worker);
        let now = Instant::now();

        info!(worker = %worker_name, mode = ?mode, "Creating check loop");

        Self {
            source: context.source.clone(),
            dedup: DedupFilter::new(context.store.clone(), layout, &fingerprint),
            assembler: BatchAssembler::new(id_generator, layout.clone(), &fingerprint, mode),
            committer: Committer::new(
                context.store.clone(),
                layout.clone(),
                context.announcer.clone(),
            ),
            limits: LoopLimits {
                batch_update_size: settings.batch_update_size,
                max_delay: settings.max_delay(),
                read_timeout: settings.read_timeout(),
                read_batch_size: settings.read_batch_size,
                status_interval: settings.status_interval(),
            },
            worker_name,
            cache: PendingInfoCache::new(),
            candidates: CandidateSet::new(),
            unchecked: Vec::new(),
            phase: CheckPhase::Intaking,
            last_commit: now,
            last_status: now,
            last_reported_unprocessed: 0,
            stats: CheckLoopStats::default(),
        }
    }

    pub fn worker_name(&self) -> &str {
        &self.worker_name
    }

    pub fn phase(&self) -> CheckPhase {
        self.phase
    }

    pub fn stats(&self) -> &CheckLoopStats {
        &self.stats
    }

    pub fn candidates(&self) -> &CandidateSet {
        &self.candidates
    }

    pub fn pending_cache(&self) -> &PendingInfoCache {
        &self.cache
    }

    fn enter(&mut self, phase: CheckPhase) {
        debug!(worker = %self.worker_name, from = ?self.phase, to = ?phase, "Check loop phase");
        self.phase = phase;
    }

    /// Run one intake, filter and (maybe) commit cycle
    pub async fn run_cycle(&mut self) -> CheckerResult<CycleReport> {
        self.enter(CheckPhase::Intaking);
        let gathered = self.intake().await;
        let mut report = CycleReport {
            gathered: gathered.len(),
            ..CycleReport::default()
        };

        self.enter(CheckPhase::Filtering);
        report.unclaimed = self.filter(gathered).await;
        self.report_progress();

        let now = Instant::now();
        let full_batch = self.candidates.len() >= self.limits.batch_update_size;
        let delay_elapsed = now.duration_since(self.last_commit) > self.limits.max_delay;

        if full_batch || (delay_elapsed && !self.candidates.is_empty()) {
            report.committed = self.commit_pending().await?;
        }

        self.enter(CheckPhase::Intaking);
        Ok(report)
    }

    /// Read notifications until a batch of keys is gathered or the read times out
    async fn intake(&mut self) -> Vec<ItemKey> {
        let mut gathered = Vec::new();

        while gathered.len() < self.limits.batch_update_size {
            let messages = match self
                .source
                .receive(self.limits.read_batch_size, self.limits.read_timeout)
                .await
            {
                Ok(messages) if messages.is_empty() => {
                    debug!(worker = %self.worker_name, gathered = gathered.len(), "Stream read timed out");
                    break;
                }
                Ok(messages) => messages,
                Err(e) if e.is_timeout() => {
                    debug!(worker = %self.worker_name, error = %e, "Stream read timed out");
                    break;
                }
                Err(e) => {
                    warn!(
                        worker = %self.worker_name,
                        error = %e,
                        gathered = gathered.len(),
                        "Caught error in consumer loop"
                    );
                    // A failed read returns at once; wait as a timed-out read would
                    tokio::time::sleep(self.limits.read_timeout).await;
                    break;
                }
            };

            for message in messages {
                self.ingest(message, &mut gathered);
            }
        }

        gathered
    }

    /// Stage one notification's keys and info
    fn ingest(&mut self, message: RawNotification, gathered: &mut Vec<ItemKey>) {
        match Notification::parse(&message.payload) {
            Ok(Notification::Single { key, info }) => {
                self.cache.stage(key.clone(), info);
                gathered.push(key);
            }
            Ok(Notification::Aggregate { keys }) => {
                for key in keys {
                    self.cache.stage(key.clone(), PendingInfoRecord::new());
                    gathered.push(key);
                }
            }
            Ok(Notification::Unknown { fields }) => {
                self.stats.notifications_skipped += 1;
                warn!(
                    worker = %self.worker_name,
                    message_id = ?message.message_id,
                    fields = ?fields,
                    "Unknown keys in notification"
                );
            }
            Err(e) => {
                self.stats.notifications_skipped += 1;
                warn!(
                    worker = %self.worker_name,
                    message_id = ?message.message_id,
                    error = %e,
                    "Skipping malformed notification"
                );
            }
        }
    }

    /// Dedup-check `fresh` plus any keys left unchecked; returns the unclaimed count
    async fn filter(&mut self, fresh: Vec<ItemKey>) -> usize {
        self.stats.items_checked += fresh.len() as u64;

        let mut keys = std::mem::take(&mut self.unchecked);
        keys.extend(fresh);
        if keys.is_empty() {
            return 0;
        }

        match self.dedup.check(&keys, &mut self.cache).await {
            Ok(outcome) => {
                // Candidates and staged info leave together
                self.candidates.remove_all(&outcome.claimed);
                let unclaimed = outcome.unclaimed.len();
                self.candidates.extend(outcome.unclaimed);
                unclaimed
            }
            Err(e) => {
                warn!(
                    worker = %self.worker_name,
                    error = %e,
                    keys = keys.len(),
                    "Dedup check failed, keys will be checked again next cycle"
                );
                self.unchecked = keys;
                0
            }
        }
    }

    /// Assemble and commit one batch from the oldest candidates
    async fn commit_pending(&mut self) -> CheckerResult<Option<CommitReceipt>> {
        let keys = self.candidates.peek_batch(self.limits.batch_update_size);
        if keys.is_empty() {
            return Ok(None);
        }

        self.enter(CheckPhase::Assembling);
        let batch = self.assembler.assemble(&keys, &self.cache).await?;

        let receipt = if batch.is_empty() {
            info!(
                worker = %self.worker_name,
                batch_id = %batch.identifier,
                "Nothing to push for update"
            );
            None
        } else {
            self.enter(CheckPhase::Committing);
            info!(
                worker = %self.worker_name,
                batch_id = %batch.identifier,
                items = batch.len(),
                "Pushing update"
            );
            let receipt = match self.committer.commit(&batch).await {
                Ok(receipt) => receipt,
                Err(e) => {
                    error!(worker = %self.worker_name, error = %e, "Commit failed");
                    return Err(e);
                }
            };
            self.stats.items_pushed += receipt.items as u64;
            self.stats.batches_committed += 1;
            Some(receipt)
        };

        self.candidates.remove_all(&keys);
        self.cache.remove_all(&keys);
        self.last_commit = Instant::now();
        Ok(receipt)
    }

    fn report_progress(&mut self) {
        self.stats.items_unprocessed = self.stats.items_pushed + self.candidates.len() as u64;
        let now = Instant::now();
        if now.duration_since(self.last_status) <= self.limits.status_interval
            || self.stats.items_unprocessed == self.last_reported_unprocessed
        {
            return;
        }

        info!(
            worker = %self.worker_name,
            unprocessed = self.stats.items_unprocessed,
            checked = self.stats.items_checked,
            "Found {}/{} unprocessed items",
            self.stats.items_unprocessed,
            self.stats.items_checked
        );
        self.last_reported_unprocessed = self.stats.items_unprocessed;
        self.last_status = now;
    }

    /// Cycle until a fatal error
    pub async fn run(&mut self) -> CheckerResult<()> {
        info!(worker = %self.worker_name, "Check loop started");
        loop {
            match self.run_cycle().await {
                Ok(_) => {}
                Err(e) if e.is_fatal() => {
                    error!(worker = %self.worker_name, error = %e, "Check loop stopping");
                    return Err(e);
                }
                Err(e) => {
                    warn!(worker = %self.worker_name, error = %e, "Check cycle failed, continuing");
                }
            }
        }
    }
}

#[async_trait]
impl Worker for CheckLoop {
    async fn run(&mut self) -> CheckerResult<()> {
        CheckLoop::run(self).await
    }

    fn name(&self) -> &str {
        &self.worker_name
    }
}
