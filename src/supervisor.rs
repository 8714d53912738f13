//! # Worker Supervisor
//!
//! Keeps check loops alive. Each worker slot runs its loop on its own tokio task;
//! when the loop returns an error or panics, the slot counts a death, sleeps
//! `10 × deaths × backoff unit` and starts a fresh loop built by the
//! [`WorkerFactory`]. A fresh loop starts with empty in-memory state and relies
//! on the store's claimed markers to skip items already committed.
//!
//! Slots share nothing but the factory; the death counter of one slot never
//! affects another.
//!
//! Known limitation: slots are tokio tasks inside one process. A worker panic
//! is contained to its slot, but a process abort or an out-of-memory kill stops
//! every slot at once and nothing here restarts them.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::bootstrap::CheckerContext;
use crate::checker::batch_id::WorkerDiscriminator;
use crate::checker::check_loop::CheckLoop;
use crate::checker::types::AssemblyMode;
use crate::config::CheckerConfig;
use crate::error::{CheckerError, CheckerResult};

/// A long-running unit of work that only returns on failure or shutdown
#[async_trait]
pub trait Worker: Send + 'static {
    async fn run(&mut self) -> CheckerResult<()>;

    fn name(&self) -> &str;
}

/// Builds a fresh worker for a slot, on first start and after every death
#[async_trait]
pub trait WorkerFactory: Send + Sync + 'static {
    type Worker: Worker;

    async fn build(&self, slot: usize) -> CheckerResult<Self::Worker>;
}

/// Linear restart delay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPolicy {
    pub unit: Duration,
}

impl RestartPolicy {
    pub fn new(unit: Duration) -> Self {
        Self { unit }
    }

    /// Delay before the restart that follows death number `deaths`
    pub fn backoff(&self, deaths: u64) -> Duration {
        let factor = u32::try_from(deaths.saturating_mul(10)).unwrap_or(u32::MAX);
        self.unit.saturating_mul(factor)
    }
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

/// Builds [`CheckLoop`]s in daemon mode
pub struct CheckLoopFactory {
    config: Arc<CheckerConfig>,
    shared: Option<CheckerContext>,
}

impl CheckLoopFactory {
    /// Reconnect every collaborator for each new loop
    pub fn connecting(config: Arc<CheckerConfig>) -> Self {
        Self {
            config,
            shared: None,
        }
    }

    /// Share already-built collaborators between every loop
    pub fn with_context(context: CheckerContext) -> Self {
        Self {
            config: context.config.clone(),
            shared: Some(context),
        }
    }
}

#[async_trait]
impl WorkerFactory for CheckLoopFactory {
    type Worker = CheckLoop;

    async fn build(&self, slot: usize) -> CheckerResult<CheckLoop> {
        let context = match &self.shared {
            Some(context) => context.clone(),
            None => CheckerContext::connect(self.config.clone()).await?,
        };
        Ok(CheckLoop::new(
            &context,
            WorkerDiscriminator::for_process(Some(slot)),
            AssemblyMode::Daemon,
        ))
    }
}

/// Running worker slots
#[derive(Debug)]
pub struct SupervisorHandle {
    slots: Vec<JoinHandle<()>>,
    deaths: Arc<Vec<AtomicU64>>,
}

impl SupervisorHandle {
    pub fn worker_count(&self) -> usize {
        self.slots.len()
    }

    /// Deaths counted so far by `slot`
    pub fn deaths(&self, slot: usize) -> u64 {
        self.deaths
            .get(slot)
            .map(|deaths| deaths.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Wait until every slot has stopped
    pub async fn join(self) {
        for result in futures::future::join_all(self.slots).await {
            if let Err(e) = result {
                if !e.is_cancelled() {
                    error!(error = %e, "Supervisor slot task failed");
                }
            }
        }
    }

    pub fn abort(&self) {
        for slot in &self.slots {
            slot.abort();
        }
    }
}

pub struct WorkerSupervisor<F: WorkerFactory> {
    factory: Arc<F>,
    workers: usize,
    policy: RestartPolicy,
}

impl<F: WorkerFactory> WorkerSupervisor<F> {
    pub fn new(factory: F, workers: usize, policy: RestartPolicy) -> Self {
        Self {
            factory: Arc::new(factory),
            workers: workers.max(1),
            policy,
        }
    }

    /// Start every slot
    pub fn spawn(self) -> SupervisorHandle {
        let deaths: Arc<Vec<AtomicU64>> =
            Arc::new((0..self.workers).map(|_| AtomicU64::new(0)).collect());

        info!(workers = self.workers, "Starting worker supervisor");

        let slots = (0..self.workers)
            .map(|slot| {
                let factory = self.factory.clone();
                let deaths = deaths.clone();
                let policy = self.policy;
                tokio::spawn(async move { supervise_slot(factory, slot, policy, deaths).await })
            })
            .collect();

        SupervisorHandle { slots, deaths }
    }

    /// Start every slot and wait on them
    pub async fn run(self) {
        self.spawn().join().await;
    }
}

async fn supervise_slot<F: WorkerFactory>(
    factory: Arc<F>,
    slot: usize,
    policy: RestartPolicy,
    deaths: Arc<Vec<AtomicU64>>,
) {
    let mut slot_deaths = 0u64;
    loop {
        let outcome = match factory.build(slot).await {
            Ok(worker) => run_isolated(worker).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => {
                info!(slot = slot, "Worker exited, slot stopping");
                return;
            }
            Err(e) => {
                slot_deaths += 1;
                deaths[slot].store(slot_deaths, Ordering::SeqCst);
                let delay = policy.backoff(slot_deaths);
                error!(
                    slot = slot,
                    deaths = slot_deaths,
                    error = %e,
                    restart_in_ms = delay.as_millis() as u64,
                    "Worker died"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Run `worker` on its own task so a panic surfaces as an error
async fn run_isolated<W: Worker>(mut worker: W) -> CheckerResult<()> {
    let name = worker.name().to_string();
    info!(worker = %name, "Starting worker");
    let task = tokio::spawn(async move { worker.run().await });
    match task.await {
        Ok(result) => result,
        Err(join_error) => Err(CheckerError::WorkerPanicked {
            worker: name,
            message: join_error.to_string(),
        }),
    }
}

/// Non-daemon mode: rerun the same worker after each failure
///
/// The worker keeps its in-memory state across restarts. The first restart is
/// immediate, then each one waits `10 × deaths × backoff unit` longer.
pub async fn run_with_restarts<W: Worker>(worker: &mut W, policy: RestartPolicy) {
    let mut deaths = 0u64;
    loop {
        match worker.run().await {
            Ok(()) => return,
            Err(e) => {
                let delay = policy.backoff(deaths);
                warn!(
                    worker = %worker.name(),
                    deaths = deaths + 1,
                    error = %e,
                    restart_in_ms = delay.as_millis() as u64,
                    "Worker failed, restarting"
                );
                tokio::time::sleep(delay).await;
                deaths += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreError;
    use parking_lot::Mutex;
    use tokio::time::Instant;

    /// Fails `failures` times across all builds, then exits cleanly
    struct FlakyFactory {
        remaining_failures: Arc<AtomicU64>,
        panic_instead: bool,
        starts: Arc<Mutex<Vec<Instant>>>,
    }

    struct FlakyWorker {
        fail: bool,
        panic_instead: bool,
    }

    #[async_trait]
    impl Worker for FlakyWorker {
        async fn run(&mut self) -> CheckerResult<()> {
            if !self.fail {
                return Ok(());
            }
            if self.panic_instead {
                panic!("worker blew up");
            }
            Err(StoreError::write("sha1_infos", "connection reset").into())
        }

        fn name(&self) -> &str {
            "flaky"
        }
    }

    #[async_trait]
    impl WorkerFactory for FlakyFactory {
        type Worker = FlakyWorker;

        async fn build(&self, _slot: usize) -> CheckerResult<FlakyWorker> {
            self.starts.lock().push(Instant::now());
            let fail = self
                .remaining_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            Ok(FlakyWorker {
                fail,
                panic_instead: self.panic_instead,
            })
        }
    }

    fn flaky(failures: u64, panic_instead: bool) -> (FlakyFactory, Arc<Mutex<Vec<Instant>>>) {
        let starts = Arc::new(Mutex::new(Vec::new()));
        (
            FlakyFactory {
                remaining_failures: Arc::new(AtomicU64::new(failures)),
                panic_instead,
                starts: starts.clone(),
            },
            starts,
        )
    }

    #[test]
    fn test_backoff_grows_linearly() {
        let policy = RestartPolicy::new(Duration::from_secs(1));
        assert_eq!(policy.backoff(0), Duration::ZERO);
        assert_eq!(policy.backoff(1), Duration::from_secs(10));
        assert_eq!(policy.backoff(3), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dead_worker_restarts_with_backoff() {
        let (factory, starts) = flaky(2, false);
        let supervisor = WorkerSupervisor::new(factory, 1, RestartPolicy::default());

        let handle = supervisor.spawn();
        let deaths = handle.deaths.clone();
        handle.join().await;

        assert_eq!(deaths[0].load(Ordering::SeqCst), 2);
        let starts = starts.lock();
        assert_eq!(starts.len(), 3);
        assert!(starts[1] - starts[0] >= Duration::from_secs(10));
        assert!(starts[2] - starts[1] >= Duration::from_secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_worker_counts_as_death() {
        let (factory, starts) = flaky(1, true);
        let handle = WorkerSupervisor::new(factory, 1, RestartPolicy::default()).spawn();
        let deaths = handle.deaths.clone();
        handle.join().await;

        assert_eq!(deaths[0].load(Ordering::SeqCst), 1);
        assert_eq!(starts.lock().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_with_restarts_reuses_worker() {
        struct Countdown(u32);

        #[async_trait]
        impl Worker for Countdown {
            async fn run(&mut self) -> CheckerResult<()> {
                if self.0 == 0 {
                    return Ok(());
                }
                self.0 -= 1;
                Err(StoreError::sequence("scope", "unavailable").into())
            }

            fn name(&self) -> &str {
                "countdown"
            }
        }

        let mut worker = Countdown(2);
        let started = Instant::now();
        run_with_restarts(&mut worker, RestartPolicy::default()).await;

        // Restarts wait 0s then 10s
        assert_eq!(worker.0, 0);
        let elapsed = Instant::now() - started;
        assert!(elapsed >= Duration::from_secs(10));
        assert!(elapsed < Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_panic_is_contained_to_its_slot() {
        // Only slot 0 panics; slot 1 keeps running its own worker
        struct PanicsInSlotZero;

        #[async_trait]
        impl WorkerFactory for PanicsInSlotZero {
            type Worker = FlakyWorker;

            async fn build(&self, slot: usize) -> CheckerResult<FlakyWorker> {
                Ok(FlakyWorker {
                    fail: slot == 0,
                    panic_instead: true,
                })
            }
        }

        let handle = WorkerSupervisor::new(PanicsInSlotZero, 2, RestartPolicy::default()).spawn();
        tokio::time::sleep(Duration::from_secs(15)).await;

        assert!(handle.deaths(0) >= 1);
        assert_eq!(handle.deaths(1), 0);
        handle.abort();
    }
}
