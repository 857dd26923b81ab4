//! # Settlement Scheduler
//!
//! The long-running control loop that decides *when* to settle.
//!
//! ## How it works
//!
//! Each cycle:
//!
//! 1. Ask the target how many actions are pending.
//! 2. If none, do nothing and keep the retry counter as it is.
//! 3. If `pending >= min_actions_to_settle` or
//!    `counter >= max_retries_before_settle`, settle once. Success resets
//!    the counter to zero.
//! 4. Otherwise bump the counter.
//! 5. Sleep `retry_wait` and go again.
//!
//! Any error in steps 1 or 3 is logged and the counter is left unchanged.
//! The loop never exits on a failed cycle.
//!
//! ## Phases
//!
//! `Idle → Deciding → Settling → Idle`. Only one cycle runs at a time: a
//! cycle that starts while another is in flight returns
//! [`Decision::Busy`] without touching the target.
//!
//! ## Shutdown
//!
//! The loop watches a `tokio::sync::watch` channel. When it flips to `true`
//! or the sender drops, the loop exits after the current cycle. A cycle
//! is never cancelled mid-proof.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::{DEFAULT_RETRY_WAIT_MS, MAX_RETRIES_BEFORE_SETTLE, MIN_ACTIONS_TO_SETTLE};

use super::proof::SettlementReceipt;

// ---------------------------------------------------------------------------
// SettlementTarget
// ---------------------------------------------------------------------------

/// What the scheduler drives. Implemented by the node over the generator
/// and the settlement contract.
#[async_trait]
pub trait SettlementTarget: Send + Sync {
    /// Current backlog.
    async fn pending_actions(&self) -> anyhow::Result<usize>;

    /// Build a proof for the backlog and submit it. One attempt.
    async fn settle(&self) -> anyhow::Result<SettlementReceipt>;
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Sleep between cycles.
    pub retry_wait: Duration,

    /// Settle as soon as the backlog reaches this size.
    pub min_actions_to_settle: usize,

    /// Settle a small backlog after waiting this many cycles for it to grow.
    pub max_retries_before_settle: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            retry_wait: Duration::from_millis(DEFAULT_RETRY_WAIT_MS),
            min_actions_to_settle: MIN_ACTIONS_TO_SETTLE,
            max_retries_before_settle: MAX_RETRIES_BEFORE_SETTLE,
        }
    }
}

impl SchedulerConfig {
    /// Inclusive on both thresholds. Never settles an empty backlog.
    pub fn should_settle(&self, pending: usize, counter: u32) -> bool {
        pending > 0
            && (pending >= self.min_actions_to_settle || counter >= self.max_retries_before_settle)
    }
}

// ---------------------------------------------------------------------------
// Phase / Decision
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Deciding,
    Settling,
}

impl Phase {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Deciding,
            2 => Self::Settling,
            _ => Self::Idle,
        }
    }
}

/// What a cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Nothing pending.
    Empty,
    /// Backlog below threshold; waiting for it to grow.
    Wait { pending: usize },
    /// Settled.
    Settled(SettlementReceipt),
    /// The cycle failed; will retry.
    Failed(String),
    /// Another cycle was in flight.
    Busy,
}

/// Outcome of one cycle plus the counter for the next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub decision: Decision,
    pub next_counter: u32,
}

// ---------------------------------------------------------------------------
// SettlementScheduler
// ---------------------------------------------------------------------------

/// Clears the in-flight flag and returns to `Idle` when a cycle ends,
/// however it ends.
struct CycleGuard<'a> {
    in_flight: &'a AtomicBool,
    phase: &'a AtomicU8,
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.phase.store(Phase::Idle as u8, Ordering::SeqCst);
        self.in_flight.store(false, Ordering::SeqCst);
    }
}

pub struct SettlementScheduler<T: SettlementTarget + ?Sized> {
    target: Arc<T>,
    config: SchedulerConfig,
    phase: AtomicU8,
    in_flight: AtomicBool,
    counter: AtomicU32,
    settlements: AtomicU64,
}

impl<T: SettlementTarget + ?Sized> SettlementScheduler<T> {
    pub fn new(target: Arc<T>, config: SchedulerConfig) -> Self {
        Self {
            target,
            config,
            phase: AtomicU8::new(Phase::Idle as u8),
            in_flight: AtomicBool::new(false),
            counter: AtomicU32::new(0),
            settlements: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        Phase::from_u8(self.phase.load(Ordering::SeqCst))
    }

    /// Retry counter as of the last completed cycle of [`run`](Self::run).
    pub fn retry_counter(&self) -> u32 {
        self.counter.load(Ordering::SeqCst)
    }

    /// Settlements this scheduler has completed.
    pub fn settlements(&self) -> u64 {
        self.settlements.load(Ordering::SeqCst)
    }

    /// Run one cycle with retry counter `counter`.
    pub async fn run_cycle(&self, counter: u32) -> CycleReport {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return CycleReport {
                decision: Decision::Busy,
                next_counter: counter,
            };
        }
        let _guard = CycleGuard {
            in_flight: &self.in_flight,
            phase: &self.phase,
        };

        self.phase.store(Phase::Deciding as u8, Ordering::SeqCst);
        let pending = match self.target.pending_actions().await {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, counter, "could not read pending actions");
                return CycleReport {
                    decision: Decision::Failed(format!("{:#}", e)),
                    next_counter: counter,
                };
            }
        };

        if pending == 0 {
            debug!(counter, "nothing pending");
            return CycleReport {
                decision: Decision::Empty,
                next_counter: counter,
            };
        }

        if !self.config.should_settle(pending, counter) {
            debug!(pending, counter, "backlog below threshold, waiting");
            return CycleReport {
                decision: Decision::Wait { pending },
                next_counter: counter.saturating_add(1),
            };
        }

        self.phase.store(Phase::Settling as u8, Ordering::SeqCst);
        info!(pending, counter, "settling");
        match self.target.settle().await {
            Ok(receipt) => {
                self.settlements.fetch_add(1, Ordering::SeqCst);
                info!(
                    old_root = %receipt.old_root,
                    new_root = %receipt.new_root,
                    applied = receipt.applied,
                    dropped = receipt.dropped.len(),
                    "settlement accepted"
                );
                CycleReport {
                    decision: Decision::Settled(receipt),
                    next_counter: 0,
                }
            }
            Err(e) => {
                warn!(error = %format!("{:#}", e), pending, counter, "settlement attempt failed");
                CycleReport {
                    decision: Decision::Failed(format!("{:#}", e)),
                    next_counter: counter,
                }
            }
        }
    }

    /// Cycle until `shutdown` flips to `true` or its sender drops.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            retry_wait_ms = self.config.retry_wait.as_millis() as u64,
            min_actions = self.config.min_actions_to_settle,
            max_retries = self.config.max_retries_before_settle,
            "settlement scheduler starting"
        );

        let mut counter = self.retry_counter();
        loop {
            if *shutdown.borrow() {
                break;
            }

            let report = self.run_cycle(counter).await;
            counter = report.next_counter;
            self.counter.store(counter, Ordering::SeqCst);

            tokio::select! {
                _ = tokio::time::sleep(self.config.retry_wait) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(counter, settlements = self.settlements(), "settlement scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::state::StateRoot;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    /// Scripted target: fixed backlog, counts settle calls, optional failure.
    struct Script {
        pending: AtomicUsize,
        fail_pending: AtomicBool,
        fail_settle: AtomicBool,
        settle_calls: AtomicUsize,
        gate: Option<Arc<Notify>>,
    }

    impl Script {
        fn new(pending: usize) -> Self {
            Self {
                pending: AtomicUsize::new(pending),
                fail_pending: AtomicBool::new(false),
                fail_settle: AtomicBool::new(false),
                settle_calls: AtomicUsize::new(0),
                gate: None,
            }
        }

        fn calls(&self) -> usize {
            self.settle_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SettlementTarget for Script {
        async fn pending_actions(&self) -> anyhow::Result<usize> {
            if self.fail_pending.load(Ordering::SeqCst) {
                anyhow::bail!("ledger unreachable");
            }
            Ok(self.pending.load(Ordering::SeqCst))
        }

        async fn settle(&self) -> anyhow::Result<SettlementReceipt> {
            self.settle_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if self.fail_settle.load(Ordering::SeqCst) {
                anyhow::bail!("proof construction failed");
            }
            let applied = self.pending.swap(0, Ordering::SeqCst);
            Ok(SettlementReceipt {
                old_root: StateRoot([0; 32]),
                new_root: StateRoot([1; 32]),
                applied,
                dropped: vec![],
            })
        }
    }

    fn config() -> SchedulerConfig {
        SchedulerConfig {
            retry_wait: Duration::from_millis(100),
            min_actions_to_settle: 6,
            max_retries_before_settle: 3,
        }
    }

    #[test]
    fn thresholds_are_inclusive() {
        let c = config();
        assert!(!c.should_settle(0, 100));
        assert!(!c.should_settle(5, 2));
        assert!(c.should_settle(6, 0));
        assert!(c.should_settle(1, 3));
    }

    #[tokio::test]
    async fn empty_backlog_keeps_counter() {
        let target = Arc::new(Script::new(0));
        let scheduler = SettlementScheduler::new(Arc::clone(&target), config());
        let report = scheduler.run_cycle(2).await;
        assert_eq!(report.decision, Decision::Empty);
        assert_eq!(report.next_counter, 2);
        assert_eq!(target.calls(), 0);
    }

    #[tokio::test]
    async fn small_backlog_increments_counter() {
        let target = Arc::new(Script::new(2));
        let scheduler = SettlementScheduler::new(Arc::clone(&target), config());
        let report = scheduler.run_cycle(0).await;
        assert_eq!(report.decision, Decision::Wait { pending: 2 });
        assert_eq!(report.next_counter, 1);
        assert_eq!(target.calls(), 0);
    }

    #[tokio::test]
    async fn full_backlog_settles_once_and_resets() {
        let target = Arc::new(Script::new(6));
        let scheduler = SettlementScheduler::new(Arc::clone(&target), config());
        let report = scheduler.run_cycle(1).await;
        assert!(matches!(report.decision, Decision::Settled(ref r) if r.applied == 6));
        assert_eq!(report.next_counter, 0);
        assert_eq!(target.calls(), 1);
        assert_eq!(scheduler.settlements(), 1);
        assert_eq!(scheduler.phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn max_retries_forces_settlement() {
        let target = Arc::new(Script::new(1));
        let scheduler = SettlementScheduler::new(Arc::clone(&target), config());
        let report = scheduler.run_cycle(3).await;
        assert!(matches!(report.decision, Decision::Settled(_)));
        assert_eq!(report.next_counter, 0);
        assert_eq!(target.calls(), 1);
    }

    #[tokio::test]
    async fn failed_settle_keeps_counter() {
        let target = Arc::new(Script::new(6));
        target.fail_settle.store(true, Ordering::SeqCst);
        let scheduler = SettlementScheduler::new(Arc::clone(&target), config());
        let report = scheduler.run_cycle(2).await;
        assert!(matches!(report.decision, Decision::Failed(_)));
        assert_eq!(report.next_counter, 2);
        assert_eq!(target.calls(), 1);
        assert_eq!(scheduler.phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn failed_pending_query_keeps_counter() {
        let target = Arc::new(Script::new(6));
        target.fail_pending.store(true, Ordering::SeqCst);
        let scheduler = SettlementScheduler::new(Arc::clone(&target), config());
        let report = scheduler.run_cycle(1).await;
        assert!(matches!(report.decision, Decision::Failed(_)));
        assert_eq!(report.next_counter, 1);
        assert_eq!(target.calls(), 0);
    }

    #[tokio::test]
    async fn concurrent_cycle_is_busy() {
        let gate = Arc::new(Notify::new());
        let mut script = Script::new(6);
        script.gate = Some(Arc::clone(&gate));
        let target = Arc::new(script);
        let scheduler = Arc::new(SettlementScheduler::new(Arc::clone(&target), config()));

        let first = {
            let scheduler = Arc::clone(&scheduler);
            tokio::spawn(async move { scheduler.run_cycle(0).await })
        };
        // Let the first cycle reach settle().
        while target.calls() == 0 {
            tokio::task::yield_now().await;
        }
        assert_eq!(scheduler.phase(), Phase::Settling);

        let second = scheduler.run_cycle(0).await;
        assert_eq!(second.decision, Decision::Busy);

        gate.notify_one();
        let first = first.await.unwrap();
        assert!(matches!(first.decision, Decision::Settled(_)));
        assert_eq!(target.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn run_loop_waits_then_settles() {
        let target = Arc::new(Script::new(1));
        let scheduler = Arc::new(SettlementScheduler::new(Arc::clone(&target), config()));
        let (tx, rx) = watch::channel(false);

        let handle = {
            let scheduler = Arc::clone(&scheduler);
            tokio::spawn(async move { scheduler.run(rx).await })
        };

        // Cycles at t=0,100,200 wait (counter 0→3); t=300 hits max retries.
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(target.calls(), 0);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(target.calls(), 1);
        assert_eq!(scheduler.retry_counter(), 0);

        tx.send(true).unwrap();
        handle.await.unwrap();
        assert_eq!(target.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn run_loop_survives_failures() {
        let target = Arc::new(Script::new(6));
        target.fail_settle.store(true, Ordering::SeqCst);
        let scheduler = Arc::new(SettlementScheduler::new(Arc::clone(&target), config()));
        let (tx, rx) = watch::channel(false);

        let handle = {
            let scheduler = Arc::clone(&scheduler);
            tokio::spawn(async move { scheduler.run(rx).await })
        };

        tokio::time::sleep(Duration::from_millis(350)).await;
        assert!(target.calls() >= 3);
        assert_eq!(scheduler.settlements(), 0);

        target.fail_settle.store(false, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(scheduler.settlements(), 1);

        drop(tx);
        handle.await.unwrap();
    }
}
