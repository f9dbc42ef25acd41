#[cfg(test)]
#[path = "scheduler_test.rs"]
mod tests;

use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::SyncController;

/// Active-session poll, in base ticks.
pub const ACTIVE_POLL_EVERY: u64 = 3;
/// Backfill of older pages, in base ticks.
pub const BACKFILL_EVERY: u64 = 6;
/// Activity backfill for completed sessions, in base ticks.
pub const COMPLETED_POLL_EVERY: u64 = 12;
/// Stale-session reconciliation, in base ticks.
pub const RECONCILE_EVERY: u64 = 120;

/// The slice of the sync controller the scheduler drives. Kept as a trait so
/// tick dispatch can be tested without a store or a network.
#[async_trait]
pub trait SyncOps: Send + Sync {
    async fn refresh(&self, bypass_rate_limit: bool);
    async fn load_more_async(&self, bypass_rate_limit: bool);
    async fn poll_completed_activities(&self) -> usize;
    async fn mark_stale_sessions(&self) -> usize;
}

#[async_trait]
impl SyncOps for SyncController {
    async fn refresh(&self, bypass_rate_limit: bool) {
        SyncController::refresh(self, bypass_rate_limit).await;
    }

    async fn load_more_async(&self, bypass_rate_limit: bool) {
        SyncController::load_more_async(self, bypass_rate_limit).await;
    }

    async fn poll_completed_activities(&self) -> usize {
        return SyncController::poll_completed_activities(self).await;
    }

    async fn mark_stale_sessions(&self) -> usize {
        return SyncController::mark_stale_sessions(self).await;
    }
}

struct Worker {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// A single recurring timer that fans out to sync operations at different
/// multiples of the base tick, so there is never more than one polling
/// cadence running. A tick whose async work is still in flight when the next
/// tick fires is skipped, not queued; pausing keeps the tick counter,
/// stopping resets it.
pub struct PollingScheduler {
    ops: Arc<dyn SyncOps>,
    base_interval: Duration,
    warmup_delay: Duration,
    tick_count: Arc<AtomicU64>,
    tick_in_progress: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
    worker: Mutex<Option<Worker>>,
}

impl PollingScheduler {
    pub fn new(
        ops: Arc<dyn SyncOps>,
        base_interval: Duration,
        warmup_delay: Duration,
    ) -> PollingScheduler {
        return PollingScheduler {
            ops,
            base_interval,
            warmup_delay,
            tick_count: Arc::new(AtomicU64::new(0)),
            tick_in_progress: Arc::new(AtomicBool::new(false)),
            paused: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
        };
    }

    pub async fn start_polling(&self) {
        let mut worker = self.worker.lock().await;
        if worker.is_some() {
            return;
        }

        self.tick_count.store(0, Ordering::SeqCst);
        self.tick_in_progress.store(false, Ordering::SeqCst);
        self.paused.store(false, Ordering::SeqCst);

        let token = CancellationToken::new();
        let handle = tokio::spawn(Self::run_loop(
            self.ops.clone(),
            token.clone(),
            self.base_interval,
            self.warmup_delay,
            self.tick_count.clone(),
            self.tick_in_progress.clone(),
            self.paused.clone(),
        ));

        *worker = Some(Worker { token, handle });
        // Let the spawned loop register its interval and warm-up timers before
        // returning, so ticks are anchored at the moment polling started.
        tokio::task::yield_now().await;
        tracing::debug!(interval = ?self.base_interval, "Polling started");
    }

    pub async fn stop_polling(&self) {
        let mut worker = self.worker.lock().await;
        if let Some(worker) = worker.take() {
            worker.token.cancel();
            let _ = worker.handle.await;
        }

        self.tick_count.store(0, Ordering::SeqCst);
        tracing::debug!("Polling stopped");
    }

    /// Suspends tick dispatch without losing the tick counter.
    pub fn pause_polling(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume_polling(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_loop(
        ops: Arc<dyn SyncOps>,
        token: CancellationToken,
        base_interval: Duration,
        warmup_delay: Duration,
        tick_count: Arc<AtomicU64>,
        tick_in_progress: Arc<AtomicBool>,
        paused: Arc<AtomicBool>,
    ) {
        let mut interval = time::interval_at(time::Instant::now() + base_interval, base_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let warmup = time::sleep(warmup_delay);
        tokio::pin!(warmup);
        let mut warmup_done = false;

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    return;
                }
                _ = &mut warmup, if !warmup_done => {
                    warmup_done = true;
                    if paused.load(Ordering::SeqCst) {
                        continue;
                    }
                    if tick_in_progress.swap(true, Ordering::SeqCst) {
                        continue;
                    }

                    let ops = ops.clone();
                    let tick_in_progress = tick_in_progress.clone();
                    tokio::spawn(async move {
                        // One-time initial backfill once the app has settled.
                        ops.load_more_async(false).await;
                        tick_in_progress.store(false, Ordering::SeqCst);
                    });
                }
                _ = interval.tick() => {
                    if paused.load(Ordering::SeqCst) {
                        continue;
                    }
                    if tick_in_progress.swap(true, Ordering::SeqCst) {
                        tracing::debug!("Skipping overlapping tick");
                        continue;
                    }

                    let tick = tick_count.fetch_add(1, Ordering::SeqCst) + 1;
                    let ops = ops.clone();
                    let tick_in_progress = tick_in_progress.clone();
                    tokio::spawn(async move {
                        Self::run_cadences(ops, tick).await;
                        tick_in_progress.store(false, Ordering::SeqCst);
                    });
                }
            }
        }
    }

    async fn run_cadences(ops: Arc<dyn SyncOps>, tick: u64) {
        if tick % RECONCILE_EVERY == 0 {
            let processed = ops.mark_stale_sessions().await;
            if processed > 0 {
                tracing::info!(processed, "Reconciled stale sessions");
            }
        }

        if tick % COMPLETED_POLL_EVERY == 0 {
            ops.poll_completed_activities().await;
        }

        if tick % BACKFILL_EVERY == 0 {
            ops.load_more_async(false).await;
        }

        if tick % ACTIVE_POLL_EVERY == 0 {
            ops.refresh(false).await;
        }
    }
}
