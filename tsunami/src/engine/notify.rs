//! The async-notify batcher (spec.md §4.6).
//!
//! Coalesces bursts of off-thread writes into a single `asyncinitiation`
//! SSE pulse, bounded below by `maxCadence` and above by `maxDebounce`,
//! with a short settle-down `debounce` in between. Timing state
//! (`lastEventNs` / `batchStartNs`) is kept in atomics rather than behind a
//! lock precisely so it survives a saturated wake channel (spec.md §5),
//! the same reasoning `dioxus-core`'s scheduler applies to its own
//! `Cell`-based dirty-scope bookkeeping (`scheduler.rs`) for anything that
//! must stay cheap to touch from a hot write path.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Notify};
use tracing::debug;

pub const DEFAULT_MAX_CADENCE: Duration = Duration::from_millis(10);
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_micros(500);
pub const DEFAULT_MAX_DEBOUNCE: Duration = Duration::from_millis(2);

const NO_BATCH: i64 = -1;

#[derive(Clone, Copy, Debug)]
pub struct BatcherParams {
    pub max_cadence: Duration,
    pub debounce: Duration,
    pub max_debounce: Duration,
}

impl Default for BatcherParams {
    fn default() -> Self {
        BatcherParams {
            max_cadence: DEFAULT_MAX_CADENCE,
            debounce: DEFAULT_DEBOUNCE,
            max_debounce: DEFAULT_MAX_DEBOUNCE,
        }
    }
}

pub struct NotifyBatcher {
    params: BatcherParams,
    start: Instant,
    last_event_ns: AtomicI64,
    batch_start_ns: AtomicI64,
    last_sent_ns: AtomicI64,
    wake: Notify,
    fire_tx: parking_lot::Mutex<Option<mpsc::UnboundedSender<()>>>,
}

impl Default for NotifyBatcher {
    fn default() -> Self {
        NotifyBatcher::new(BatcherParams::default())
    }
}

impl NotifyBatcher {
    pub fn new(params: BatcherParams) -> NotifyBatcher {
        NotifyBatcher {
            params,
            start: Instant::now(),
            last_event_ns: AtomicI64::new(i64::MIN / 2),
            batch_start_ns: AtomicI64::new(NO_BATCH),
            last_sent_ns: AtomicI64::new(i64::MIN / 2),
            wake: Notify::new(),
            fire_tx: parking_lot::Mutex::new(None),
        }
    }

    fn now_ns(&self) -> i64 {
        self.start.elapsed().as_nanos() as i64
    }

    /// Record a write and (coalesced) wake the scheduler loop. Safe to call
    /// before the loop task has been spawned; the event is simply picked up
    /// once it starts.
    pub fn notify(&self) {
        let now = self.now_ns();
        self.last_event_ns.store(now, Ordering::SeqCst);
        self.batch_start_ns
            .compare_exchange(NO_BATCH, now, Ordering::SeqCst, Ordering::SeqCst)
            .ok();
        self.wake.notify_one();
    }

    /// Wire the channel the loop fires `asyncinitiation` pulses into. The
    /// receiving end is owned by the SSE hub (see `transport::sse`).
    pub fn set_fire_sink(&self, tx: mpsc::UnboundedSender<()>) {
        *self.fire_tx.lock() = Some(tx);
    }

    /// Spawns the scheduler loop on the current Tokio runtime. Call once,
    /// after `set_fire_sink`.
    pub fn spawn(self: Arc<Self>) {
        tokio::spawn(async move {
            self.run_loop().await;
        });
    }

    async fn run_loop(self: Arc<Self>) {
        loop {
            self.wake.notified().await;
            loop {
                let target = self.compute_target();
                let now = self.now_ns();
                if target <= now {
                    break;
                }
                tokio::time::sleep(Duration::from_nanos((target - now) as u64)).await;
                // Re-check: if new events pushed the target later, loop and
                // recompute instead of firing early (spec.md §4.6: "if new
                // events pushed target later, rearm").
            }
            self.fire();
        }
    }

    /// Pure function implementing the §4.6 algorithm; exposed for testing.
    fn compute_target(&self) -> i64 {
        let batch_start = self.batch_start_ns.load(Ordering::SeqCst);
        let batch_start = if batch_start == NO_BATCH {
            self.now_ns()
        } else {
            batch_start
        };
        let last_sent = self.last_sent_ns.load(Ordering::SeqCst);
        let last_event = self.last_event_ns.load(Ordering::SeqCst);

        let max_cadence = self.params.max_cadence.as_nanos() as i64;
        let debounce = self.params.debounce.as_nanos() as i64;
        let max_debounce = self.params.max_debounce.as_nanos() as i64;

        let anchor = batch_start.max(last_sent + max_cadence);
        let deadline = anchor + max_debounce;
        let candidate = (last_event + debounce).min(deadline);
        candidate.max(last_sent + max_cadence)
    }

    fn fire(&self) {
        let now = self.now_ns();
        self.last_sent_ns.store(now, Ordering::SeqCst);
        self.batch_start_ns.store(NO_BATCH, Ordering::SeqCst);
        if let Some(tx) = self.fire_tx.lock().as_ref() {
            if tx.send(()).is_err() {
                debug!("asyncinitiation fire sink has no live receiver");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cadence_and_debounce_are_ordered_sanely() {
        let params = BatcherParams::default();
        assert!(params.debounce < params.max_debounce);
        assert!(params.max_debounce < params.max_cadence);
    }

    #[tokio::test(start_paused = true)]
    async fn single_burst_yields_one_fire_within_window() {
        let batcher = Arc::new(NotifyBatcher::new(BatcherParams {
            max_cadence: Duration::from_millis(10),
            debounce: Duration::from_micros(500),
            max_debounce: Duration::from_millis(2),
        }));
        let (tx, mut rx) = mpsc::unbounded_channel();
        batcher.set_fire_sink(tx);
        batcher.clone().spawn();

        for _ in 0..100 {
            batcher.notify();
            tokio::time::advance(Duration::from_micros(10)).await;
        }

        tokio::time::advance(Duration::from_millis(5)).await;
        tokio::task::yield_now().await;

        let mut fires = 0;
        while rx.try_recv().is_ok() {
            fires += 1;
        }
        assert_eq!(fires, 1, "expected exactly one coalesced asyncinitiation pulse");
    }

    #[tokio::test(start_paused = true)]
    async fn second_burst_respects_min_cadence() {
        let batcher = Arc::new(NotifyBatcher::new(BatcherParams {
            max_cadence: Duration::from_millis(10),
            debounce: Duration::from_micros(500),
            max_debounce: Duration::from_millis(2),
        }));
        let (tx, mut rx) = mpsc::unbounded_channel();
        batcher.set_fire_sink(tx);
        batcher.clone().spawn();

        batcher.notify();
        tokio::time::advance(Duration::from_millis(5)).await;
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_ok());

        let first_sent = batcher.last_sent_ns.load(Ordering::SeqCst);

        tokio::time::advance(Duration::from_millis(20)).await;
        batcher.notify();
        tokio::time::advance(Duration::from_millis(5)).await;
        tokio::task::yield_now().await;

        assert!(rx.try_recv().is_ok());
        let second_sent = batcher.last_sent_ns.load(Ordering::SeqCst);
        let min_cadence = batcher.params.max_cadence.as_nanos() as i64;
        assert!(second_sent - first_sent >= min_cadence);
    }
}
