//! Deterministic scheduler with a manually advanced clock
//!
//! Nothing runs until the clock is moved. Used wherever timing-dependent
//! behaviour (backoff, debounce, timeouts, polling) must be tested without
//! sleeping.

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::trace;

use crate::cancel::CancellationToken;
use crate::dispatcher::Action;
use crate::scheduler::Scheduler;
use crate::timer::TimerQueue;

/// Scheduler whose clock only moves when told to
///
/// Actions due at the same instant run in the order they were scheduled.
/// Actions scheduled while advancing run in the same advance if they fall
/// inside the target window.
///
/// # Example
///
/// ```
/// use sidechain_scheduler::{Scheduler, VirtualScheduler};
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let scheduler = VirtualScheduler::new();
/// let runs = Arc::new(AtomicUsize::new(0));
/// let counter = runs.clone();
/// scheduler.schedule_after(
///     Box::new(move || {
///         counter.fetch_add(1, Ordering::SeqCst);
///     }),
///     Duration::from_millis(100),
/// );
///
/// scheduler.advance_by(Duration::from_millis(99));
/// assert_eq!(runs.load(Ordering::SeqCst), 0);
/// scheduler.advance_by(Duration::from_millis(1));
/// assert_eq!(runs.load(Ordering::SeqCst), 1);
/// ```
pub struct VirtualScheduler {
    start: Instant,
    now: Mutex<Instant>,
    queue: Mutex<TimerQueue>,
}

impl VirtualScheduler {
    /// Create a scheduler whose clock starts at the current instant
    pub fn new() -> Self {
        let start = Instant::now();
        Self {
            start,
            now: Mutex::new(start),
            queue: Mutex::new(TimerQueue::default()),
        }
    }

    /// Time elapsed on the virtual clock since creation
    pub fn elapsed(&self) -> Duration {
        self.now() - self.start
    }

    /// Number of scheduled actions that have not run yet
    pub fn pending(&self) -> usize {
        self.lock_queue().len()
    }

    /// Move the clock forward by `delta`, running everything that falls due
    ///
    /// Returns the number of actions that ran.
    pub fn advance_by(&self, delta: Duration) -> usize {
        let target = self.now() + delta;
        self.advance_to(target)
    }

    /// Move the clock to `target`, running everything due at or before it
    ///
    /// A target in the past leaves the clock where it is but still runs
    /// actions that are already due.
    pub fn advance_to(&self, target: Instant) -> usize {
        let target = target.max(self.now());
        let mut ran = 0;

        loop {
            let next = self.lock_queue().pop_due(target);
            let Some(entry) = next else { break };

            self.set_now(entry.due.max(self.now()));
            if entry.token.is_cancelled() {
                trace!(seq = entry.seq, "Skipping cancelled virtual action");
                continue;
            }
            (entry.action)();
            ran += 1;
        }

        self.set_now(target);
        ran
    }

    /// Run everything that is already due without moving the clock
    pub fn run_due(&self) -> usize {
        self.advance_to(self.now())
    }

    /// Run every scheduled action, moving the clock as far as needed
    ///
    /// Self-rescheduling work would never drain, so this stops after
    /// `max_actions` actions.
    pub fn flush(&self, max_actions: usize) -> usize {
        let mut ran = 0;
        while ran < max_actions {
            let next = self.lock_queue().next_due();
            let Some(due) = next else { break };
            let due = due.max(self.now());

            let entry = self.lock_queue().pop_due(due);
            let Some(entry) = entry else { break };

            self.set_now(due);
            if entry.token.is_cancelled() {
                continue;
            }
            (entry.action)();
            ran += 1;
        }
        ran
    }

    fn set_now(&self, instant: Instant) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = instant;
    }

    fn lock_queue(&self) -> std::sync::MutexGuard<'_, TimerQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for VirtualScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for VirtualScheduler {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn schedule_with(&self, token: CancellationToken, due: Instant, action: Action) {
        if token.is_cancelled() {
            return;
        }
        self.lock_queue().push(due, token, action);
    }
}
