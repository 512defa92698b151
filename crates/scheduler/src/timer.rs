//! Delayed-action timer
//!
//! Future-dated actions wait in a min-heap ordered by `(due, sequence)`. A
//! single background thread sleeps until the earliest deadline, then posts the
//! due actions through the dispatcher. Actions are never run on the timer
//! thread itself.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::io;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::mem;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use tracing::{debug, trace};

use crate::cancel::CancellationToken;
use crate::dispatcher::{Action, Dispatcher};

/// An action waiting for its deadline
pub(crate) struct TimerEntry {
    pub(crate) due: Instant,
    pub(crate) seq: u64,
    pub(crate) token: CancellationToken,
    pub(crate) action: Action,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max heap and the earliest entry must pop first
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Queue length below which cancelled entries are left for the timer to skip
const PRUNE_THRESHOLD: usize = 64;

/// Min-heap of pending timer entries
pub(crate) struct TimerQueue {
    heap: BinaryHeap<TimerEntry>,
    next_seq: u64,
    prune_at: usize,
}

impl Default for TimerQueue {
    fn default() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
            prune_at: PRUNE_THRESHOLD,
        }
    }
}

impl TimerQueue {
    pub(crate) fn push(&mut self, due: Instant, token: CancellationToken, action: Action) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(TimerEntry {
            due,
            seq,
            token,
            action,
        });
    }

    /// Pop the earliest entry if it is due at or before `now`
    pub(crate) fn pop_due(&mut self, now: Instant) -> Option<TimerEntry> {
        if self.heap.peek().is_some_and(|entry| entry.due <= now) {
            self.heap.pop()
        } else {
            None
        }
    }

    pub(crate) fn next_due(&self) -> Option<Instant> {
        self.heap.peek().map(|entry| entry.due)
    }

    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }

    /// True once the queue has doubled since the last prune
    pub(crate) fn needs_prune(&self) -> bool {
        self.heap.len() >= self.prune_at
    }

    /// Remove entries whose token is cancelled and hand them back
    ///
    /// The caller drops them; their actions may own the scheduler, so that
    /// must not happen under the queue lock.
    pub(crate) fn prune_cancelled(&mut self) -> Vec<TimerEntry> {
        let (cancelled, live): (Vec<_>, Vec<_>) = mem::take(&mut self.heap)
            .into_vec()
            .into_iter()
            .partition(|entry| entry.token.is_cancelled());
        self.heap = BinaryHeap::from(live);
        self.prune_at = (self.heap.len() * 2).max(PRUNE_THRESHOLD);
        cancelled
    }
}

struct TimerShared {
    queue: Mutex<(TimerQueue, bool)>,
    wakeup: Condvar,
}

/// Background thread that hands due actions to a dispatcher
pub(crate) struct TimerThread {
    shared: Arc<TimerShared>,
    thread: Option<JoinHandle<()>>,
}

impl TimerThread {
    /// Spawn the timer thread
    pub(crate) fn spawn(dispatcher: Arc<dyn Dispatcher>) -> io::Result<Self> {
        let shared = Arc::new(TimerShared {
            queue: Mutex::new((TimerQueue::default(), false)),
            wakeup: Condvar::new(),
        });

        let thread_shared = shared.clone();
        let thread = thread::Builder::new()
            .name("sidechain-timer".to_string())
            .spawn(move || Self::run(thread_shared, dispatcher))?;

        Ok(Self {
            shared,
            thread: Some(thread),
        })
    }

    /// Queue `action` to be posted once `due` has passed
    pub(crate) fn arm(&self, due: Instant, token: CancellationToken, action: Action) {
        let pruned = {
            let mut guard = self
                .shared
                .queue
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let pruned = if guard.0.needs_prune() {
                guard.0.prune_cancelled()
            } else {
                Vec::new()
            };
            guard.0.push(due, token, action);
            pruned
        };
        self.shared.wakeup.notify_one();
        if !pruned.is_empty() {
            trace!(pruned = pruned.len(), "Pruned cancelled timers");
        }
    }

    /// Number of armed, not yet fired entries
    pub(crate) fn pending(&self) -> usize {
        self.shared
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .0
            .len()
    }

    fn run(shared: Arc<TimerShared>, dispatcher: Arc<dyn Dispatcher>) {
        let mut guard = shared.queue.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if guard.1 {
                break;
            }

            let now = Instant::now();
            let mut fired = Vec::new();
            while let Some(entry) = guard.0.pop_due(now) {
                fired.push(entry);
            }

            if !fired.is_empty() {
                drop(guard);
                for entry in fired {
                    if entry.token.is_cancelled() {
                        trace!(seq = entry.seq, "Skipping cancelled timer");
                        continue;
                    }
                    dispatcher.post(gated(entry.token, entry.action));
                }
                guard = shared.queue.lock().unwrap_or_else(PoisonError::into_inner);
                continue;
            }

            guard = match guard.0.next_due() {
                Some(due) => {
                    shared
                        .wakeup
                        .wait_timeout(guard, due.saturating_duration_since(now))
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => shared
                    .wakeup
                    .wait(guard)
                    .unwrap_or_else(PoisonError::into_inner),
            };
        }
        debug!(abandoned = guard.0.len(), "Timer thread stopped");
    }
}

impl Drop for TimerThread {
    fn drop(&mut self) {
        {
            let mut guard = self
                .shared
                .queue
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            guard.1 = true;
        }
        self.shared.wakeup.notify_all();
        if let Some(thread) = self.thread.take() {
            // The last owner can be an action dropped by the timer thread itself,
            // which then exits on its own once it sees the shutdown flag
            if thread.thread().id() == thread::current().id() {
                debug!("Timer dropped on its own thread, detaching");
                return;
            }
            let _ = thread.join();
        }
    }
}

/// Wrap `action` so it becomes a no-op if `token` is cancelled before it runs
pub(crate) fn gated(token: CancellationToken, action: Action) -> Action {
    Box::new(move || {
        if token.is_cancelled() {
            trace!("Skipping cancelled action");
            return;
        }
        action();
    })
}
