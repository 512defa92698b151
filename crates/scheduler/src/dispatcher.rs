//! Host dispatch primitive
//!
//! The scheduler never owns the designated thread itself. It hands actions to
//! a [`Dispatcher`], which is whatever the host uses to run a closure on its
//! UI/message thread. [`EventLoop`] is a dispatcher that a host (or a test)
//! pumps by hand.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, OnceLock, PoisonError};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use tracing::{trace, warn};

/// A unit of work handed to a dispatcher
pub type Action = Box<dyn FnOnce() + Send + 'static>;

/// "Run this closure on the designated thread"
///
/// Implementations must run posted actions in the order they were posted and
/// must never run them on the posting thread from inside `post`.
pub trait Dispatcher: Send + Sync {
    /// Queue an action for execution on the designated thread
    fn post(&self, action: Action);

    /// Whether the calling thread is the designated thread
    fn is_dispatch_thread(&self) -> bool;
}

struct LoopState {
    queue: Mutex<VecDeque<Action>>,
    ready: Condvar,
    owner: OnceLock<ThreadId>,
}

/// Manually pumped dispatcher
///
/// The first thread that calls [`EventLoop::bind_current_thread`] or one of
/// the pump methods becomes the designated thread. Pumping from any other
/// thread is refused.
///
/// # Example
///
/// ```
/// use sidechain_scheduler::{Dispatcher, EventLoop};
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// let event_loop = EventLoop::new();
/// event_loop.bind_current_thread();
///
/// let ran = Arc::new(AtomicUsize::new(0));
/// let ran_clone = ran.clone();
/// event_loop.post(Box::new(move || {
///     ran_clone.fetch_add(1, Ordering::SeqCst);
/// }));
///
/// assert_eq!(event_loop.run_pending(), 1);
/// assert_eq!(ran.load(Ordering::SeqCst), 1);
/// ```
#[derive(Clone)]
pub struct EventLoop {
    state: Arc<LoopState>,
}

impl EventLoop {
    /// Create an event loop with no designated thread yet
    pub fn new() -> Self {
        Self {
            state: Arc::new(LoopState {
                queue: Mutex::new(VecDeque::new()),
                ready: Condvar::new(),
                owner: OnceLock::new(),
            }),
        }
    }

    /// Make the calling thread the designated thread
    ///
    /// Returns `false` if another thread was bound first.
    pub fn bind_current_thread(&self) -> bool {
        let current = thread::current().id();
        *self.state.owner.get_or_init(|| current) == current
    }

    /// Number of queued actions
    pub fn pending(&self) -> usize {
        self.lock_queue().len()
    }

    /// Run every action queued at the time of the call
    ///
    /// Actions posted while pumping are left for the next call, so an action
    /// that reschedules itself cannot starve the caller.
    ///
    /// Returns the number of actions run.
    pub fn run_pending(&self) -> usize {
        if !self.bind_current_thread() {
            warn!("EventLoop pumped from a thread other than its designated thread");
            return 0;
        }

        let batch: Vec<Action> = self.lock_queue().drain(..).collect();
        let count = batch.len();
        for action in batch {
            action();
        }
        if count > 0 {
            trace!(count, "Ran dispatched actions");
        }
        count
    }

    /// Pump the loop until `done` returns true or `timeout` elapses
    ///
    /// Blocks between batches waiting for new posts. Returns whether `done`
    /// was satisfied.
    pub fn run_until(&self, timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.run_pending();
            if done() {
                return true;
            }

            let now = Instant::now();
            if now >= deadline {
                return false;
            }

            let queue = self.lock_queue();
            if queue.is_empty() {
                let _ = self
                    .state
                    .ready
                    .wait_timeout(queue, deadline - now)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        }
    }

    fn lock_queue(&self) -> std::sync::MutexGuard<'_, VecDeque<Action>> {
        self.state.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher for EventLoop {
    fn post(&self, action: Action) {
        self.lock_queue().push_back(action);
        self.state.ready.notify_all();
    }

    fn is_dispatch_thread(&self) -> bool {
        self.state.owner.get() == Some(&thread::current().id())
    }
}

impl fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLoop")
            .field("pending", &self.pending())
            .field("owner", &self.state.owner.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_event_loop_runs_in_post_order() {
        let event_loop = EventLoop::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..5 {
            let order = order.clone();
            event_loop.post(Box::new(move || order.lock().unwrap().push(i)));
        }

        assert_eq!(event_loop.pending(), 5);
        assert_eq!(event_loop.run_pending(), 5);
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
        assert_eq!(event_loop.pending(), 0);
    }

    #[test]
    fn test_event_loop_defers_reentrant_posts() {
        let event_loop = EventLoop::new();
        let ran = Arc::new(AtomicUsize::new(0));

        let inner_loop = event_loop.clone();
        let inner_ran = ran.clone();
        event_loop.post(Box::new(move || {
            inner_ran.fetch_add(1, Ordering::SeqCst);
            let again = inner_ran.clone();
            inner_loop.post(Box::new(move || {
                again.fetch_add(1, Ordering::SeqCst);
            }));
        }));

        assert_eq!(event_loop.run_pending(), 1);
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(event_loop.run_pending(), 1);
        assert_eq!(ran.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_event_loop_thread_binding() {
        let event_loop = EventLoop::new();
        assert!(!event_loop.is_dispatch_thread());
        assert!(event_loop.bind_current_thread());
        assert!(event_loop.is_dispatch_thread());

        let other = event_loop.clone();
        let result = thread::spawn(move || {
            other.post(Box::new(|| {}));
            (other.is_dispatch_thread(), other.bind_current_thread(), other.run_pending())
        })
        .join()
        .unwrap();

        assert_eq!(result, (false, false, 0));
        assert_eq!(event_loop.run_pending(), 1);
    }

    #[test]
    fn test_run_until_wakes_on_cross_thread_post() {
        let event_loop = EventLoop::new();
        event_loop.bind_current_thread();
        let done = Arc::new(AtomicUsize::new(0));

        let poster = event_loop.clone();
        let flag = done.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            poster.post(Box::new(move || {
                flag.store(1, Ordering::SeqCst);
            }));
        });

        let satisfied = event_loop.run_until(Duration::from_secs(5), || {
            done.load(Ordering::SeqCst) == 1
        });
        handle.join().unwrap();
        assert!(satisfied);
    }

    #[test]
    fn test_run_until_times_out() {
        let event_loop = EventLoop::new();
        let start = Instant::now();
        assert!(!event_loop.run_until(Duration::from_millis(30), || false));
        assert!(start.elapsed() >= Duration::from_millis(30));
    }
}
