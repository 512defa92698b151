//! Single-thread scheduler
//!
//! Marshals immediate and delayed work onto one designated thread. Immediate
//! work goes straight to the [`Dispatcher`]; delayed work waits on the timer
//! thread and is posted through the same dispatcher once due. Every action is
//! gated on a [`CancellationToken`] that is checked when the timer fires and
//! again right before the action runs.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::trace;

use crate::cancel::CancellationToken;
use crate::dispatcher::{Action, Dispatcher};
use crate::timer::{gated, TimerThread};

/// Scheduler shared between combinators and view-models
pub type SharedScheduler = Arc<dyn Scheduler>;

/// Something that runs actions on a single logical thread, now or later
///
/// Only [`Scheduler::schedule_with`] and [`Scheduler::now`] are required; the
/// other entry points are conveniences that mint a fresh token.
pub trait Scheduler: Send + Sync {
    /// Current time on this scheduler's clock
    fn now(&self) -> Instant;

    /// Run `action` at or after `due`, unless `token` is cancelled first
    ///
    /// A `due` at or before [`Scheduler::now`] means "as soon as possible".
    fn schedule_with(&self, token: CancellationToken, due: Instant, action: Action);

    /// Run `action` as soon as possible
    fn schedule(&self, action: Action) -> CancellationToken {
        let token = CancellationToken::new();
        self.schedule_with(token.clone(), self.now(), action);
        token
    }

    /// Run `action` at `due`
    fn schedule_at(&self, action: Action, due: Instant) -> CancellationToken {
        let token = CancellationToken::new();
        self.schedule_with(token.clone(), due, action);
        token
    }

    /// Run `action` once `delay` has elapsed
    fn schedule_after(&self, action: Action, delay: Duration) -> CancellationToken {
        let due = self.now() + delay;
        self.schedule_at(action, due)
    }
}

/// Scheduler counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Actions posted straight to the dispatcher
    pub dispatched: u64,

    /// Actions run inline on the designated thread
    pub inline: u64,

    /// Actions handed to the timer thread
    pub delayed: u64,

    /// Delayed actions still waiting for their deadline
    pub pending_timers: usize,
}

/// Scheduler bound to a host dispatcher
///
/// By default immediate work is always queued through the dispatcher, even
/// when the caller is already on the designated thread. Opt into inline
/// execution with [`MainThreadScheduler::with_inline_dispatch`].
///
/// # Example
///
/// ```
/// use sidechain_scheduler::{EventLoop, MainThreadScheduler, Scheduler};
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let event_loop = EventLoop::new();
/// event_loop.bind_current_thread();
/// let scheduler = MainThreadScheduler::new(Arc::new(event_loop.clone())).unwrap();
///
/// let fired = Arc::new(AtomicBool::new(false));
/// let flag = fired.clone();
/// scheduler.schedule_after(
///     Box::new(move || flag.store(true, Ordering::SeqCst)),
///     Duration::from_millis(10),
/// );
///
/// assert!(event_loop.run_until(Duration::from_secs(5), || fired.load(Ordering::SeqCst)));
/// ```
pub struct MainThreadScheduler {
    dispatcher: Arc<dyn Dispatcher>,
    timers: TimerThread,
    inline: bool,
    dispatched: AtomicU64,
    inlined: AtomicU64,
    delayed: AtomicU64,
}

impl MainThreadScheduler {
    /// Create a scheduler posting to `dispatcher`
    ///
    /// Spawns the timer thread; fails only if the thread cannot be spawned.
    pub fn new(dispatcher: Arc<dyn Dispatcher>) -> io::Result<Self> {
        let timers = TimerThread::spawn(dispatcher.clone())?;
        Ok(Self {
            dispatcher,
            timers,
            inline: false,
            dispatched: AtomicU64::new(0),
            inlined: AtomicU64::new(0),
            delayed: AtomicU64::new(0),
        })
    }

    /// Run immediate work inline when already on the designated thread
    pub fn with_inline_dispatch(mut self, inline: bool) -> Self {
        self.inline = inline;
        self
    }

    /// Get scheduler counters
    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            inline: self.inlined.load(Ordering::Relaxed),
            delayed: self.delayed.load(Ordering::Relaxed),
            pending_timers: self.timers.pending(),
        }
    }
}

impl Scheduler for MainThreadScheduler {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn schedule_with(&self, token: CancellationToken, due: Instant, action: Action) {
        if token.is_cancelled() {
            trace!("Dropping action scheduled with a cancelled token");
            return;
        }

        if due > Instant::now() {
            self.delayed.fetch_add(1, Ordering::Relaxed);
            self.timers.arm(due, token, action);
            return;
        }

        if self.inline && self.dispatcher.is_dispatch_thread() {
            self.inlined.fetch_add(1, Ordering::Relaxed);
            gated(token, action)();
        } else {
            self.dispatched.fetch_add(1, Ordering::Relaxed);
            self.dispatcher.post(gated(token, action));
        }
    }
}
