//! Sidechain Scheduler Library
//!
//! Single-logical-thread scheduling for a desktop client.
//!
//! Work that must touch UI-bound state is marshalled onto one designated
//! thread through a host [`Dispatcher`]. Delayed work waits on a timer thread
//! and is posted through the same dispatcher once due. Every action carries a
//! [`CancellationToken`]; a cancelled action is skipped, never interrupted.
//!
//! # Example
//!
//! ```
//! use sidechain_scheduler::{EventLoop, MainThreadScheduler, Scheduler};
//! use std::sync::Arc;
//!
//! let event_loop = EventLoop::new();
//! event_loop.bind_current_thread();
//!
//! let scheduler = MainThreadScheduler::new(Arc::new(event_loop.clone())).unwrap();
//! let token = scheduler.schedule(Box::new(|| println!("on the main thread")));
//!
//! // Disposing the owner before the action runs turns it into a no-op
//! token.cancel();
//! event_loop.run_pending();
//! ```

mod cancel;
mod dispatcher;
mod scheduler;
mod timer;
mod virtual_time;

// Re-export public API
pub use cancel::CancellationToken;
pub use dispatcher::{Action, Dispatcher, EventLoop};
pub use scheduler::{MainThreadScheduler, Scheduler, SchedulerStats, SharedScheduler};
pub use virtual_time::VirtualScheduler;
