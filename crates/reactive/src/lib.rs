//! Sidechain Reactive Library
//!
//! Reactive state and stream combinators for UI-bound client code.
//!
//! - [`StateSubject`] holds a current value and notifies subscribers of every
//!   change, with selector subscriptions that only fire when a projection
//!   changes.
//! - [`Observable`] is a minimal cold stream with explicit disposal through
//!   [`Subscription`].
//! - [`operators`] wraps flaky or slow sources: retry with backoff, timeout
//!   with fallback, TTL memoization, debounced search, polling and shared
//!   subscriptions. Results are delivered through a
//!   [`Scheduler`](sidechain_scheduler::Scheduler).
//!
//! # Example
//!
//! ```
//! use sidechain_reactive::operators::{retry_with_backoff, RetryConfig};
//! use sidechain_reactive::Observable;
//! use sidechain_scheduler::VirtualScheduler;
//! use std::sync::{Arc, Mutex};
//!
//! let scheduler = Arc::new(VirtualScheduler::new());
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink = seen.clone();
//!
//! let _subscription = retry_with_backoff(
//!     Observable::just("profile"),
//!     RetryConfig::aggressive(),
//!     scheduler.clone(),
//! )
//! .subscribe(move |v| sink.lock().unwrap().push(v), |_| {}, || {});
//!
//! // Nothing is delivered until the scheduler runs
//! assert!(seen.lock().unwrap().is_empty());
//! scheduler.run_due();
//! assert_eq!(*seen.lock().unwrap(), vec!["profile"]);
//! ```

mod error;
mod observable;
pub mod operators;
mod subject;
mod subscription;

// Re-export public API
pub use error::RxError;
pub use observable::Observable;
pub use subject::{StateSubject, Unsubscribe};
pub use subscription::{FnObserver, Observer, Subscriber, Subscription};
