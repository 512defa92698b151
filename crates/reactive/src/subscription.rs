//! Subscription handles and the subscriber side of a stream

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use sidechain_scheduler::CancellationToken;

use crate::error::RxError;

type Teardown = Box<dyn FnOnce() + Send + 'static>;

struct SubscriptionState {
    token: CancellationToken,
    teardowns: Mutex<Option<Vec<Teardown>>>,
}

/// Handle to a live subscription
///
/// Disposing it cancels the subscription's token, so work already queued on a
/// scheduler for it becomes a no-op, and runs the registered teardowns once.
/// Clones refer to the same subscription.
#[derive(Clone)]
pub struct Subscription {
    state: Arc<SubscriptionState>,
}

impl Subscription {
    /// Create an open subscription with no teardowns
    pub fn new() -> Self {
        Self {
            state: Arc::new(SubscriptionState {
                token: CancellationToken::new(),
                teardowns: Mutex::new(Some(Vec::new())),
            }),
        }
    }

    /// Dispose the subscription
    ///
    /// Idempotent. Teardowns run on the calling thread, outside any lock.
    pub fn unsubscribe(&self) {
        let teardowns = self
            .state
            .teardowns
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let Some(teardowns) = teardowns else { return };
        self.state.token.cancel();
        for teardown in teardowns {
            teardown();
        }
    }

    /// Register work to run when the subscription is disposed
    ///
    /// Runs immediately if the subscription is already closed.
    pub fn add(&self, teardown: impl FnOnce() + Send + 'static) {
        let mut guard = self
            .state
            .teardowns
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match guard.as_mut() {
            Some(teardowns) => teardowns.push(Box::new(teardown)),
            None => {
                drop(guard);
                teardown();
            }
        }
    }

    /// Whether the subscription has been disposed
    pub fn is_closed(&self) -> bool {
        self.state.token.is_cancelled()
    }

    /// Liveness token for work scheduled on behalf of this subscription
    pub fn token(&self) -> CancellationToken {
        self.state.token.clone()
    }
}

impl Default for Subscription {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Receives the events of a stream
pub trait Observer<T>: Send + Sync {
    fn on_next(&self, value: T);
    fn on_error(&self, error: RxError);
    fn on_complete(&self);
}

/// Observer built from three closures
pub struct FnObserver<T> {
    next: Box<dyn Fn(T) + Send + Sync>,
    error: Box<dyn Fn(RxError) + Send + Sync>,
    complete: Box<dyn Fn() + Send + Sync>,
}

impl<T> FnObserver<T> {
    pub fn new(
        next: impl Fn(T) + Send + Sync + 'static,
        error: impl Fn(RxError) + Send + Sync + 'static,
        complete: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        Self {
            next: Box::new(next),
            error: Box::new(error),
            complete: Box::new(complete),
        }
    }
}

impl<T> Observer<T> for FnObserver<T> {
    fn on_next(&self, value: T) {
        (self.next)(value)
    }

    fn on_error(&self, error: RxError) {
        (self.error)(error)
    }

    fn on_complete(&self) {
        (self.complete)()
    }
}

/// The producer-facing end of a subscription
///
/// Enforces the stream grammar: any number of values, then at most one
/// terminal event. Nothing is delivered once the subscription is closed, and
/// a terminal event disposes the subscription after it is delivered.
pub struct Subscriber<T> {
    observer: Arc<dyn Observer<T>>,
    subscription: Subscription,
    stopped: Arc<AtomicBool>,
}

impl<T> Subscriber<T> {
    pub(crate) fn new(observer: Arc<dyn Observer<T>>, subscription: Subscription) -> Self {
        Self {
            observer,
            subscription,
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Deliver a value
    pub fn next(&self, value: T) {
        if self.is_closed() {
            return;
        }
        self.observer.on_next(value);
    }

    /// Deliver a failure and close the subscription
    pub fn error(&self, error: RxError) {
        if !self.stopped.swap(true, Ordering::AcqRel) && !self.subscription.is_closed() {
            self.observer.on_error(error);
        }
        self.subscription.unsubscribe();
    }

    /// Signal completion and close the subscription
    pub fn complete(&self) {
        if !self.stopped.swap(true, Ordering::AcqRel) && !self.subscription.is_closed() {
            self.observer.on_complete();
        }
        self.subscription.unsubscribe();
    }

    /// Whether further events would be dropped
    pub fn is_closed(&self) -> bool {
        self.stopped.load(Ordering::Acquire) || self.subscription.is_closed()
    }

    /// Register work to run when the subscription ends
    pub fn add(&self, teardown: impl FnOnce() + Send + 'static) {
        self.subscription.add(teardown);
    }

    /// Liveness token for work scheduled on behalf of this subscriber
    pub fn token(&self) -> CancellationToken {
        self.subscription.token()
    }

    pub fn subscription(&self) -> &Subscription {
        &self.subscription
    }
}

impl<T> Clone for Subscriber<T> {
    fn clone(&self) -> Self {
        Self {
            observer: self.observer.clone(),
            subscription: self.subscription.clone(),
            stopped: self.stopped.clone(),
        }
    }
}

impl<T> Observer<T> for Subscriber<T> {
    fn on_next(&self, value: T) {
        self.next(value)
    }

    fn on_error(&self, error: RxError) {
        self.error(error)
    }

    fn on_complete(&self) {
        self.complete()
    }
}
