//! Fixed-delay polling

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use sidechain_scheduler::SharedScheduler;
use tracing::{debug, warn};

use crate::observable::Observable;
use crate::operators::observe_on::observe_on;
use crate::subscription::{FnObserver, Subscriber, Subscription};

type Factory<T> = dyn Fn() -> Observable<T> + Send + Sync;

struct Poller<T> {
    factory: Arc<Factory<T>>,
    interval: Duration,
    scheduler: SharedScheduler,
    downstream: Subscriber<T>,
    iterations: AtomicU64,
    current: Mutex<Option<Subscription>>,
}

impl<T: Send + 'static> Poller<T> {
    fn run_iteration(self: &Arc<Self>) {
        if self.downstream.is_closed() {
            return;
        }

        let iteration = self.iterations.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(iteration, "Polling");

        let next_sub = self.downstream.clone();
        let (on_error, on_done) = (self.clone(), self.clone());
        let subscription = (self.factory)().subscribe_with(Arc::new(FnObserver::new(
            move |value: T| next_sub.next(value),
            move |error| {
                warn!(iteration, error = %error, "Poll iteration failed, continuing");
                on_error.schedule_next();
            },
            move || on_done.schedule_next(),
        )));

        let previous = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(subscription);
        if let Some(previous) = previous {
            previous.unsubscribe();
        }
    }

    fn schedule_next(self: &Arc<Self>) {
        let poller = self.clone();
        self.scheduler.schedule_with(
            self.downstream.token(),
            self.scheduler.now() + self.interval,
            Box::new(move || poller.run_iteration()),
        );
    }

    fn teardown(&self) {
        let current = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(current) = current {
            current.unsubscribe();
        }
    }
}

/// Repeatedly run the stream built by `factory`
///
/// The first iteration starts on subscription; each later one starts
/// `interval` after the previous iteration finished, so a slow request never
/// overlaps the next. Failed iterations are logged and polling continues.
/// The output never completes on its own; dispose the subscription to stop.
/// Values are delivered through `scheduler`.
pub fn poll<T: Send + 'static>(
    interval: Duration,
    factory: impl Fn() -> Observable<T> + Send + Sync + 'static,
    scheduler: SharedScheduler,
) -> Observable<T> {
    let factory: Arc<Factory<T>> = Arc::new(factory);
    let poll_scheduler = scheduler.clone();
    let polling = Observable::create(move |downstream: Subscriber<T>| {
        let poller = Arc::new(Poller {
            factory: factory.clone(),
            interval,
            scheduler: poll_scheduler.clone(),
            downstream: downstream.clone(),
            iterations: AtomicU64::new(0),
            current: Mutex::new(None),
        });
        poller.run_iteration();
        downstream.add(move || poller.teardown());
    });
    observe_on(polling, scheduler)
}
