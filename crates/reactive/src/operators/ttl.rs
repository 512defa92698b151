//! Memoize the latest value of a stream for a fixed time

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use sidechain_scheduler::SharedScheduler;
use tracing::debug;

use crate::observable::Observable;
use crate::operators::observe_on::observe_on;
use crate::subscription::{FnObserver, Subscriber};

/// Slot holding one value and the instant it goes stale
///
/// Share one cell between several [`cache_with_ttl_in`] streams to let them
/// reuse each other's results, or call [`TtlCell::invalidate`] to force the
/// next subscription to hit the source.
pub struct TtlCell<T> {
    slot: Mutex<Option<(T, Instant)>>,
}

impl<T: Clone> TtlCell<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    /// The stored value, if it is still fresh at `now`
    pub fn get(&self, now: Instant) -> Option<T> {
        let slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        match slot.as_ref() {
            Some((value, expires_at)) if now < *expires_at => Some(value.clone()),
            _ => None,
        }
    }

    /// Store `value` until `expires_at`
    pub fn store(&self, value: T, expires_at: Instant) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some((value, expires_at));
    }

    /// Drop the stored value
    pub fn invalidate(&self) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl<T: Clone> Default for TtlCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Serve the last value of `source` for `ttl` instead of resubscribing
///
/// While the memoized value is fresh, a subscription receives it and
/// completes without touching `source`. Otherwise `source` is subscribed and
/// every value it emits refreshes the memo. Freshness is measured on the
/// scheduler's clock.
pub fn cache_with_ttl<T>(
    source: Observable<T>,
    ttl: Duration,
    scheduler: SharedScheduler,
) -> Observable<T>
where
    T: Clone + Send + Sync + 'static,
{
    cache_with_ttl_in(source, ttl, Arc::new(TtlCell::new()), scheduler)
}

/// [`cache_with_ttl`] backed by a caller-provided cell
pub fn cache_with_ttl_in<T>(
    source: Observable<T>,
    ttl: Duration,
    cell: Arc<TtlCell<T>>,
    scheduler: SharedScheduler,
) -> Observable<T>
where
    T: Clone + Send + Sync + 'static,
{
    let clock = scheduler.clone();
    let memoized = Observable::create(move |downstream: Subscriber<T>| {
        if let Some(value) = cell.get(clock.now()) {
            debug!("TTL cache hit");
            downstream.next(value);
            downstream.complete();
            return;
        }

        debug!("TTL cache miss, subscribing to source");
        let (cell, clock) = (cell.clone(), clock.clone());
        let (next_sub, error_sub, done_sub) =
            (downstream.clone(), downstream.clone(), downstream.clone());
        let upstream = source.subscribe_with(Arc::new(FnObserver::new(
            move |value: T| {
                cell.store(value.clone(), clock.now() + ttl);
                next_sub.next(value);
            },
            move |error| error_sub.error(error),
            move || done_sub.complete(),
        )));
        downstream.add(move || upstream.unsubscribe());
    });
    observe_on(memoized, scheduler)
}
