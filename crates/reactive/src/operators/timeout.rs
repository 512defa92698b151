//! Timeout with fallback

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use sidechain_scheduler::{CancellationToken, SharedScheduler};
use tracing::warn;

use crate::observable::Observable;
use crate::operators::observe_on::observe_on;
use crate::subscription::{FnObserver, Subscriber, Subscription};

const UNDECIDED: u8 = 0;
const SOURCE_WON: u8 = 1;
const TIMED_OUT: u8 = 2;

struct Race<T> {
    phase: AtomicU8,
    timer: CancellationToken,
    downstream: Subscriber<T>,
    source: Mutex<Option<Subscription>>,
    fallback: Mutex<Option<Subscription>>,
}

impl<T: Send + 'static> Race<T> {
    /// Values flow until the timer wins; they leave the race open
    fn source_may_emit(&self) -> bool {
        self.phase.load(Ordering::Acquire) != TIMED_OUT
    }

    /// Claim the race for a terminating source; true if it may deliver
    fn source_may_terminate(&self) -> bool {
        match self
            .phase
            .compare_exchange(UNDECIDED, SOURCE_WON, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {
                self.timer.cancel();
                true
            }
            Err(phase) => phase == SOURCE_WON,
        }
    }

    fn on_timeout(self: &Arc<Self>, fallback: &Observable<T>, timeout: Duration) {
        if self
            .phase
            .compare_exchange(UNDECIDED, TIMED_OUT, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        warn!(
            timeout_ms = timeout.as_millis() as u64,
            "Source timed out, switching to fallback"
        );
        let source = self.source.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(source) = source {
            source.unsubscribe();
        }

        let subscription = fallback.subscribe_with(Arc::new(self.downstream.clone()));
        *self.fallback.lock().unwrap_or_else(PoisonError::into_inner) = Some(subscription);
    }

    fn teardown(&self) {
        self.timer.cancel();
        for slot in [&self.source, &self.fallback] {
            let subscription = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
            if let Some(subscription) = subscription {
                subscription.unsubscribe();
            }
        }
    }
}

/// Mirror `source`, or switch to `fallback` if `source` stays silent too long
///
/// The race is between the source terminating (completion or error) and the
/// timer started at subscription. Source values are forwarded while the race
/// is open but do not settle it, so a source that emits and then hangs still
/// falls back. Once the timer wins, the source is disposed and nothing it
/// produces later is delivered; fallback errors propagate as-is. All events
/// are delivered through `scheduler`.
pub fn timeout_with_fallback<T: Send + 'static>(
    source: Observable<T>,
    timeout: Duration,
    fallback: Observable<T>,
    scheduler: SharedScheduler,
) -> Observable<T> {
    let timer_scheduler = scheduler.clone();
    let racing = Observable::create(move |downstream: Subscriber<T>| {
        let race = Arc::new(Race {
            phase: AtomicU8::new(UNDECIDED),
            timer: downstream.token().child(),
            downstream: downstream.clone(),
            source: Mutex::new(None),
            fallback: Mutex::new(None),
        });

        let (timer_race, fallback) = (race.clone(), fallback.clone());
        timer_scheduler.schedule_with(
            race.timer.clone(),
            timer_scheduler.now() + timeout,
            Box::new(move || timer_race.on_timeout(&fallback, timeout)),
        );

        let (next_race, error_race, done_race) = (race.clone(), race.clone(), race.clone());
        let subscription = source.subscribe_with(Arc::new(FnObserver::new(
            move |value: T| {
                if next_race.source_may_emit() {
                    next_race.downstream.next(value);
                }
            },
            move |error| {
                if error_race.source_may_terminate() {
                    error_race.downstream.error(error);
                }
            },
            move || {
                if done_race.source_may_terminate() {
                    done_race.downstream.complete();
                }
            },
        )));

        if race.phase.load(Ordering::Acquire) == TIMED_OUT {
            subscription.unsubscribe();
        } else {
            *race.source.lock().unwrap_or_else(PoisonError::into_inner) = Some(subscription);
        }

        downstream.add(move || race.teardown());
    });
    observe_on(racing, scheduler)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RxError;
    use sidechain_scheduler::VirtualScheduler;

    /// Source that emits `value` after `delay` on the virtual clock
    fn delayed(
        scheduler: Arc<VirtualScheduler>,
        delay: Duration,
        value: &'static str,
    ) -> Observable<&'static str> {
        emit_after(scheduler, delay, value, true)
    }

    fn emit_after(
        scheduler: Arc<VirtualScheduler>,
        delay: Duration,
        value: &'static str,
        complete: bool,
    ) -> Observable<&'static str> {
        use sidechain_scheduler::Scheduler;
        Observable::create(move |subscriber: Subscriber<&'static str>| {
            let sub = subscriber.clone();
            scheduler.schedule_with(
                subscriber.token(),
                scheduler.now() + delay,
                Box::new(move || {
                    sub.next(value);
                    if complete {
                        sub.complete();
                    }
                }),
            );
        })
    }

    fn collect(observable: Observable<&'static str>) -> (Arc<Mutex<Vec<String>>>, Subscription) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (l1, l2, l3) = (log.clone(), log.clone(), log.clone());
        let subscription = observable.subscribe(
            move |v| l1.lock().unwrap().push(v.to_string()),
            move |e| l2.lock().unwrap().push(format!("error {}", e)),
            move || l3.lock().unwrap().push("complete".to_string()),
        );
        (log, subscription)
    }

    #[test]
    fn test_fast_source_wins() {
        let scheduler = Arc::new(VirtualScheduler::new());
        let source = delayed(scheduler.clone(), Duration::from_millis(50), "fresh");
        let (log, _subscription) = collect(timeout_with_fallback(
            source,
            Duration::from_millis(100),
            Observable::just("stale"),
            scheduler.clone(),
        ));

        scheduler.advance_by(Duration::from_secs(1));
        assert_eq!(*log.lock().unwrap(), vec!["fresh", "complete"]);
    }

    #[test]
    fn test_silent_source_falls_back() {
        let scheduler = Arc::new(VirtualScheduler::new());
        let source = delayed(scheduler.clone(), Duration::from_millis(500), "late");
        let (log, _subscription) = collect(timeout_with_fallback(
            source,
            Duration::from_millis(100),
            Observable::from_values(vec!["cached-1", "cached-2"]),
            scheduler.clone(),
        ));

        scheduler.advance_by(Duration::from_secs(1));
        assert_eq!(*log.lock().unwrap(), vec!["cached-1", "cached-2", "complete"]);
    }

    #[test]
    fn test_value_then_silence_falls_back() {
        let scheduler = Arc::new(VirtualScheduler::new());
        let source = emit_after(scheduler.clone(), Duration::from_millis(50), "partial", false);
        let (log, _subscription) = collect(timeout_with_fallback(
            source,
            Duration::from_millis(100),
            Observable::just("fallback"),
            scheduler.clone(),
        ));

        scheduler.advance_by(Duration::from_millis(60));
        assert_eq!(*log.lock().unwrap(), vec!["partial"]);
        scheduler.advance_by(Duration::from_millis(40));
        assert_eq!(*log.lock().unwrap(), vec!["partial", "fallback", "complete"]);
    }

    #[test]
    fn test_never_source_falls_back() {
        let scheduler = Arc::new(VirtualScheduler::new());
        let (log, _subscription) = collect(timeout_with_fallback(
            Observable::never(),
            Duration::from_millis(100),
            Observable::just("fallback"),
            scheduler.clone(),
        ));

        scheduler.advance_by(Duration::from_millis(99));
        assert!(log.lock().unwrap().is_empty());
        scheduler.advance_by(Duration::from_millis(1));
        assert_eq!(*log.lock().unwrap(), vec!["fallback", "complete"]);
    }

    #[test]
    fn test_fallback_error_propagates() {
        let scheduler = Arc::new(VirtualScheduler::new());
        let (log, _subscription) = collect(timeout_with_fallback(
            Observable::never(),
            Duration::from_millis(10),
            Observable::fail(RxError::msg("offline")),
            scheduler.clone(),
        ));

        scheduler.advance_by(Duration::from_millis(20));
        assert_eq!(*log.lock().unwrap(), vec!["error offline"]);
    }

    #[test]
    fn test_source_error_before_timeout_propagates() {
        let scheduler = Arc::new(VirtualScheduler::new());
        let (log, _subscription) = collect(timeout_with_fallback(
            Observable::fail(RxError::msg("bad request")),
            Duration::from_millis(10),
            Observable::just("fallback"),
            scheduler.clone(),
        ));

        scheduler.advance_by(Duration::from_millis(20));
        assert_eq!(*log.lock().unwrap(), vec!["error bad request"]);
    }
}
