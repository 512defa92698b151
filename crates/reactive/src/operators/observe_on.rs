//! Move delivery onto a scheduler

use std::sync::Arc;

use sidechain_scheduler::SharedScheduler;

use crate::observable::Observable;
use crate::subscription::{FnObserver, Subscriber};

/// Re-deliver every event of `source` through `scheduler`
///
/// Events keep their relative order. Events still queued when the downstream
/// subscription is disposed are dropped.
pub fn observe_on<T: Send + 'static>(
    source: Observable<T>,
    scheduler: SharedScheduler,
) -> Observable<T> {
    Observable::create(move |subscriber: Subscriber<T>| {
        let token = subscriber.token();

        let (sched_next, sub_next, token_next) =
            (scheduler.clone(), subscriber.clone(), token.clone());
        let (sched_err, sub_err, token_err) =
            (scheduler.clone(), subscriber.clone(), token.clone());
        let (sched_done, sub_done, token_done) = (scheduler.clone(), subscriber.clone(), token);

        let upstream = source.subscribe_with(Arc::new(FnObserver::new(
            move |value: T| {
                let sub = sub_next.clone();
                sched_next.schedule_with(
                    token_next.clone(),
                    sched_next.now(),
                    Box::new(move || sub.next(value)),
                );
            },
            move |error| {
                let sub = sub_err.clone();
                sched_err.schedule_with(
                    token_err.clone(),
                    sched_err.now(),
                    Box::new(move || sub.error(error)),
                );
            },
            move || {
                let sub = sub_done.clone();
                sched_done.schedule_with(
                    token_done.clone(),
                    sched_done.now(),
                    Box::new(move || sub.complete()),
                );
            },
        )));
        subscriber.add(move || upstream.unsubscribe());
    })
}
