//! Cross-crate behaviour of subjects, combinators and schedulers

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use rand::Rng;
use sidechain_reactive::operators::{
    observe_on, poll, retry_with_backoff, share_replay, timeout_with_fallback, RetryConfig,
};
use sidechain_reactive::{Observable, RxError, StateSubject, Subscriber};
use sidechain_scheduler::{EventLoop, MainThreadScheduler, Scheduler, VirtualScheduler};

#[derive(Clone, Debug, Default, PartialEq)]
struct Pair {
    a: u32,
    b: u32,
}

#[test]
fn subject_notifies_each_live_subscriber_once_in_order() {
    let subject = StateSubject::new(0u32);
    let log = Arc::new(Mutex::new(Vec::new()));

    let handles: Vec<_> = (0..4)
        .map(|id| {
            let log = log.clone();
            subject.subscribe(move |v: &u32| log.lock().unwrap().push((id, *v)))
        })
        .collect();
    assert_eq!(log.lock().unwrap().len(), 4);
    log.lock().unwrap().clear();

    let mut rng = rand::thread_rng();
    let value: u32 = rng.gen_range(1..1000);
    subject.next(value);
    assert_eq!(
        *log.lock().unwrap(),
        vec![(0, value), (1, value), (2, value), (3, value)]
    );

    let mut handles = handles.into_iter();
    handles.next().unwrap().unsubscribe();
    log.lock().unwrap().clear();
    subject.next(value + 1);
    let ids: Vec<_> = log.lock().unwrap().iter().map(|(id, _)| *id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
}

#[test]
fn selector_fires_only_when_projection_changes() {
    let subject = StateSubject::new(Pair::default());
    let fired = Arc::new(Mutex::new(Vec::new()));
    let sink = fired.clone();
    let _handle = subject.select(|p: &Pair| p.a, move |a: &u32| sink.lock().unwrap().push(*a));

    let mut rng = rand::thread_rng();
    for _ in 0..20 {
        let b = rng.gen::<u32>();
        subject.update(|p| Pair { b, ..p.clone() });
    }
    subject.update(|p| Pair { a: 1, ..p.clone() });

    assert_eq!(*fired.lock().unwrap(), vec![0, 1]);
}

#[test]
fn retry_recovers_with_growing_capped_delays() {
    let scheduler = Arc::new(VirtualScheduler::new());
    let attempts = Arc::new(Mutex::new(Vec::new()));
    let (log, clock) = (attempts.clone(), scheduler.clone());
    let source = Observable::defer(move || {
        let mut log = log.lock().unwrap();
        log.push(clock.now());
        if log.len() <= 2 {
            Observable::fail(RxError::msg("transient"))
        } else {
            Observable::just(42)
        }
    });

    let config = RetryConfig::default()
        .with_max_retries(3)
        .with_initial_delay(Duration::from_millis(200))
        .with_multiplier(4.0)
        .with_max_delay(Duration::from_millis(500));

    let result = Arc::new(Mutex::new(None));
    let sink = result.clone();
    let _subscription = retry_with_backoff(source, config, scheduler.clone()).subscribe(
        move |v| *sink.lock().unwrap() = Some(v),
        |e| panic!("unexpected failure: {}", e),
        || {},
    );

    scheduler.advance_by(Duration::from_secs(5));
    assert_eq!(*result.lock().unwrap(), Some(42));

    let starts = attempts.lock().unwrap().clone();
    assert_eq!(starts.len(), 3);
    assert_eq!(starts[1] - starts[0], Duration::from_millis(200));
    assert_eq!(starts[2] - starts[1], Duration::from_millis(500));
}

#[test]
fn timeout_delivers_fallback_and_drops_late_source() {
    let scheduler = Arc::new(VirtualScheduler::new());
    let late_source: Arc<Mutex<Option<Subscriber<&'static str>>>> = Arc::new(Mutex::new(None));
    let slot = late_source.clone();
    let silent = Observable::create(move |subscriber: Subscriber<&'static str>| {
        *slot.lock().unwrap() = Some(subscriber);
    });

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let _subscription = timeout_with_fallback(
        silent,
        Duration::from_secs(5),
        Observable::just("cached"),
        scheduler.clone(),
    )
    .subscribe(move |v| sink.lock().unwrap().push(v), |_| {}, || {});

    scheduler.advance_by(Duration::from_secs(6));
    if let Some(source) = late_source.lock().unwrap().as_ref() {
        source.next("network");
    }
    scheduler.run_due();

    assert_eq!(*seen.lock().unwrap(), vec!["cached"]);
}

#[test]
fn share_opens_one_upstream_for_two_subscribers() {
    let upstream_count = Arc::new(AtomicUsize::new(0));
    let counter = upstream_count.clone();
    let source = Observable::create(move |_subscriber: Subscriber<u8>| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let shared = share_replay(source);

    let a = shared.subscribe(|_| {}, |_| {}, || {});
    let b = shared.subscribe(|_| {}, |_| {}, || {});
    assert_eq!(upstream_count.load(Ordering::SeqCst), 1);

    a.unsubscribe();
    b.unsubscribe();
}

#[test]
fn main_thread_scheduler_delivers_on_designated_thread() {
    let event_loop = EventLoop::new();
    event_loop.bind_current_thread();
    let scheduler = Arc::new(MainThreadScheduler::new(Arc::new(event_loop.clone())).unwrap());
    let main_thread = thread::current().id();

    let source = Observable::create(|subscriber: Subscriber<u32>| {
        thread::spawn(move || {
            for i in 0..3 {
                subscriber.next(i);
            }
            subscriber.complete();
        });
    });

    let received = Arc::new(Mutex::new(Vec::new()));
    let done = Arc::new(AtomicUsize::new(0));
    let (sink, finished) = (received.clone(), done.clone());
    let _subscription = observe_on(source, scheduler.clone()).subscribe(
        move |v| sink.lock().unwrap().push((v, thread::current().id())),
        |_| {},
        move || {
            finished.store(1, Ordering::SeqCst);
        },
    );

    assert!(event_loop.run_until(Duration::from_secs(5), || done.load(Ordering::SeqCst) == 1));
    let received = received.lock().unwrap();
    assert_eq!(received.iter().map(|(v, _)| *v).collect::<Vec<_>>(), vec![0, 1, 2]);
    assert!(received.iter().all(|(_, id)| *id == main_thread));
}

#[test]
fn poll_on_real_scheduler_runs_until_disposed() {
    let event_loop = EventLoop::new();
    event_loop.bind_current_thread();
    let scheduler = Arc::new(MainThreadScheduler::new(Arc::new(event_loop.clone())).unwrap());

    let ticks = Arc::new(AtomicUsize::new(0));
    let counter = ticks.clone();
    let subscription = poll(
        Duration::from_millis(10),
        move || Observable::just(counter.fetch_add(1, Ordering::SeqCst)),
        scheduler.clone(),
    )
    .subscribe(|_| {}, |_| {}, || {});

    let start = Instant::now();
    assert!(event_loop.run_until(Duration::from_secs(5), || ticks.load(Ordering::SeqCst) >= 3));
    subscription.unsubscribe();
    let after_dispose = ticks.load(Ordering::SeqCst);

    event_loop.run_until(Duration::from_millis(50), || false);
    assert_eq!(ticks.load(Ordering::SeqCst), after_dispose);
    assert!(start.elapsed() >= Duration::from_millis(20));
}
