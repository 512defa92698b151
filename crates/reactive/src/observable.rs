//! Cold observable streams

use std::sync::Arc;

use crate::error::RxError;
use crate::subscription::{FnObserver, Observer, Subscriber, Subscription};

type SubscribeFn<T> = dyn Fn(Subscriber<T>) + Send + Sync;

/// A cold, lazily started stream of values
///
/// Nothing happens until [`Observable::subscribe_with`] is called; every
/// subscription runs the producer again. The producer receives a
/// [`Subscriber`] and may emit synchronously or hand it to another thread.
///
/// # Example
///
/// ```
/// use sidechain_reactive::Observable;
/// use std::sync::{Arc, Mutex};
///
/// let seen = Arc::new(Mutex::new(Vec::new()));
/// let sink = seen.clone();
///
/// Observable::from_values(vec![1, 2, 3])
///     .map(|v| v * 10)
///     .subscribe(move |v| sink.lock().unwrap().push(v), |_| {}, || {});
///
/// assert_eq!(*seen.lock().unwrap(), vec![10, 20, 30]);
/// ```
pub struct Observable<T> {
    producer: Arc<SubscribeFn<T>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            producer: self.producer.clone(),
        }
    }
}

impl<T: Send + 'static> Observable<T> {
    /// Create an observable from a producer function
    pub fn create(producer: impl Fn(Subscriber<T>) + Send + Sync + 'static) -> Self {
        Self {
            producer: Arc::new(producer),
        }
    }

    /// Emit one value, then complete
    pub fn just(value: T) -> Self
    where
        T: Clone + Sync,
    {
        Self::create(move |subscriber| {
            subscriber.next(value.clone());
            subscriber.complete();
        })
    }

    /// Emit every item in order, then complete
    pub fn from_values(items: Vec<T>) -> Self
    where
        T: Clone + Sync,
    {
        Self::create(move |subscriber| {
            for item in &items {
                if subscriber.is_closed() {
                    return;
                }
                subscriber.next(item.clone());
            }
            subscriber.complete();
        })
    }

    /// Fail immediately with `error`
    pub fn fail(error: RxError) -> Self {
        Self::create(move |subscriber| subscriber.error(error.clone()))
    }

    /// Complete immediately
    pub fn empty() -> Self {
        Self::create(|subscriber| subscriber.complete())
    }

    /// Never emit anything
    pub fn never() -> Self {
        Self::create(|_| {})
    }

    /// Build a fresh observable per subscription
    pub fn defer(factory: impl Fn() -> Observable<T> + Send + Sync + 'static) -> Self {
        Self::create(move |subscriber| {
            let inner = factory().subscribe_with(Arc::new(subscriber.clone()));
            subscriber.add(move || inner.unsubscribe());
        })
    }

    /// Transform every value
    pub fn map<U: Send + 'static>(
        &self,
        f: impl Fn(T) -> U + Send + Sync + 'static,
    ) -> Observable<U> {
        let source = self.clone();
        let f = Arc::new(f);
        Observable::create(move |subscriber: Subscriber<U>| {
            let f = f.clone();
            let (on_next, on_error, on_complete) =
                (subscriber.clone(), subscriber.clone(), subscriber.clone());
            let upstream = source.subscribe_with(Arc::new(FnObserver::new(
                move |value: T| on_next.next(f(value)),
                move |error| on_error.error(error),
                move || on_complete.complete(),
            )));
            subscriber.add(move || upstream.unsubscribe());
        })
    }

    /// Start the stream, delivering to `observer`
    pub fn subscribe_with(&self, observer: Arc<dyn Observer<T>>) -> Subscription {
        let subscription = Subscription::new();
        (self.producer)(Subscriber::new(observer, subscription.clone()));
        subscription
    }

    /// Start the stream with closure callbacks
    pub fn subscribe(
        &self,
        on_next: impl Fn(T) + Send + Sync + 'static,
        on_error: impl Fn(RxError) + Send + Sync + 'static,
        on_complete: impl Fn() + Send + Sync + 'static,
    ) -> Subscription {
        self.subscribe_with(Arc::new(FnObserver::new(on_next, on_error, on_complete)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[test]
    fn test_cold_observable_runs_per_subscription() {
        let runs = Arc::new(AtomicUsize::new(0));
        let runs_clone = runs.clone();
        let source = Observable::create(move |subscriber: Subscriber<usize>| {
            let n = runs_clone.fetch_add(1, Ordering::SeqCst);
            subscriber.next(n);
            subscriber.complete();
        });

        assert_eq!(runs.load(Ordering::SeqCst), 0);
        let seen = Arc::new(Mutex::new(Vec::new()));
        for _ in 0..2 {
            let sink = seen.clone();
            source.subscribe(move |v| sink.lock().unwrap().push(v), |_| {}, || {});
        }
        assert_eq!(*seen.lock().unwrap(), vec![0, 1]);
    }

    #[test]
    fn test_fail_delivers_error() {
        let error = RxError::msg("boom");
        let received = Arc::new(Mutex::new(None));
        let sink = received.clone();
        let subscription = Observable::<u8>::fail(error.clone()).subscribe(
            |_| {},
            move |e| *sink.lock().unwrap() = Some(e),
            || {},
        );

        assert!(received.lock().unwrap().as_ref().unwrap().ptr_eq(&error));
        assert!(subscription.is_closed());
    }

    #[test]
    fn test_map_propagates_unsubscribe_upstream() {
        let torn_down = Arc::new(AtomicUsize::new(0));
        let torn_clone = torn_down.clone();
        let source = Observable::create(move |subscriber: Subscriber<u8>| {
            let torn = torn_clone.clone();
            subscriber.add(move || {
                torn.fetch_add(1, Ordering::SeqCst);
            });
        });

        let subscription = source.map(|v| v as u32).subscribe(|_| {}, |_| {}, || {});
        assert_eq!(torn_down.load(Ordering::SeqCst), 0);
        subscription.unsubscribe();
        assert_eq!(torn_down.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_defer_builds_on_subscribe() {
        let built = Arc::new(AtomicUsize::new(0));
        let built_clone = built.clone();
        let deferred = Observable::defer(move || {
            built_clone.fetch_add(1, Ordering::SeqCst);
            Observable::just("fresh")
        });

        assert_eq!(built.load(Ordering::SeqCst), 0);
        let completed = Arc::new(AtomicUsize::new(0));
        let completed_clone = completed.clone();
        deferred.subscribe(
            |v| assert_eq!(v, "fresh"),
            |_| {},
            move || {
                completed_clone.fetch_add(1, Ordering::SeqCst);
            },
        );
        assert_eq!(built.load(Ordering::SeqCst), 1);
        assert_eq!(completed.load(Ordering::SeqCst), 1);
    }
}
