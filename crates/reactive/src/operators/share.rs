//! Ref-counted multicast with replay of the latest value

use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use crate::error::RxError;
use crate::observable::Observable;
use crate::subscription::{FnObserver, Subscriber, Subscription};

struct Connection<T> {
    observers: Vec<(u64, Subscriber<T>)>,
    latest: Option<T>,
    upstream: Option<Subscription>,
    connecting: bool,
    /// Bumped on every disconnect so events from a dead upstream are ignored
    generation: u64,
    next_id: u64,
}

struct Shared<T> {
    source: Observable<T>,
    connection: Mutex<Connection<T>>,
}

impl<T: Clone + Send + Sync + 'static> Shared<T> {
    fn lock(&self) -> std::sync::MutexGuard<'_, Connection<T>> {
        self.connection.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn join(self: &Arc<Self>, subscriber: Subscriber<T>) {
        let (id, replay, connect) = {
            let mut conn = self.lock();
            let id = conn.next_id;
            conn.next_id += 1;
            conn.observers.push((id, subscriber.clone()));

            let connect = if conn.upstream.is_none() && !conn.connecting {
                conn.connecting = true;
                Some(conn.generation)
            } else {
                None
            };
            (id, conn.latest.clone(), connect)
        };

        if let Some(value) = replay {
            subscriber.next(value);
        }

        let shared = self.clone();
        subscriber.add(move || shared.leave(id));

        if let Some(generation) = connect {
            self.connect(generation);
        }
    }

    fn connect(self: &Arc<Self>, generation: u64) {
        debug!(generation, "Connecting shared source");
        let (on_next, on_error, on_done) = (self.clone(), self.clone(), self.clone());
        let upstream = self.source.subscribe_with(Arc::new(FnObserver::new(
            move |value: T| on_next.broadcast(generation, value),
            move |error| on_error.terminate(generation, Some(error)),
            move || on_done.terminate(generation, None),
        )));

        let stale = {
            let mut conn = self.lock();
            if conn.generation == generation && conn.connecting {
                conn.connecting = false;
                conn.upstream = Some(upstream);
                None
            } else {
                Some(upstream)
            }
        };
        if let Some(stale) = stale {
            stale.unsubscribe();
        }
    }

    fn broadcast(&self, generation: u64, value: T) {
        let observers: Vec<Subscriber<T>> = {
            let mut conn = self.lock();
            if conn.generation != generation {
                return;
            }
            conn.latest = Some(value.clone());
            conn.observers.iter().map(|(_, s)| s.clone()).collect()
        };
        for observer in observers {
            observer.next(value.clone());
        }
    }

    fn terminate(&self, generation: u64, error: Option<RxError>) {
        let observers = {
            let mut conn = self.lock();
            if conn.generation != generation {
                return;
            }
            conn.generation += 1;
            conn.latest = None;
            conn.connecting = false;
            conn.upstream = None;
            std::mem::take(&mut conn.observers)
        };

        debug!(observers = observers.len(), failed = error.is_some(), "Shared source terminated");
        for (_, observer) in observers {
            match &error {
                Some(error) => observer.error(error.clone()),
                None => observer.complete(),
            }
        }
    }

    fn leave(&self, id: u64) {
        let upstream = {
            let mut conn = self.lock();
            conn.observers.retain(|(observer_id, _)| *observer_id != id);
            if !conn.observers.is_empty() || (conn.upstream.is_none() && !conn.connecting) {
                return;
            }
            conn.generation += 1;
            conn.latest = None;
            conn.connecting = false;
            conn.upstream.take()
        };

        debug!("Last subscriber left, disconnecting shared source");
        if let Some(upstream) = upstream {
            upstream.unsubscribe();
        }
    }
}

/// Share one subscription to `source` among all current subscribers
///
/// The first subscriber connects to `source`; later subscribers join the
/// running connection and immediately receive the latest value it produced.
/// When the last subscriber leaves, or `source` terminates, the connection is
/// dropped and the next subscriber starts a fresh one.
///
/// # Example
///
/// ```
/// use sidechain_reactive::operators::share_replay;
/// use sidechain_reactive::{Observable, StateSubject};
/// use std::sync::{Arc, Mutex};
///
/// let feed = StateSubject::new(1);
/// let shared = share_replay(feed.as_observable());
///
/// let a = shared.subscribe(|_| {}, |_| {}, || {});
/// let late = Arc::new(Mutex::new(Vec::new()));
/// let sink = late.clone();
/// let b = shared.subscribe(move |v| sink.lock().unwrap().push(v), |_| {}, || {});
///
/// feed.next(2);
/// assert_eq!(*late.lock().unwrap(), vec![1, 2]);
/// assert_eq!(feed.subscriber_count(), 1);
///
/// a.unsubscribe();
/// b.unsubscribe();
/// assert_eq!(feed.subscriber_count(), 0);
/// ```
pub fn share_replay<T: Clone + Send + Sync + 'static>(source: Observable<T>) -> Observable<T> {
    let shared = Arc::new(Shared {
        source,
        connection: Mutex::new(Connection {
            observers: Vec::new(),
            latest: None,
            upstream: None,
            connecting: false,
            generation: 0,
            next_id: 0,
        }),
    });
    Observable::create(move |subscriber: Subscriber<T>| shared.join(subscriber))
}
