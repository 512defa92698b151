//! Reactive state container
//!
//! [`StateSubject`] holds one current value and notifies subscribers whenever
//! it is replaced. New subscribers are called with the current value before
//! `subscribe` returns. Callbacks always run outside the subject's locks, so a
//! callback may read the subject or subscribe to it again.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use tracing::trace;

use crate::observable::Observable;

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct SubjectState<T> {
    value: RwLock<T>,
    subscribers: RwLock<Vec<(u64, Callback<T>)>>,
    next_id: AtomicU64,
}

impl<T> SubjectState<T> {
    fn remove(&self, id: u64) {
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(sub_id, _)| *sub_id != id);
    }
}

/// Handle returned by [`StateSubject::subscribe`] and [`StateSubject::select`]
///
/// Dropping the handle keeps the subscription alive; call
/// [`Unsubscribe::unsubscribe`] to stop receiving values.
#[must_use = "dropping the handle leaves the callback subscribed"]
pub struct Unsubscribe {
    release: Box<dyn FnOnce() + Send + 'static>,
}

impl Unsubscribe {
    /// Remove the callback; no further values are delivered to it
    pub fn unsubscribe(self) {
        (self.release)()
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unsubscribe").finish_non_exhaustive()
    }
}

/// Thread-safe holder of a current value with change notification
///
/// Clones share the same state.
///
/// # Example
///
/// ```
/// use sidechain_reactive::StateSubject;
/// use std::sync::{Arc, Mutex};
///
/// #[derive(Clone, Default)]
/// struct Auth {
///     logged_in: bool,
///     username: String,
/// }
///
/// let auth = StateSubject::new(Auth::default());
/// let changes = Arc::new(Mutex::new(Vec::new()));
///
/// let sink = changes.clone();
/// let handle = auth.select(
///     |state: &Auth| state.logged_in,
///     move |logged_in: &bool| sink.lock().unwrap().push(*logged_in),
/// );
///
/// auth.update(|s| Auth { username: "kai".into(), ..s.clone() });
/// auth.update(|s| Auth { logged_in: true, ..s.clone() });
///
/// assert_eq!(*changes.lock().unwrap(), vec![false, true]);
/// handle.unsubscribe();
/// ```
pub struct StateSubject<T> {
    state: Arc<SubjectState<T>>,
}

impl<T> Clone for StateSubject<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> StateSubject<T> {
    /// Create a subject holding `initial`
    pub fn new(initial: T) -> Self {
        Self {
            state: Arc::new(SubjectState {
                value: RwLock::new(initial),
                subscribers: RwLock::new(Vec::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Snapshot of the current value
    pub fn get_value(&self) -> T {
        self.state
            .value
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the value and notify every subscriber, in subscription order
    pub fn next(&self, value: T) {
        let snapshot = {
            let mut current = self
                .state
                .value
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            *current = value;
            current.clone()
        };
        self.notify(&snapshot);
    }

    /// Replace the value with `transform(current)` and notify
    ///
    /// The read and the write happen under one lock, so concurrent updates
    /// are never lost. `transform` must not call back into this subject.
    pub fn update(&self, transform: impl FnOnce(&T) -> T) {
        let snapshot = {
            let mut current = self
                .state
                .value
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            let updated = transform(&current);
            *current = updated;
            current.clone()
        };
        self.notify(&snapshot);
    }

    /// Call `callback` with the current value now and with every later value
    pub fn subscribe(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> Unsubscribe {
        let callback: Callback<T> = Arc::new(callback);
        let id = self.state.next_id.fetch_add(1, Ordering::Relaxed);
        self.state
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, callback.clone()));

        let current = self.get_value();
        callback(&current);

        let weak: Weak<SubjectState<T>> = Arc::downgrade(&self.state);
        Unsubscribe {
            release: Box::new(move || {
                if let Some(state) = weak.upgrade() {
                    state.remove(id);
                }
            }),
        }
    }

    /// Subscribe to a projection of the value
    ///
    /// `callback` fires with the initial projection and then only when the
    /// projection differs from the last one delivered.
    pub fn select<U>(
        &self,
        selector: impl Fn(&T) -> U + Send + Sync + 'static,
        callback: impl Fn(&U) + Send + Sync + 'static,
    ) -> Unsubscribe
    where
        U: PartialEq + Clone + Send + 'static,
    {
        let previous: Mutex<Option<U>> = Mutex::new(None);
        self.subscribe(move |value| {
            let projected = selector(value);
            let changed = {
                let mut previous = previous.lock().unwrap_or_else(PoisonError::into_inner);
                if previous.as_ref() == Some(&projected) {
                    false
                } else {
                    *previous = Some(projected.clone());
                    true
                }
            };
            if changed {
                callback(&projected);
            }
        })
    }

    /// Stream of values, starting with the current one
    ///
    /// Never completes; disposing the subscription unsubscribes from the
    /// subject.
    pub fn as_observable(&self) -> Observable<T> {
        let subject = self.clone();
        Observable::create(move |subscriber| {
            let sink = subscriber.clone();
            let handle = subject.subscribe(move |value| sink.next(value.clone()));
            subscriber.add(move || handle.unsubscribe());
        })
    }

    /// Number of registered callbacks
    pub fn subscriber_count(&self) -> usize {
        self.state
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn notify(&self, value: &T) {
        let callbacks: Vec<Callback<T>> = self
            .state
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, callback)| callback.clone())
            .collect();

        trace!(subscribers = callbacks.len(), "Notifying state subscribers");
        for callback in callbacks {
            callback(value);
        }
    }
}

impl<T: Clone + Default + Send + Sync + 'static> Default for StateSubject<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for StateSubject<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = self.state.value.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("StateSubject").field("value", &*value).finish()
    }
}
