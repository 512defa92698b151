//! Debounced search
//!
//! Keystroke-driven queries are debounced, consecutive duplicates are
//! dropped, and each surviving query is mapped to a search whose results are
//! merged into the output.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use sidechain_scheduler::{CancellationToken, SharedScheduler};
use tracing::trace;

use crate::observable::Observable;
use crate::operators::observe_on::observe_on;
use crate::subscription::{FnObserver, Subscriber, Subscription};

type SearchFn<Q, R> = dyn Fn(Q) -> Observable<R> + Send + Sync;

struct DebounceState<Q> {
    pending: Option<CancellationToken>,
    last_dispatched: Option<Q>,
    /// Dispatched searches that have not completed yet
    searches: HashMap<u64, Option<Subscription>>,
}

struct Debouncer<Q, R> {
    search: Arc<SearchFn<Q, R>>,
    debounce: Duration,
    scheduler: SharedScheduler,
    downstream: Subscriber<R>,
    state: Mutex<DebounceState<Q>>,
    queries_done: AtomicBool,
    next_search: AtomicU64,
}

impl<Q, R> Debouncer<Q, R>
where
    Q: Clone + PartialEq + Send + Sync + 'static,
    R: Send + 'static,
{
    fn on_query(self: &Arc<Self>, query: Q) {
        let token = self.downstream.token().child();
        let previous = self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pending
            .replace(token.clone());
        if let Some(previous) = previous {
            previous.cancel();
        }

        let debouncer = self.clone();
        let fire_token = token.clone();
        self.scheduler.schedule_with(
            token,
            self.scheduler.now() + self.debounce,
            Box::new(move || debouncer.fire(query, &fire_token)),
        );
    }

    fn fire(self: &Arc<Self>, query: Q, token: &CancellationToken) {
        let dispatch = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if state.pending.as_ref().is_some_and(|pending| pending.same_as(token)) {
                state.pending = None;
            }
            if state.last_dispatched.as_ref() == Some(&query) {
                false
            } else {
                state.last_dispatched = Some(query.clone());
                true
            }
        };

        if !dispatch {
            trace!("Dropping duplicate query");
            self.complete_if_idle();
            return;
        }

        let id = self.next_search.fetch_add(1, Ordering::Relaxed);
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .searches
            .insert(id, None);

        let (next_sub, error_sub) = (self.downstream.clone(), self.downstream.clone());
        let debouncer = self.clone();
        let subscription = (self.search)(query).subscribe_with(Arc::new(FnObserver::new(
            move |result: R| next_sub.next(result),
            move |error| error_sub.error(error),
            move || debouncer.on_search_done(id),
        )));

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = state.searches.get_mut(&id) {
            *slot = Some(subscription);
        }
    }

    fn on_search_done(&self, id: u64) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .searches
            .remove(&id);
        self.complete_if_idle();
    }

    fn on_queries_done(&self) {
        self.queries_done.store(true, Ordering::Release);
        self.complete_if_idle();
    }

    fn complete_if_idle(&self) {
        if !self.queries_done.load(Ordering::Acquire) {
            return;
        }
        let idle = {
            let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.pending.is_none() && state.searches.is_empty()
        };
        if idle {
            self.downstream.complete();
        }
    }

    fn teardown(&self) {
        let (pending, searches) = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            (state.pending.take(), std::mem::take(&mut state.searches))
        };
        if let Some(pending) = pending {
            pending.cancel();
        }
        for subscription in searches.into_values().flatten() {
            subscription.unsubscribe();
        }
    }
}

/// Debounce `queries`, skip repeats, and run `search` for each survivor
///
/// A query is dispatched once no newer query has arrived for `debounce`. A
/// query equal to the last dispatched one is dropped. Results of every
/// dispatched search are merged and delivered through `scheduler`. The output
/// completes once the query stream has completed and every search has
/// finished; any failure ends it.
pub fn debounced_search<Q, R>(
    queries: Observable<Q>,
    search: impl Fn(Q) -> Observable<R> + Send + Sync + 'static,
    debounce: Duration,
    scheduler: SharedScheduler,
) -> Observable<R>
where
    Q: Clone + PartialEq + Send + Sync + 'static,
    R: Send + 'static,
{
    let search: Arc<SearchFn<Q, R>> = Arc::new(search);
    let timer_scheduler = scheduler.clone();
    let searching = Observable::create(move |downstream: Subscriber<R>| {
        let debouncer = Arc::new(Debouncer {
            search: search.clone(),
            debounce,
            scheduler: timer_scheduler.clone(),
            downstream: downstream.clone(),
            state: Mutex::new(DebounceState {
                pending: None,
                last_dispatched: None,
                searches: HashMap::new(),
            }),
            queries_done: AtomicBool::new(false),
            next_search: AtomicU64::new(0),
        });

        let (query_d, error_d, done_d) = (debouncer.clone(), debouncer.clone(), debouncer.clone());
        let upstream = queries.subscribe_with(Arc::new(FnObserver::new(
            move |query: Q| query_d.on_query(query),
            move |error| error_d.downstream.error(error),
            move || done_d.on_queries_done(),
        )));

        downstream.add(move || {
            upstream.unsubscribe();
            debouncer.teardown();
        });
    });
    observe_on(searching, scheduler)
}
