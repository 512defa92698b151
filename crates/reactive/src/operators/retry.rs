//! Retry with exponential backoff

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use sidechain_scheduler::SharedScheduler;
use tracing::{error, warn};

use crate::error::RxError;
use crate::observable::Observable;
use crate::operators::observe_on::observe_on;
use crate::subscription::{FnObserver, Subscriber, Subscription};

/// Decides whether a failure is worth retrying
pub type RetryPredicate = Arc<dyn Fn(&RxError) -> bool + Send + Sync>;

/// Backoff policy for [`retry_with_backoff`]
///
/// The delay before retry `n` (1-based) is
/// `min(initial_delay * multiplier^(n - 1), max_delay)`.
#[derive(Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt; 0 disables retrying
    pub max_retries: u32,

    /// Delay before the first retry
    pub initial_delay: Duration,

    /// Upper bound for any single delay
    pub max_delay: Duration,

    /// Growth factor between consecutive delays
    pub multiplier: f64,

    /// Only failures accepted by this predicate are retried
    pub should_retry: Option<RetryPredicate>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            multiplier: 2.0,
            should_retry: None,
        }
    }
}

impl RetryConfig {
    /// More attempts, shorter delays: interactive requests
    pub fn aggressive() -> Self {
        Self {
            max_retries: 5,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_millis(10_000),
            multiplier: 1.5,
            should_retry: None,
        }
    }

    /// Fewer attempts, long delays: background work
    pub fn conservative() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(2000),
            max_delay: Duration::from_millis(60_000),
            multiplier: 3.0,
            should_retry: None,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Retry only failures for which `predicate` returns true
    pub fn with_should_retry(
        mut self,
        predicate: impl Fn(&RxError) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.should_retry = Some(Arc::new(predicate));
        self
    }

    /// Delay before retry number `attempt` (1-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let nanos = self.initial_delay.as_nanos() as f64 * self.multiplier.powi(exponent);
        let cap = self.max_delay.as_nanos() as f64;
        if !nanos.is_finite() || nanos >= cap {
            return self.max_delay;
        }
        Duration::from_nanos(nanos.max(0.0).round() as u64).min(self.max_delay)
    }

    fn accepts(&self, error: &RxError) -> bool {
        self.should_retry
            .as_ref()
            .map_or(true, |predicate| predicate(error))
    }
}

impl fmt::Debug for RetryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryConfig")
            .field("max_retries", &self.max_retries)
            .field("initial_delay", &self.initial_delay)
            .field("max_delay", &self.max_delay)
            .field("multiplier", &self.multiplier)
            .field("should_retry", &self.should_retry.is_some())
            .finish()
    }
}

struct RetryRun<T> {
    source: Observable<T>,
    config: RetryConfig,
    scheduler: SharedScheduler,
    downstream: Subscriber<T>,
    retries: AtomicU32,
    current: Mutex<Option<(u32, Subscription)>>,
}

impl<T: Send + 'static> RetryRun<T> {
    fn attempt(self: &Arc<Self>, number: u32) {
        if self.downstream.is_closed() {
            return;
        }

        let (next_sub, done_sub) = (self.downstream.clone(), self.downstream.clone());
        let run = self.clone();
        let subscription = self.source.subscribe_with(Arc::new(FnObserver::new(
            move |value: T| next_sub.next(value),
            move |failure| run.on_failure(failure),
            move || done_sub.complete(),
        )));

        let stale = {
            let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
            match current.as_ref() {
                Some((latest, _)) if *latest > number => Some(subscription),
                _ => current.replace((number, subscription)).map(|(_, old)| old),
            }
        };
        if let Some(stale) = stale {
            stale.unsubscribe();
        }
    }

    fn on_failure(self: &Arc<Self>, failure: RxError) {
        if self.downstream.is_closed() {
            return;
        }

        let retry = self.retries.fetch_add(1, Ordering::AcqRel) + 1;
        if retry > self.config.max_retries || !self.config.accepts(&failure) {
            error!(
                attempts = retry,
                error = %failure,
                "Giving up after retries"
            );
            self.downstream.error(failure);
            return;
        }

        let delay = self.config.delay_for_attempt(retry);
        warn!(
            retry,
            max_retries = self.config.max_retries,
            delay_ms = delay.as_millis() as u64,
            error = %failure,
            "Retrying after failure"
        );

        let run = self.clone();
        self.scheduler.schedule_with(
            self.downstream.token(),
            self.scheduler.now() + delay,
            Box::new(move || run.attempt(retry)),
        );
    }

    fn teardown(&self) {
        let current = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some((_, subscription)) = current {
            subscription.unsubscribe();
        }
    }
}

/// Resubscribe to `source` after failures, waiting longer each time
///
/// Values from failed attempts are still delivered. Once retries are
/// exhausted (or the predicate rejects a failure) the last failure is
/// propagated unchanged. All events are delivered through `scheduler`.
///
/// # Example
///
/// ```
/// use sidechain_reactive::operators::{retry_with_backoff, RetryConfig};
/// use sidechain_reactive::{Observable, RxError};
/// use sidechain_scheduler::VirtualScheduler;
/// use std::sync::atomic::{AtomicU32, Ordering};
/// use std::sync::{Arc, Mutex};
/// use std::time::Duration;
///
/// let scheduler = Arc::new(VirtualScheduler::new());
/// let calls = Arc::new(AtomicU32::new(0));
/// let counter = calls.clone();
/// let flaky = Observable::defer(move || {
///     if counter.fetch_add(1, Ordering::SeqCst) < 2 {
///         Observable::fail(RxError::msg("503"))
///     } else {
///         Observable::just("ok")
///     }
/// });
///
/// let result = Arc::new(Mutex::new(None));
/// let sink = result.clone();
/// let _subscription = retry_with_backoff(flaky, RetryConfig::default(), scheduler.clone())
///     .subscribe(move |v| *sink.lock().unwrap() = Some(v), |_| {}, || {});
///
/// scheduler.advance_by(Duration::from_secs(3));
/// assert_eq!(*result.lock().unwrap(), Some("ok"));
/// ```
pub fn retry_with_backoff<T: Send + 'static>(
    source: Observable<T>,
    config: RetryConfig,
    scheduler: SharedScheduler,
) -> Observable<T> {
    let retry_scheduler = scheduler.clone();
    let retrying = Observable::create(move |downstream: Subscriber<T>| {
        let run = Arc::new(RetryRun {
            source: source.clone(),
            config: config.clone(),
            scheduler: retry_scheduler.clone(),
            downstream: downstream.clone(),
            retries: AtomicU32::new(0),
            current: Mutex::new(None),
        });
        run.attempt(0);
        downstream.add(move || run.teardown());
    });
    observe_on(retrying, scheduler)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sidechain_scheduler::{Scheduler, VirtualScheduler};
    use std::time::Instant;

    struct Flaky {
        attempts: Arc<Mutex<Vec<Instant>>>,
        source: Observable<&'static str>,
    }

    fn flaky(failures: usize, scheduler: Arc<VirtualScheduler>, error: RxError) -> Flaky {
        let attempts = Arc::new(Mutex::new(Vec::new()));
        let log = attempts.clone();
        let source = Observable::defer(move || {
            let mut log = log.lock().unwrap();
            log.push(scheduler.now());
            if log.len() <= failures {
                Observable::fail(error.clone())
            } else {
                Observable::just("payload")
            }
        });
        Flaky { attempts, source }
    }

    fn gaps(attempts: &[Instant]) -> Vec<Duration> {
        attempts.windows(2).map(|w| w[1] - w[0]).collect()
    }

    #[test]
    fn test_presets() {
        let default = RetryConfig::default();
        assert_eq!(default.max_retries, 3);
        assert_eq!(default.initial_delay, Duration::from_millis(1000));
        assert_eq!(default.max_delay, Duration::from_millis(30_000));
        assert_eq!(default.multiplier, 2.0);

        let aggressive = RetryConfig::aggressive();
        assert_eq!(aggressive.max_retries, 5);
        assert_eq!(aggressive.initial_delay, Duration::from_millis(500));
        assert_eq!(aggressive.max_delay, Duration::from_millis(10_000));
        assert_eq!(aggressive.multiplier, 1.5);

        let conservative = RetryConfig::conservative();
        assert_eq!(conservative.max_retries, 2);
        assert_eq!(conservative.initial_delay, Duration::from_millis(2000));
        assert_eq!(conservative.max_delay, Duration::from_millis(60_000));
        assert_eq!(conservative.multiplier, 3.0);
    }

    #[test]
    fn test_delay_growth_and_cap() {
        let config = RetryConfig::default()
            .with_initial_delay(Duration::from_millis(100))
            .with_multiplier(3.0)
            .with_max_delay(Duration::from_millis(500));

        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(300));
        assert_eq!(config.delay_for_attempt(3), Duration::from_millis(500));
        assert_eq!(config.delay_for_attempt(60), Duration::from_millis(500));
    }

    #[test]
    fn test_recovers_after_two_failures() {
        let scheduler = Arc::new(VirtualScheduler::new());
        let Flaky { attempts, source } = flaky(2, scheduler.clone(), RxError::msg("flaky"));
        let config = RetryConfig::default()
            .with_initial_delay(Duration::from_millis(100))
            .with_multiplier(2.0)
            .with_max_delay(Duration::from_millis(150));

        let log = Arc::new(Mutex::new(Vec::new()));
        let (l1, l2, l3) = (log.clone(), log.clone(), log.clone());
        let _subscription = retry_with_backoff(source, config, scheduler.clone()).subscribe(
            move |v| l1.lock().unwrap().push(v.to_string()),
            move |e| l2.lock().unwrap().push(format!("error {}", e)),
            move || l3.lock().unwrap().push("complete".to_string()),
        );

        scheduler.advance_by(Duration::from_secs(1));
        assert_eq!(*log.lock().unwrap(), vec!["payload", "complete"]);
        assert_eq!(
            gaps(&attempts.lock().unwrap()),
            vec![Duration::from_millis(100), Duration::from_millis(150)]
        );
    }

    #[test]
    fn test_exhaustion_propagates_original_error() {
        let scheduler = Arc::new(VirtualScheduler::new());
        let failure = RxError::msg("still down");
        let Flaky { attempts, source } = flaky(usize::MAX, scheduler.clone(), failure.clone());
        let config = RetryConfig::default()
            .with_max_retries(2)
            .with_initial_delay(Duration::from_millis(10));

        let received = Arc::new(Mutex::new(None));
        let sink = received.clone();
        let _subscription = retry_with_backoff(source, config, scheduler.clone()).subscribe(
            |_| {},
            move |e| *sink.lock().unwrap() = Some(e),
            || {},
        );

        scheduler.advance_by(Duration::from_secs(1));
        assert_eq!(attempts.lock().unwrap().len(), 3);
        assert!(received.lock().unwrap().as_ref().unwrap().ptr_eq(&failure));
    }

    #[test]
    fn test_predicate_rejects_retry() {
        let scheduler = Arc::new(VirtualScheduler::new());
        let Flaky { attempts, source } = flaky(1, scheduler.clone(), RxError::msg("401"));
        let config = RetryConfig::default().with_should_retry(|e| e.to_string() != "401");

        let failed = Arc::new(Mutex::new(false));
        let sink = failed.clone();
        let _subscription = retry_with_backoff(source, config, scheduler.clone()).subscribe(
            |_| {},
            move |_| *sink.lock().unwrap() = true,
            || {},
        );

        scheduler.advance_by(Duration::from_secs(10));
        assert!(*failed.lock().unwrap());
        assert_eq!(attempts.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_dispose_cancels_pending_retry() {
        let scheduler = Arc::new(VirtualScheduler::new());
        let Flaky { attempts, source } = flaky(usize::MAX, scheduler.clone(), RxError::msg("down"));

        let subscription =
            retry_with_backoff(source, RetryConfig::default(), scheduler.clone()).subscribe(
                |_| {},
                |_| {},
                || {},
            );
        subscription.unsubscribe();

        scheduler.advance_by(Duration::from_secs(60));
        assert_eq!(attempts.lock().unwrap().len(), 1);
    }
}
