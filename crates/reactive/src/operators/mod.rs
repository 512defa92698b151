//! Combinators over [`Observable`](crate::Observable)
//!
//! Every combinator that takes a scheduler delivers its output through it,
//! so view-model code can subscribe from any thread and still observe results
//! on the designated one.

mod debounce;
mod observe_on;
mod poll;
mod retry;
mod share;
mod timeout;
mod ttl;

pub use debounce::debounced_search;
pub use observe_on::observe_on;
pub use poll::poll;
pub use retry::{retry_with_backoff, RetryConfig, RetryPredicate};
pub use share::share_replay;
pub use timeout::timeout_with_fallback;
pub use ttl::{cache_with_ttl, cache_with_ttl_in, TtlCell};
