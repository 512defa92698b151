//! Liveness tokens for scheduled actions
//!
//! Every action handed to a scheduler carries a [`CancellationToken`]. The
//! token is cleared (cancelled) when the subscription that owns the action is
//! disposed. Cancellation is cooperative: a token only stops actions that have
//! not started yet, it never interrupts one that is already running.

use std::fmt;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

struct TokenState {
    cancelled: AtomicBool,
    parent: Option<CancellationToken>,
}

/// Cancellation token for cooperative cancellation of scheduled work
///
/// Clones share the same underlying flag. A token created with
/// [`CancellationToken::child`] additionally reports cancelled once any of
/// its ancestors is cancelled, which lets an operator cancel one pending
/// action without disposing the whole subscription that owns it.
///
/// # Example
///
/// ```
/// use sidechain_scheduler::CancellationToken;
///
/// let subscription = CancellationToken::new();
/// let pending = subscription.child();
///
/// pending.cancel();
/// assert!(pending.is_cancelled());
/// assert!(!subscription.is_cancelled());
///
/// let next = subscription.child();
/// subscription.cancel();
/// assert!(next.is_cancelled());
/// ```
#[derive(Clone)]
pub struct CancellationToken {
    state: Arc<TokenState>,
}

impl CancellationToken {
    /// Create a new, live token
    pub fn new() -> Self {
        Self {
            state: Arc::new(TokenState {
                cancelled: AtomicBool::new(false),
                parent: None,
            }),
        }
    }

    /// Create a token that is cancelled when either it or `self` is cancelled
    ///
    /// Cancelling the child does not affect the parent.
    pub fn child(&self) -> Self {
        Self {
            state: Arc::new(TokenState {
                cancelled: AtomicBool::new(false),
                parent: Some(self.clone()),
            }),
        }
    }

    /// Cancel this token
    ///
    /// All clones and children observe the cancellation. Idempotent.
    pub fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::Release);
    }

    /// Check whether this token or any of its ancestors has been cancelled
    pub fn is_cancelled(&self) -> bool {
        let mut current = Some(self);
        while let Some(token) = current {
            if token.state.cancelled.load(Ordering::Acquire) {
                return true;
            }
            current = token.state.parent.as_ref();
        }
        false
    }

    /// Check whether the token is still live
    pub fn is_live(&self) -> bool {
        !self.is_cancelled()
    }

    /// Whether two tokens share the same flag
    pub fn same_as(&self, other: &CancellationToken) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("has_parent", &self.state.parent.is_some())
            .finish()
    }
}
