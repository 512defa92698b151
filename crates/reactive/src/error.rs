//! Error type carried through observable streams

use std::fmt;
use std::sync::Arc;

/// Error delivered to observers
///
/// A stream error may reach several observers (a shared subscription fans one
/// failure out to every subscriber), so the underlying [`anyhow::Error`] is
/// reference counted. Clones compare equal under [`RxError::ptr_eq`], which is
/// how callers check that an operator passed a failure through untouched.
#[derive(Clone)]
pub struct RxError {
    inner: Arc<anyhow::Error>,
}

impl RxError {
    /// Wrap a concrete error
    pub fn new<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(anyhow::Error::new(error)),
        }
    }

    /// Create an error from a message
    pub fn msg<M>(message: M) -> Self
    where
        M: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(anyhow::Error::msg(message)),
        }
    }

    /// Whether both values are clones of the same error
    pub fn ptr_eq(&self, other: &RxError) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Borrow the wrapped error as a concrete type
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        self.inner.downcast_ref::<E>()
    }
}

impl From<anyhow::Error> for RxError {
    fn from(error: anyhow::Error) -> Self {
        Self {
            inner: Arc::new(error),
        }
    }
}

impl fmt::Display for RxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.inner, f)
    }
}

impl fmt::Debug for RxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.inner, f)
    }
}

impl std::error::Error for RxError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner.source()
    }
}
