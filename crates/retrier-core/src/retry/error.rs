//! Error taxonomy for the retry loop.
//!
//! Operations return any boxed error. An error is recoverable unless it (or
//! something in its `source()` chain) was produced by [`mark_aborted`]. The
//! loop itself produces [`Error::Exceeded`] once the attempt budget is spent.

use std::error::Error as StdError;
use std::fmt;

use crate::context::Cancelled;

/// Boxed error returned by guarded operations and round trippers.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Terminal outcome of a retried operation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The operation signalled it cannot recover; remaining attempts were skipped.
    #[error("aborted retries: {0}")]
    Aborted(#[source] BoxError),
    /// Every allowed attempt failed. Carries the last failure.
    #[error("exceeded attempts: {0}")]
    Exceeded(#[source] BoxError),
    /// The cancellation scope concluded before an attempt could start.
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
    /// Invalid option parameters or call preconditions. Never retried.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    pub fn is_aborted(&self) -> bool {
        is_aborted(self)
    }

    pub fn is_exceeded(&self) -> bool {
        is_exceeded(self)
    }

    pub fn is_config(&self) -> bool {
        matches!(self, Error::Config(_))
    }

    /// The wrapped cause of an aborted or exceeded outcome.
    pub fn inner(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        match self {
            Error::Aborted(cause) | Error::Exceeded(cause) => Some(cause.as_ref()),
            Error::Cancelled(_) | Error::Config(_) => None,
        }
    }
}

/// Cause used when the attempt budget runs out, or is zero to begin with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptsExceeded;

impl fmt::Display for AttemptsExceeded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "exceeded allowed attempts")
    }
}

impl StdError for AttemptsExceeded {}

/// Wrap `cause` so the retry loop stops immediately and returns it.
pub fn mark_aborted(cause: impl Into<BoxError>) -> Error {
    Error::Aborted(cause.into())
}

/// Wrap `cause` as an exhausted-attempts outcome.
pub fn mark_exceeded(cause: impl Into<BoxError>) -> Error {
    Error::Exceeded(cause.into())
}

fn chain<'a>(err: &'a (dyn StdError + 'static)) -> impl Iterator<Item = &'a (dyn StdError + 'static)> {
    std::iter::successors(Some(err), |&e| e.source())
}

/// True if `err` or anything it wraps came from [`mark_aborted`].
pub fn is_aborted(err: &(dyn StdError + 'static)) -> bool {
    chain(err).any(|e| matches!(e.downcast_ref::<Error>(), Some(Error::Aborted(_))))
}

/// True if `err` or anything it wraps came from [`mark_exceeded`].
pub fn is_exceeded(err: &(dyn StdError + 'static)) -> bool {
    chain(err).any(|e| matches!(e.downcast_ref::<Error>(), Some(Error::Exceeded(_))))
}

/// [`is_aborted`] for an optional error; no error is never aborted.
pub fn is_aborted_opt(err: Option<&(dyn StdError + 'static)>) -> bool {
    err.is_some_and(is_aborted)
}

/// [`is_exceeded`] for an optional error; no error is never exceeded.
pub fn is_exceeded_opt(err: Option<&(dyn StdError + 'static)>) -> bool {
    err.is_some_and(is_exceeded)
}
