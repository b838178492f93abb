//! Cancellation scope for retried operations.
//!
//! A `Context` is a cheap, cloneable handle over a shared cancel flag and an
//! optional deadline. The retry loop polls it once per attempt; a concluded
//! scope stops the loop with the scope's own cause.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Why a scope concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cancelled {
    /// `cancel()` was called on the scope (or a parent).
    Canceled,
    /// The scope's deadline passed.
    DeadlineExceeded,
}

impl fmt::Display for Cancelled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cancelled::Canceled => write!(f, "context canceled"),
            Cancelled::DeadlineExceeded => write!(f, "context deadline exceeded"),
        }
    }
}

impl std::error::Error for Cancelled {}

#[derive(Debug)]
struct Scope {
    cancelled: AtomicBool,
    deadline: Option<Instant>,
    parent: Option<Arc<Scope>>,
}

impl Scope {
    fn err(&self) -> Option<Cancelled> {
        if self.cancelled.load(Ordering::Acquire) {
            return Some(Cancelled::Canceled);
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Some(Cancelled::DeadlineExceeded);
            }
        }
        self.parent.as_ref().and_then(|p| p.err())
    }
}

/// Cancellation scope handed to `RetryPolicy::run_with_context`.
///
/// `Context::background()` never concludes. Every other constructor returns a
/// scope that can be cancelled through any of its clones.
#[derive(Debug, Clone, Default)]
pub struct Context {
    scope: Option<Arc<Scope>>,
}

impl Context {
    /// Scope that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self { scope: None }
    }

    /// Cancellable scope with no deadline.
    pub fn new() -> Self {
        Self::with_parts(None, None)
    }

    /// Cancellable scope that concludes once `timeout` has elapsed.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// Cancellable scope that concludes at `deadline`.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self::with_parts(Some(deadline), None)
    }

    /// Child scope: concludes when this scope does, and can be cancelled on its
    /// own without affecting the parent.
    pub fn child(&self) -> Self {
        Self::with_parts(None, self.scope.clone())
    }

    fn with_parts(deadline: Option<Instant>, parent: Option<Arc<Scope>>) -> Self {
        Self {
            scope: Some(Arc::new(Scope {
                cancelled: AtomicBool::new(false),
                deadline,
                parent,
            })),
        }
    }

    /// Conclude the scope. No-op on the background scope.
    pub fn cancel(&self) {
        if let Some(scope) = &self.scope {
            scope.cancelled.store(true, Ordering::Release);
        }
    }

    /// The cause if the scope has concluded, `None` while it is live.
    pub fn err(&self) -> Option<Cancelled> {
        self.scope.as_ref().and_then(|s| s.err())
    }

    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.scope.as_ref().and_then(|s| s.deadline)
    }
}
