//! Retry loop: run an operation until it succeeds, aborts, or the attempt
//! budget runs out, sleeping per the policy's delay actions in between.

use std::cell::Cell;
use std::time::Duration;

use super::error::{is_aborted, AttemptsExceeded, BoxError, Error};
use super::policy::RetryPolicy;
use crate::context::Context;

/// Single-call slot that replaces the policy's delay actions for the next
/// inter-attempt pause. Owned by one attempt sequence, never shared.
#[derive(Debug, Default)]
pub(crate) struct DelayOverride(Cell<Option<Duration>>);

impl DelayOverride {
    pub(crate) fn set(&self, delay: Duration) {
        self.0.set(Some(delay));
    }

    fn take(&self) -> Option<Duration> {
        self.0.take()
    }
}

impl RetryPolicy {
    /// Runs `op` at most `limit` times under a scope that is never cancelled.
    pub fn run<T, F>(&self, limit: i64, op: F) -> Result<T, Error>
    where
        F: FnMut() -> Result<T, BoxError>,
    {
        self.run_with_context(&Context::background(), limit, op)
    }

    /// Runs `op` at most `limit` times, checking `ctx` before every attempt.
    ///
    /// Returns the first success. An error marked aborted is returned as soon
    /// as it is seen. Any other error triggers the delay actions and another
    /// attempt; once the budget is spent the last error comes back wrapped in
    /// [`Error::Exceeded`]. Cancellation is not observed while sleeping.
    pub fn run_with_context<T, F>(&self, ctx: &Context, limit: i64, op: F) -> Result<T, Error>
    where
        F: FnMut() -> Result<T, BoxError>,
    {
        self.execute(ctx, limit, op, None)
    }

    pub(crate) fn execute<T, F>(
        &self,
        ctx: &Context,
        limit: i64,
        mut op: F,
        delay_override: Option<&DelayOverride>,
    ) -> Result<T, Error>
    where
        F: FnMut() -> Result<T, BoxError>,
    {
        if let Some(cause) = ctx.err() {
            return Err(Error::config(format!("invalid context provided: {}", cause)));
        }

        let mut last: BoxError = Box::new(AttemptsExceeded);
        let mut remaining = limit;
        while remaining > 0 {
            if let Some(cause) = ctx.err() {
                return Err(Error::Cancelled(cause));
            }
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if is_aborted(&*e) => {
                    tracing::debug!(error = %e, remaining, "operation aborted retries");
                    return Err(match e.downcast::<Error>() {
                        Ok(err) => *err,
                        Err(other) => Error::Aborted(other),
                    });
                }
                Err(e) => {
                    tracing::warn!(error = %e, remaining, limit, "failed to execute operation");
                    self.pause(remaining, limit, delay_override);
                    last = e;
                }
            }
            remaining -= 1;
        }
        Err(Error::Exceeded(last))
    }

    fn pause(&self, remaining: i64, limit: i64, delay_override: Option<&DelayOverride>) {
        if let Some(delay) = delay_override.and_then(DelayOverride::take) {
            tracing::debug!(?delay, step = "dynamic-delay", "delaying execution");
            std::thread::sleep(delay);
            return;
        }
        for action in self.actions() {
            let delay = action.delay(remaining, limit);
            tracing::debug!(?delay, step = action.step(), "delaying execution");
            if !delay.is_zero() {
                std::thread::sleep(delay);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::error::{is_exceeded, mark_aborted};
    use crate::retry::policy::DelayAction;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Instant;

    fn discard() -> BoxError {
        "discard".into()
    }

    #[test]
    fn constant_failure_uses_every_attempt() {
        let mut called = 0;
        let err = RetryPolicy::default()
            .run(4, || -> Result<(), BoxError> {
                called += 1;
                Err(discard())
            })
            .unwrap_err();
        assert_eq!(called, 4);
        assert!(is_exceeded(&err));
        assert_eq!(err.inner().map(|c| c.to_string()).as_deref(), Some("discard"));
    }

    #[test]
    fn exceeded_carries_the_last_failure() {
        let mut called = 0;
        let err = RetryPolicy::default()
            .run(3, || -> Result<(), BoxError> {
                called += 1;
                Err(format!("err{}", called).into())
            })
            .unwrap_err();
        assert!(err.is_exceeded());
        assert_eq!(err.inner().map(|c| c.to_string()).as_deref(), Some("err3"));
    }

    #[test]
    fn aborted_error_stops_immediately() {
        let mut called = 0;
        let err = RetryPolicy::default()
            .run(2, || -> Result<(), BoxError> {
                called += 1;
                Err(mark_aborted("doom").into())
            })
            .unwrap_err();
        assert_eq!(called, 1);
        assert!(matches!(&err, Error::Aborted(cause) if cause.to_string() == "doom"));
        assert!(!is_exceeded(&err));
    }

    #[test]
    fn aborted_error_skips_delay_actions() {
        let delays = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&delays);
        let policy = RetryPolicy::builder()
            .action(DelayAction::new("count", move |_, _| {
                seen.fetch_add(1, Ordering::SeqCst);
                Duration::ZERO
            }))
            .build()
            .unwrap();
        let mut called = 0;
        let _ = policy.run(5, || -> Result<(), BoxError> {
            called += 1;
            if called == 3 {
                return Err(mark_aborted("stop").into());
            }
            Err(discard())
        });
        assert_eq!(called, 3);
        assert_eq!(delays.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn no_attempts_for_non_positive_limit() {
        for limit in [0, -1, i64::MIN] {
            let mut called = 0;
            let err = RetryPolicy::default()
                .run(limit, || -> Result<(), BoxError> {
                    called += 1;
                    Ok(())
                })
                .unwrap_err();
            assert_eq!(called, 0);
            assert!(err.is_exceeded());
            assert!(err.inner().is_some_and(|c| c.is::<AttemptsExceeded>()));
        }
    }

    #[test]
    fn success_returns_after_first_attempt() {
        let mut called = 0;
        let value = RetryPolicy::default()
            .run(2, || -> Result<u32, BoxError> {
                called += 1;
                Ok(7)
            })
            .unwrap();
        assert_eq!((called, value), (1, 7));
    }

    #[test]
    fn recovers_on_later_attempt() {
        for k in 1..=4 {
            let mut called = 0;
            RetryPolicy::default()
                .run(4, || -> Result<(), BoxError> {
                    called += 1;
                    if called == k {
                        Ok(())
                    } else {
                        Err(discard())
                    }
                })
                .unwrap();
            assert_eq!(called, k);
        }
    }

    #[test]
    fn concluded_context_is_a_config_error() {
        let ctx = Context::new();
        ctx.cancel();
        let mut called = 0;
        let err = RetryPolicy::default()
            .run_with_context(&ctx, 1, || -> Result<(), BoxError> {
                called += 1;
                Ok(())
            })
            .unwrap_err();
        assert_eq!(called, 0);
        assert!(err.is_config());
    }

    #[test]
    fn cancellation_during_attempts_returns_cause() {
        let ctx = Context::new();
        let mut called = 0;
        let err = RetryPolicy::default()
            .run_with_context(&ctx, 2, || -> Result<(), BoxError> {
                called += 1;
                ctx.cancel();
                Err(discard())
            })
            .unwrap_err();
        assert_eq!(called, 1);
        assert!(matches!(err, Error::Cancelled(crate::context::Cancelled::Canceled)));
    }

    #[test]
    fn delays_run_after_each_failure() {
        let policy = RetryPolicy::builder()
            .fixed_delay(Duration::from_millis(10))
            .build()
            .unwrap();
        let start = Instant::now();
        let err = policy
            .run(3, || -> Result<(), BoxError> { Err(discard()) })
            .unwrap_err();
        assert!(err.is_exceeded());
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn delay_actions_receive_remaining_and_limit() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let record = Arc::clone(&seen);
        let policy = RetryPolicy::builder()
            .action(DelayAction::new("record", move |remaining, limit| {
                record.lock().unwrap().push((remaining, limit));
                Duration::ZERO
            }))
            .build()
            .unwrap();
        let _ = policy.run(3, || -> Result<(), BoxError> { Err(discard()) });
        assert_eq!(*seen.lock().unwrap(), [(3, 3), (2, 3), (1, 3)]);
    }

    #[test]
    fn override_replaces_actions_for_one_round() {
        let counted = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&counted);
        let policy = RetryPolicy::builder()
            .action(DelayAction::new("count", move |_, _| {
                seen.fetch_add(1, Ordering::SeqCst);
                Duration::ZERO
            }))
            .build()
            .unwrap();
        let slot = DelayOverride::default();
        let mut called = 0;
        let _ = policy.execute(
            &Context::background(),
            3,
            || -> Result<(), BoxError> {
                called += 1;
                if called == 1 {
                    slot.set(Duration::from_millis(1));
                }
                Err(discard())
            },
            Some(&slot),
        );
        assert_eq!(called, 3);
        assert_eq!(counted.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn shared_policy_across_threads() {
        let policy = Arc::new(
            RetryPolicy::builder()
                .exponential_backoff(Duration::from_millis(1), 2.0)
                .build()
                .unwrap(),
        );
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let policy = Arc::clone(&policy);
                std::thread::spawn(move || {
                    let mut called = 0;
                    let res = policy.run(3, || -> Result<(), BoxError> {
                        called += 1;
                        Err(discard())
                    });
                    (called, res.is_err())
                })
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), (3, true));
        }
    }
}
