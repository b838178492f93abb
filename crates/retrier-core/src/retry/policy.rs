use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use super::error::Error;

type DelayFn = dyn Fn(i64, i64) -> Duration + Send + Sync;

/// A named function of `(remaining, limit)` giving how long to wait after a
/// failed attempt.
///
/// Actions must not carry mutable state between calls: a single policy is
/// shared by every attempt sequence that runs through it.
#[derive(Clone)]
pub struct DelayAction {
    step: String,
    delay: Arc<DelayFn>,
}

impl DelayAction {
    /// Named action computing its delay from `(remaining, limit)`.
    pub fn new<F>(step: impl Into<String>, delay: F) -> Self
    where
        F: Fn(i64, i64) -> Duration + Send + Sync + 'static,
    {
        Self {
            step: step.into(),
            delay: Arc::new(delay),
        }
    }

    /// Name used in logs (e.g. `fixed-delay`).
    pub fn step(&self) -> &str {
        &self.step
    }

    /// Delay after a failure with `remaining` of `limit` attempts left.
    pub fn delay(&self, remaining: i64, limit: i64) -> Duration {
        (self.delay)(remaining, limit)
    }
}

impl fmt::Debug for DelayAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelayAction").field("step", &self.step).finish()
    }
}

/// One configuration step for a [`RetryPolicy`]. Applied in the order given.
#[derive(Debug, Clone)]
pub enum RetryOption {
    /// Wait exactly this long after every failed attempt. Must be non-zero.
    FixedDelay(Duration),
    /// Wait a uniformly random duration in `[0, max)`. Must be non-zero.
    Jitter(Duration),
    /// Wait `base * multiplier^(attempts already made)`.
    /// `base` must be non-zero and `multiplier` at least 1.0.
    ExponentialBackoff { base: Duration, multiplier: f64 },
    /// Caller-supplied delay action.
    Custom(DelayAction),
}

impl RetryOption {
    fn into_action(self) -> Result<DelayAction, Error> {
        match self {
            RetryOption::FixedDelay(delay) => {
                if delay.is_zero() {
                    return Err(Error::config("fixed delay must be a positive value"));
                }
                Ok(DelayAction::new("fixed-delay", move |_, _| delay))
            }
            RetryOption::Jitter(max) => {
                if max.is_zero() {
                    return Err(Error::config("jitter must be a positive value"));
                }
                let max_nanos = nanos(max);
                Ok(DelayAction::new("jitter", move |_, _| {
                    Duration::from_nanos(rand::thread_rng().gen_range(0..max_nanos))
                }))
            }
            RetryOption::ExponentialBackoff { base, multiplier } => {
                if base.is_zero() {
                    return Err(Error::config("backoff base delay must be a positive value"));
                }
                // Also rejects NaN.
                if !(multiplier >= 1.0) || multiplier.is_infinite() {
                    return Err(Error::config(format!(
                        "backoff multiplier must be a finite value of at least 1.0, got {}",
                        multiplier
                    )));
                }
                Ok(DelayAction::new("expo-backoff", move |remaining, limit| {
                    backoff(base, multiplier, limit.saturating_sub(remaining))
                }))
            }
            RetryOption::Custom(action) => Ok(action),
        }
    }
}

fn nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

/// `base * multiplier^attempt`, saturating at `Duration::MAX`.
fn backoff(base: Duration, multiplier: f64, attempt: i64) -> Duration {
    let exp = attempt.clamp(0, i64::from(i32::MAX)) as i32;
    let scaled = nanos(base) as f64 * multiplier.powi(exp);
    if !scaled.is_finite() || scaled >= u64::MAX as f64 {
        return Duration::MAX;
    }
    Duration::from_nanos(scaled.round() as u64)
}

/// Ordered set of delay actions run between failed attempts.
///
/// Immutable once built and free of shared mutable state, so one policy can
/// drive any number of concurrent attempt sequences. The attempt loop lives
/// in `run.rs`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    actions: Arc<[DelayAction]>,
}

impl Default for RetryPolicy {
    /// No delay actions: failed attempts are retried back to back.
    fn default() -> Self {
        Self {
            actions: Arc::from(Vec::new()),
        }
    }
}

impl RetryPolicy {
    /// Build a policy by applying `options` in order. The first invalid option
    /// fails construction; later options are not looked at.
    pub fn new<I>(options: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = RetryOption>,
    {
        let actions = options
            .into_iter()
            .map(RetryOption::into_action)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            actions: actions.into(),
        })
    }

    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder::default()
    }

    pub fn actions(&self) -> &[DelayAction] {
        &self.actions
    }

    /// Per-action delays the loop would sleep after a failure with
    /// `remaining` attempts left out of `limit`.
    pub fn delays(&self, remaining: i64, limit: i64) -> Vec<(&str, Duration)> {
        self.actions
            .iter()
            .map(|a| (a.step(), a.delay(remaining, limit)))
            .collect()
    }
}

/// Collects [`RetryOption`]s; validation happens in [`RetryPolicyBuilder::build`].
#[derive(Debug, Clone, Default)]
pub struct RetryPolicyBuilder {
    options: Vec<RetryOption>,
}

impl RetryPolicyBuilder {
    pub fn fixed_delay(self, delay: Duration) -> Self {
        self.option(RetryOption::FixedDelay(delay))
    }

    pub fn jitter(self, max: Duration) -> Self {
        self.option(RetryOption::Jitter(max))
    }

    pub fn exponential_backoff(self, base: Duration, multiplier: f64) -> Self {
        self.option(RetryOption::ExponentialBackoff { base, multiplier })
    }

    pub fn action(self, action: DelayAction) -> Self {
        self.option(RetryOption::Custom(action))
    }

    pub fn option(mut self, option: RetryOption) -> Self {
        self.options.push(option);
        self
    }

    pub fn build(self) -> Result<RetryPolicy, Error> {
        RetryPolicy::new(self.options)
    }
}
