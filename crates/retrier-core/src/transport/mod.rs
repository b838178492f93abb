//! Retrying HTTP transport.
//!
//! [`RoundTrip`] is the send capability: one request in, one response or
//! transport error out. [`RetryTransport`] wraps any round tripper and
//! implements `RoundTrip` itself, so decorated transports stack.
//!
//! Transport errors from the wrapped round tripper stop the run straight
//! away; only completed exchanges rejected by a response check are retried.

mod check;
mod libcurl;
mod option;
mod status;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use http::HeaderMap;

use crate::context::Context;
use crate::retry::{mark_aborted, BoxError, DelayOverride, Error, RetryOption, RetryPolicy};

pub use check::{retry_after, CheckError, RateLimitFn, ResponseCheck};
pub use libcurl::CurlTransport;
pub use option::TransportOption;
pub use status::{ParseStatusGroupError, StatusGroup};

use option::TransportConfig;

pub type Request = http::Request<Vec<u8>>;
pub type Response = http::Response<Vec<u8>>;

/// Sends a request and returns the response or a transport-level error.
///
/// Implementations must be safe to call from many threads at once. The
/// request's cancellation scope, if any, is a [`Context`] stored in its
/// extensions.
pub trait RoundTrip: Send + Sync {
    fn round_trip(&self, req: &Request) -> Result<Response, BoxError>;
}

impl<T: RoundTrip + ?Sized> RoundTrip for &T {
    fn round_trip(&self, req: &Request) -> Result<Response, BoxError> {
        (**self).round_trip(req)
    }
}

impl<T: RoundTrip + ?Sized> RoundTrip for Box<T> {
    fn round_trip(&self, req: &Request) -> Result<Response, BoxError> {
        (**self).round_trip(req)
    }
}

impl<T: RoundTrip + ?Sized> RoundTrip for Arc<T> {
    fn round_trip(&self, req: &Request) -> Result<Response, BoxError> {
        (**self).round_trip(req)
    }
}

/// Round tripper backed by a closure. See [`round_trip_fn`].
#[derive(Clone)]
pub struct RoundTripFn<F>(F);

/// Adapt a closure into a [`RoundTrip`].
pub fn round_trip_fn<F>(f: F) -> RoundTripFn<F>
where
    F: Fn(&Request) -> Result<Response, BoxError> + Send + Sync,
{
    RoundTripFn(f)
}

impl<F> RoundTrip for RoundTripFn<F>
where
    F: Fn(&Request) -> Result<Response, BoxError> + Send + Sync,
{
    fn round_trip(&self, req: &Request) -> Result<Response, BoxError> {
        (self.0)(req)
    }
}

impl<F> fmt::Debug for RoundTripFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RoundTripFn")
    }
}

/// Decorates a round tripper with a retry policy and response checks.
///
/// Built once and shared by every request. The policy holds no per-request
/// state, so concurrent requests each back off from their own attempt count.
pub struct RetryTransport {
    inner: Box<dyn RoundTrip>,
    attempts: i64,
    policy: RetryPolicy,
    checks: Vec<ResponseCheck>,
}

impl RetryTransport {
    /// Wrap `inner`, allowing up to `attempts` sends per request. Options are
    /// applied in order and the retry policy is built here, so configuration
    /// errors surface before the first request.
    pub fn new<R, I>(inner: R, attempts: i64, options: I) -> Result<Self, Error>
    where
        R: RoundTrip + 'static,
        I: IntoIterator<Item = TransportOption>,
    {
        if attempts < 1 {
            return Err(Error::config("attempts must be positive"));
        }
        let mut cf = TransportConfig::default();
        for opt in options {
            opt.apply(&mut cf)?;
        }
        let policy = RetryPolicy::new(cf.retry)?;
        Ok(Self {
            inner: Box::new(inner),
            attempts,
            policy,
            checks: cf.checks,
        })
    }

    /// Retrying transport over [`CurlTransport::default`].
    pub fn with_curl<I>(attempts: i64, options: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = TransportOption>,
    {
        Self::new(CurlTransport::default(), attempts, options)
    }

    pub fn builder<R: RoundTrip + 'static>(inner: R, attempts: i64) -> RetryTransportBuilder {
        RetryTransportBuilder {
            inner: Box::new(inner),
            attempts,
            options: Vec::new(),
        }
    }

    pub fn attempts(&self) -> i64 {
        self.attempts
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Send `req`, retrying per the configured policy and checks.
    ///
    /// A failure of the wrapped round tripper aborts the run. A response
    /// rejected by a check is dropped and the request is sent again.
    pub fn send(&self, req: &Request) -> Result<Response, Error> {
        let ctx = req.extensions().get::<Context>().cloned().unwrap_or_default();
        let dynamic_delay = DelayOverride::default();
        self.policy.execute(
            &ctx,
            self.attempts,
            || {
                let resp = self
                    .inner
                    .round_trip(req)
                    .map_err(|e| -> BoxError { Box::new(mark_aborted(e)) })?;
                for check in &self.checks {
                    if let Err(e) = check(&resp) {
                        if let Some(CheckError::RateLimited { wait }) =
                            e.downcast_ref::<CheckError>()
                        {
                            dynamic_delay.set(*wait);
                        }
                        tracing::debug!(
                            status = resp.status().as_u16(),
                            error = %e,
                            "response rejected"
                        );
                        return Err(e);
                    }
                }
                Ok(resp)
            },
            Some(&dynamic_delay),
        )
    }
}

impl RoundTrip for RetryTransport {
    fn round_trip(&self, req: &Request) -> Result<Response, BoxError> {
        self.send(req).map_err(Into::into)
    }
}

impl fmt::Debug for RetryTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryTransport")
            .field("attempts", &self.attempts)
            .field("policy", &self.policy)
            .field("checks", &self.checks.len())
            .finish_non_exhaustive()
    }
}

/// Builder for [`RetryTransport`]; options are applied in call order.
pub struct RetryTransportBuilder {
    inner: Box<dyn RoundTrip>,
    attempts: i64,
    options: Vec<TransportOption>,
}

impl RetryTransportBuilder {
    pub fn retry_options(self, opts: impl IntoIterator<Item = RetryOption>) -> Self {
        self.option(TransportOption::RetryOptions(opts.into_iter().collect()))
    }

    pub fn fixed_delay(self, delay: Duration) -> Self {
        self.retry_options([RetryOption::FixedDelay(delay)])
    }

    pub fn jitter(self, max: Duration) -> Self {
        self.retry_options([RetryOption::Jitter(max)])
    }

    pub fn exponential_backoff(self, base: Duration, multiplier: f64) -> Self {
        self.retry_options([RetryOption::ExponentialBackoff { base, multiplier }])
    }

    pub fn retry_on_status_codes(self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.option(TransportOption::RetryOnStatusCodes(codes.into_iter().collect()))
    }

    pub fn retry_on_status_groups(self, groups: impl IntoIterator<Item = StatusGroup>) -> Self {
        self.option(TransportOption::RetryOnStatusGroups(groups.into_iter().collect()))
    }

    pub fn retry_until_status_codes(self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.option(TransportOption::RetryUntilStatusCodes(codes.into_iter().collect()))
    }

    pub fn no_retry_on_status_codes(self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.option(TransportOption::NoRetryOnStatusCodes(codes.into_iter().collect()))
    }

    pub fn rate_limit<F>(self, derive: F) -> Self
    where
        F: Fn(&HeaderMap) -> (Duration, bool) + Send + Sync + 'static,
    {
        self.option(TransportOption::rate_limit(derive))
    }

    pub fn check<F>(self, check: F) -> Self
    where
        F: Fn(&Response) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.option(TransportOption::check(check))
    }

    pub fn option(mut self, option: TransportOption) -> Self {
        self.options.push(option);
        self
    }

    pub fn options(mut self, options: impl IntoIterator<Item = TransportOption>) -> Self {
        self.options.extend(options);
        self
    }

    pub fn build(self) -> Result<RetryTransport, Error> {
        RetryTransport::new(self.inner, self.attempts, self.options)
    }
}
