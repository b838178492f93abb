//! Response checks: predicates deciding whether a completed exchange should be
//! retried.
//!
//! A check returning `Err` fails the attempt. Plain errors are retried; errors
//! marked aborted end the run.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use http::{HeaderMap, StatusCode};

use super::status::StatusGroup;
use super::Response;
use crate::retry::{mark_aborted, BoxError};

/// Predicate over a response. `Err` means "do not accept this response".
pub type ResponseCheck = Arc<dyn Fn(&Response) -> Result<(), BoxError> + Send + Sync>;

/// Derives `(wait, limit_exceeded)` from rate-limit response headers.
pub type RateLimitFn = Arc<dyn Fn(&HeaderMap) -> (Duration, bool) + Send + Sync>;

/// Why a built-in check rejected a response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CheckError {
    #[error("returned status code allows retries: {0}")]
    RetryableStatus(u16),
    #[error("returned status code {code} is in retryable group {group}")]
    RetryableGroup { code: u16, group: StatusGroup },
    #[error("unmatched status code {0}, continue retrying")]
    UnmatchedStatus(u16),
    #[error("unable to recover response status code: {0}")]
    Unrecoverable(u16),
    #[error("exceeded rate limit, waiting {wait:?}")]
    RateLimited { wait: Duration },
}

/// Fails while the status is one of `codes`.
pub(crate) fn retry_on_status_codes(codes: HashSet<StatusCode>) -> ResponseCheck {
    Arc::new(move |resp: &Response| -> Result<(), BoxError> {
        if codes.contains(&resp.status()) {
            return Err(CheckError::RetryableStatus(resp.status().as_u16()).into());
        }
        Ok(())
    })
}

/// Fails while the status falls in one of `groups`.
pub(crate) fn retry_on_status_groups(groups: HashSet<StatusGroup>) -> ResponseCheck {
    Arc::new(move |resp: &Response| -> Result<(), BoxError> {
        match StatusGroup::of(resp.status()) {
            Some(group) if groups.contains(&group) => Err(CheckError::RetryableGroup {
                code: resp.status().as_u16(),
                group,
            }
            .into()),
            _ => Ok(()),
        }
    })
}

/// Fails until the status is one of `codes`.
pub(crate) fn retry_until_status_codes(codes: HashSet<StatusCode>) -> ResponseCheck {
    Arc::new(move |resp: &Response| -> Result<(), BoxError> {
        if codes.contains(&resp.status()) {
            return Ok(());
        }
        Err(CheckError::UnmatchedStatus(resp.status().as_u16()).into())
    })
}

/// Aborts the run when the status is one of `codes`.
pub(crate) fn no_retry_on_status_codes(codes: HashSet<StatusCode>) -> ResponseCheck {
    Arc::new(move |resp: &Response| -> Result<(), BoxError> {
        if codes.contains(&resp.status()) {
            return Err(mark_aborted(CheckError::Unrecoverable(resp.status().as_u16())).into());
        }
        Ok(())
    })
}

/// Inspects `429 Too Many Requests` responses. When `derive` reports the limit
/// as exceeded with a positive wait, fails with [`CheckError::RateLimited`];
/// the transport then waits exactly that long before the next attempt.
pub(crate) fn rate_limit(derive: RateLimitFn) -> ResponseCheck {
    Arc::new(move |resp: &Response| -> Result<(), BoxError> {
        if resp.status() != StatusCode::TOO_MANY_REQUESTS {
            return Ok(());
        }
        // A limit that was exceeded but whose wait already elapsed belongs to
        // an earlier window.
        match derive(resp.headers()) {
            (wait, true) if !wait.is_zero() => Err(CheckError::RateLimited { wait }.into()),
            _ => Ok(()),
        }
    })
}

/// Rate-limit deriver for the standard `Retry-After` header in its
/// delay-seconds form. HTTP-date values are ignored.
pub fn retry_after(headers: &HeaderMap) -> (Duration, bool) {
    headers
        .get(http::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or((Duration::ZERO, false), |secs| (Duration::from_secs(secs), true))
}
