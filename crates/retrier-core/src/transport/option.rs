//! Construction-time options for [`RetryTransport`](super::RetryTransport).

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use http::{HeaderMap, StatusCode};

use super::check::{self, RateLimitFn, ResponseCheck};
use super::status::StatusGroup;
use super::Response;
use crate::retry::{BoxError, Error, RetryOption};

/// One configuration step for a retrying transport. Options are applied in
/// the order given; the first one that fails aborts construction.
#[derive(Clone)]
pub enum TransportOption {
    /// Delay options passed through to the transport's retry policy.
    RetryOptions(Vec<RetryOption>),
    /// Retry while the response status is one of these codes.
    RetryOnStatusCodes(Vec<u16>),
    /// Retry while the response status falls in one of these groups.
    RetryOnStatusGroups(Vec<StatusGroup>),
    /// Retry until the response status is one of these codes. Needs at least one.
    RetryUntilStatusCodes(Vec<u16>),
    /// Stop retrying immediately when the status is one of these codes. Runs
    /// before every other check.
    NoRetryOnStatusCodes(Vec<u16>),
    /// Wait a server-derived duration before retrying a `429` response.
    RateLimit(RateLimitFn),
    /// Caller-supplied response check.
    Check(ResponseCheck),
}

impl TransportOption {
    pub fn rate_limit<F>(derive: F) -> Self
    where
        F: Fn(&HeaderMap) -> (Duration, bool) + Send + Sync + 'static,
    {
        TransportOption::RateLimit(Arc::new(derive))
    }

    pub fn check<F>(check: F) -> Self
    where
        F: Fn(&Response) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        TransportOption::Check(Arc::new(check))
    }

    pub(crate) fn apply(self, cf: &mut TransportConfig) -> Result<(), Error> {
        match self {
            TransportOption::RetryOptions(opts) => cf.retry.extend(opts),
            TransportOption::RetryOnStatusCodes(codes) => {
                let codes = cf.register_codes(&codes)?;
                cf.checks.push(check::retry_on_status_codes(codes));
            }
            TransportOption::RetryOnStatusGroups(groups) => {
                let groups = cf.register_groups(&groups)?;
                cf.checks.push(check::retry_on_status_groups(groups));
            }
            TransportOption::RetryUntilStatusCodes(codes) => {
                if codes.is_empty() {
                    return Err(Error::config(
                        "requires at least one response code to compare against",
                    ));
                }
                let codes = cf.register_codes(&codes)?;
                cf.checks.push(check::retry_until_status_codes(codes));
            }
            TransportOption::NoRetryOnStatusCodes(codes) => {
                let codes = cf.register_codes(&codes)?;
                cf.checks.insert(0, check::no_retry_on_status_codes(codes));
            }
            TransportOption::RateLimit(derive) => cf.checks.push(check::rate_limit(derive)),
            TransportOption::Check(check) => cf.checks.push(check),
        }
        Ok(())
    }
}

impl fmt::Debug for TransportOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportOption::RetryOptions(o) => f.debug_tuple("RetryOptions").field(o).finish(),
            TransportOption::RetryOnStatusCodes(c) => {
                f.debug_tuple("RetryOnStatusCodes").field(c).finish()
            }
            TransportOption::RetryOnStatusGroups(g) => {
                f.debug_tuple("RetryOnStatusGroups").field(g).finish()
            }
            TransportOption::RetryUntilStatusCodes(c) => {
                f.debug_tuple("RetryUntilStatusCodes").field(c).finish()
            }
            TransportOption::NoRetryOnStatusCodes(c) => {
                f.debug_tuple("NoRetryOnStatusCodes").field(c).finish()
            }
            TransportOption::RateLimit(_) => f.write_str("RateLimit(..)"),
            TransportOption::Check(_) => f.write_str("Check(..)"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum MatchKey {
    Code(StatusCode),
    Group(StatusGroup),
}

/// Accumulated state while options are applied.
#[derive(Default)]
pub(crate) struct TransportConfig {
    pub(crate) retry: Vec<RetryOption>,
    pub(crate) checks: Vec<ResponseCheck>,
    table: HashSet<MatchKey>,
}

impl TransportConfig {
    fn register_codes(&mut self, codes: &[u16]) -> Result<HashSet<StatusCode>, Error> {
        let mut set = HashSet::with_capacity(codes.len());
        for &code in codes {
            let status = StatusCode::from_u16(code)
                .map_err(|_| Error::config(format!("invalid response code {}", code)))?;
            if !self.table.insert(MatchKey::Code(status)) {
                return Err(Error::config(format!(
                    "clash on response code [{}:{}]",
                    code,
                    status.canonical_reason().unwrap_or("unknown")
                )));
            }
            set.insert(status);
        }
        Ok(set)
    }

    fn register_groups(&mut self, groups: &[StatusGroup]) -> Result<HashSet<StatusGroup>, Error> {
        let mut set = HashSet::with_capacity(groups.len());
        for &group in groups {
            if !self.table.insert(MatchKey::Group(group)) {
                return Err(Error::config(format!("clash on response group [{}]", group)));
            }
            set.insert(group);
        }
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply_all(opts: Vec<TransportOption>) -> Result<TransportConfig, Error> {
        let mut cf = TransportConfig::default();
        for opt in opts {
            opt.apply(&mut cf)?;
        }
        Ok(cf)
    }

    #[test]
    fn same_code_in_two_policies_clashes() {
        let err = apply_all(vec![
            TransportOption::RetryOnStatusCodes(vec![500, 503]),
            TransportOption::RetryUntilStatusCodes(vec![200, 503]),
        ])
        .err()
        .expect("clash");
        assert!(err.is_config());
        assert!(err.to_string().contains("clash on response code [503"), "{}", err);
    }

    #[test]
    fn duplicate_code_within_one_policy_clashes() {
        assert!(apply_all(vec![TransportOption::NoRetryOnStatusCodes(vec![502, 502])]).is_err());
    }

    #[test]
    fn same_group_twice_clashes() {
        let err = apply_all(vec![
            TransportOption::RetryOnStatusGroups(vec![StatusGroup::ServerError]),
            TransportOption::RetryOnStatusGroups(vec![StatusGroup::ServerError]),
        ])
        .err()
        .expect("clash");
        assert!(err.to_string().contains("5xx"));
    }

    #[test]
    fn codes_and_groups_do_not_clash() {
        let cf = apply_all(vec![
            TransportOption::RetryOnStatusCodes(vec![500]),
            TransportOption::RetryOnStatusGroups(vec![StatusGroup::ServerError]),
        ])
        .unwrap();
        assert_eq!(cf.checks.len(), 2);
    }

    #[test]
    fn retry_until_needs_a_code() {
        let err = apply_all(vec![TransportOption::RetryUntilStatusCodes(vec![])])
            .err()
            .expect("empty");
        assert!(err.is_config());
    }

    #[test]
    fn invalid_code_is_rejected() {
        assert!(apply_all(vec![TransportOption::RetryOnStatusCodes(vec![42])]).is_err());
        assert!(apply_all(vec![TransportOption::RetryOnStatusCodes(vec![1000])]).is_err());
    }

    #[test]
    fn no_retry_check_is_prepended() {
        let cf = apply_all(vec![
            TransportOption::check(|_| Err("custom".into())),
            TransportOption::NoRetryOnStatusCodes(vec![502]),
        ])
        .unwrap();
        let resp = http::Response::builder().status(502).body(Vec::new()).unwrap();
        let err = (cf.checks[0])(&resp).unwrap_err();
        assert!(crate::retry::is_aborted(&*err));
    }

    #[test]
    fn retry_options_accumulate_in_order() {
        let cf = apply_all(vec![
            TransportOption::RetryOptions(vec![RetryOption::FixedDelay(Duration::from_millis(1))]),
            TransportOption::RetryOptions(vec![RetryOption::Jitter(Duration::from_millis(1))]),
        ])
        .unwrap();
        assert!(matches!(
            cf.retry.as_slice(),
            [RetryOption::FixedDelay(_), RetryOption::Jitter(_)]
        ));
    }
}
