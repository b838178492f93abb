//! Retry engine.
//!
//! A [`RetryPolicy`] is an ordered list of delay actions built from
//! [`RetryOption`]s. Running an operation through it repeats the operation
//! until it succeeds, returns an error marked with [`mark_aborted`], or the
//! attempt limit is reached, in which case the last failure is returned inside
//! [`Error::Exceeded`].

mod error;
mod policy;
mod run;

pub use error::{
    is_aborted, is_aborted_opt, is_exceeded, is_exceeded_opt, mark_aborted, mark_exceeded,
    AttemptsExceeded, BoxError, Error,
};
pub use policy::{DelayAction, RetryOption, RetryPolicy, RetryPolicyBuilder};

pub(crate) use run::DelayOverride;
