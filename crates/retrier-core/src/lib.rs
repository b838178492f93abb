pub mod config;
pub mod context;
pub mod logging;
pub mod retry;
pub mod transport;

pub use context::{Cancelled, Context};
pub use retry::{BoxError, Error, RetryOption, RetryPolicy};
pub use transport::{CurlTransport, RetryTransport, RoundTrip, StatusGroup, TransportOption};
