//! CLI command handlers, one file per command.

mod config;
mod get;

pub use config::run_config;
pub use get::{run_get, GetArgs};

#[cfg(test)]
pub(crate) use get::{apply_overrides, build_request, parse_header};
