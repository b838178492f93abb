//! CLI for issuing retried HTTP requests.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use retrier_core::config;

use commands::{run_config, run_get, GetArgs};

/// Top-level CLI for retrier.
#[derive(Debug, Parser)]
#[command(name = "retrier")]
#[command(about = "Send an HTTP request, retrying on configured status codes", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// GET a URL and write the response body to stdout.
    Get {
        /// HTTP/HTTPS URL to request.
        url: String,

        /// Maximum number of sends, including the first (overrides the config file).
        #[arg(long, value_name = "N")]
        attempts: Option<i64>,

        /// Retry while the status is one of these codes (replaces `retry_on_status`).
        #[arg(long = "retry-on", value_name = "CODE", value_delimiter = ',')]
        retry_on: Vec<u16>,

        /// Retry until the status is one of these codes.
        #[arg(long, value_name = "CODE", value_delimiter = ',')]
        until: Vec<u16>,

        /// Extra request header, `Name: value`. Repeatable.
        #[arg(short = 'H', long = "header", value_name = "HEADER")]
        headers: Vec<String>,
    },

    /// Print the config file path and the effective configuration.
    Config,
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Get {
                url,
                attempts,
                retry_on,
                until,
                headers,
            } => {
                let args = GetArgs {
                    url,
                    attempts,
                    retry_on,
                    until,
                    headers,
                };
                run_get(cfg, args).await?;
            }
            CliCommand::Config => run_config(&cfg)?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
