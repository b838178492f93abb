use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::retry::{Error, RetryOption};
use crate::transport::{self, CurlTransport, RetryTransport, StatusGroup, TransportOption};

/// Connection parameters for the libcurl round tripper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub connect_timeout_secs: u64,
    pub timeout_secs: u64,
    pub follow_redirects: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 15,
            timeout_secs: 30,
            follow_redirects: true,
        }
    }
}

/// Exponential backoff parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Delay after the first failed attempt, in milliseconds.
    pub base_ms: u64,
    /// Growth factor per attempt (>= 1.0).
    pub multiplier: f64,
}

/// Retry rules for the transport decorator (`[retry]` in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of sends per request (including the first).
    pub attempts: i64,
    #[serde(default)]
    pub fixed_delay_ms: Option<u64>,
    #[serde(default)]
    pub jitter_ms: Option<u64>,
    #[serde(default)]
    pub backoff: Option<BackoffConfig>,
    /// Wait for the `Retry-After` seconds on 429 responses instead of the
    /// configured delays.
    #[serde(default)]
    pub honor_retry_after: bool,
    #[serde(default)]
    pub retry_on_status: Vec<u16>,
    #[serde(default)]
    pub retry_on_group: Vec<StatusGroup>,
    #[serde(default)]
    pub retry_until_status: Vec<u16>,
    #[serde(default)]
    pub no_retry_on_status: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            fixed_delay_ms: None,
            jitter_ms: Some(100),
            backoff: Some(BackoffConfig {
                base_ms: 250,
                multiplier: 2.0,
            }),
            honor_retry_after: true,
            retry_on_status: vec![429],
            retry_on_group: vec![StatusGroup::ServerError],
            retry_until_status: Vec::new(),
            no_retry_on_status: Vec::new(),
        }
    }
}

impl RetryConfig {
    /// Delay options in a fixed order: fixed delay, backoff, jitter.
    pub fn retry_options(&self) -> Vec<RetryOption> {
        let mut opts = Vec::new();
        if let Some(ms) = self.fixed_delay_ms {
            opts.push(RetryOption::FixedDelay(Duration::from_millis(ms)));
        }
        if let Some(b) = &self.backoff {
            opts.push(RetryOption::ExponentialBackoff {
                base: Duration::from_millis(b.base_ms),
                multiplier: b.multiplier,
            });
        }
        if let Some(ms) = self.jitter_ms {
            opts.push(RetryOption::Jitter(Duration::from_millis(ms)));
        }
        opts
    }

    /// Transport options for these rules. The rate-limit check goes first so a
    /// 429 listed in `retry_on_status` still picks up the server's wait.
    pub fn transport_options(&self) -> Vec<TransportOption> {
        let mut opts = vec![TransportOption::RetryOptions(self.retry_options())];
        if self.honor_retry_after {
            opts.push(TransportOption::rate_limit(transport::retry_after));
        }
        if !self.no_retry_on_status.is_empty() {
            opts.push(TransportOption::NoRetryOnStatusCodes(self.no_retry_on_status.clone()));
        }
        if !self.retry_on_status.is_empty() {
            opts.push(TransportOption::RetryOnStatusCodes(self.retry_on_status.clone()));
        }
        if !self.retry_on_group.is_empty() {
            opts.push(TransportOption::RetryOnStatusGroups(self.retry_on_group.clone()));
        }
        if !self.retry_until_status.is_empty() {
            opts.push(TransportOption::RetryUntilStatusCodes(self.retry_until_status.clone()));
        }
        opts
    }
}

/// Global configuration loaded from `~/.config/retrier/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrierConfig {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl RetrierConfig {
    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn curl_transport(&self) -> CurlTransport {
        CurlTransport::new(
            Duration::from_secs(self.http.connect_timeout_secs),
            Duration::from_secs(self.http.timeout_secs),
        )
        .follow_redirects(self.http.follow_redirects)
    }

    /// Retrying curl transport described by this configuration.
    pub fn build_transport(&self) -> Result<RetryTransport, Error> {
        RetryTransport::new(
            self.curl_transport(),
            self.retry.attempts,
            self.retry.transport_options(),
        )
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("retrier")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<RetrierConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = RetrierConfig::default();
        let toml = default_cfg.to_toml_string()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }
    load_from_path(&path)
}

pub fn load_from_path(path: &Path) -> Result<RetrierConfig> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let cfg: RetrierConfig =
        toml::from_str(&data).with_context(|| format!("parsing config {}", path.display()))?;
    Ok(cfg)
}
