//! `retrier get <url>` – one request through the retrying transport.
//!
//! The send blocks, so it runs on tokio's blocking pool. Ctrl-C cancels the
//! request's context; the run stops before its next attempt.

use std::io::Write;

use anyhow::{bail, Context as _, Result};
use http::header::{HeaderName, HeaderValue};
use retrier_core::config::RetrierConfig;
use retrier_core::transport::Request;
use retrier_core::Context;

#[derive(Debug, Default)]
pub struct GetArgs {
    pub url: String,
    pub attempts: Option<i64>,
    pub retry_on: Vec<u16>,
    pub until: Vec<u16>,
    pub headers: Vec<String>,
}

pub async fn run_get(mut cfg: RetrierConfig, args: GetArgs) -> Result<()> {
    apply_overrides(&mut cfg, &args);
    let transport = cfg
        .build_transport()
        .context("invalid retry configuration")?;

    let ctx = Context::new();
    let mut req = build_request(&args.url, &args.headers)?;
    req.extensions_mut().insert(ctx.clone());

    tracing::info!(url = %args.url, attempts = transport.attempts(), "sending request");
    let mut task = tokio::task::spawn_blocking(move || transport.send(&req));
    let result = tokio::select! {
        res = &mut task => res?,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("interrupted; stopping before the next attempt");
            ctx.cancel();
            task.await?
        }
    };
    let resp = result.with_context(|| format!("GET {}", args.url))?;

    eprintln!("{}", resp.status());
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(resp.body())?;
    stdout.flush()?;
    Ok(())
}

/// Command-line flags win over the config file.
pub(crate) fn apply_overrides(cfg: &mut RetrierConfig, args: &GetArgs) {
    if let Some(n) = args.attempts {
        cfg.retry.attempts = n;
    }
    if !args.retry_on.is_empty() {
        cfg.retry.retry_on_status = args.retry_on.clone();
    }
    if !args.until.is_empty() {
        cfg.retry.retry_until_status = args.until.clone();
    }
}

pub(crate) fn build_request(url: &str, headers: &[String]) -> Result<Request> {
    let mut builder = http::Request::get(url);
    for raw in headers {
        let (name, value) = parse_header(raw)?;
        builder = builder.header(name, value);
    }
    builder
        .body(Vec::new())
        .with_context(|| format!("invalid request for {}", url))
}

pub(crate) fn parse_header(raw: &str) -> Result<(HeaderName, HeaderValue)> {
    let Some((name, value)) = raw.split_once(':') else {
        bail!("header must look like `Name: value`, got {:?}", raw);
    };
    let name = HeaderName::from_bytes(name.trim().as_bytes())
        .with_context(|| format!("invalid header name in {:?}", raw))?;
    let value = HeaderValue::from_str(value.trim())
        .with_context(|| format!("invalid header value in {:?}", raw))?;
    Ok((name, value))
}
