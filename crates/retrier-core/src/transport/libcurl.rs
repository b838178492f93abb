//! Blocking round tripper over libcurl.
//!
//! One `Easy` handle per request. Runs in the current thread; call from
//! `spawn_blocking` if used from async code.

use std::str;
use std::time::Duration;

use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method, StatusCode};

use super::{Request, Response, RoundTrip};
use crate::retry::BoxError;

#[derive(Debug, Clone)]
pub struct CurlTransport {
    connect_timeout: Duration,
    timeout: Duration,
    follow_redirects: bool,
}

impl Default for CurlTransport {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(15),
            timeout: Duration::from_secs(30),
            follow_redirects: true,
        }
    }
}

impl CurlTransport {
    pub fn new(connect_timeout: Duration, timeout: Duration) -> Self {
        Self {
            connect_timeout,
            timeout,
            ..Self::default()
        }
    }

    pub fn follow_redirects(mut self, follow: bool) -> Self {
        self.follow_redirects = follow;
        self
    }

    fn perform(&self, req: &Request) -> Result<Response, BoxError> {
        let mut header_lines: Vec<String> = Vec::new();
        let mut body: Vec<u8> = Vec::new();

        let mut easy = curl::easy::Easy::new();
        easy.url(&req.uri().to_string())?;
        // Post fields switch curl to POST, so any other method carrying a body
        // is restored with a custom request line. HEAD bodies are not sent.
        let req_body = req.body();
        match *req.method() {
            Method::GET if req_body.is_empty() => easy.get(true)?,
            Method::HEAD => easy.nobody(true)?,
            Method::POST => easy.post_fields_copy(req_body)?,
            ref other => {
                if !req_body.is_empty() {
                    easy.post_fields_copy(req_body)?;
                }
                easy.custom_request(other.as_str())?;
            }
        }
        easy.follow_location(self.follow_redirects)?;
        easy.connect_timeout(self.connect_timeout)?;
        easy.timeout(self.timeout)?;

        if !req.headers().is_empty() {
            let mut list = curl::easy::List::new();
            for (name, value) in req.headers() {
                let value = value.to_str()?;
                list.append(&format!("{}: {}", name.as_str(), value.trim()))?;
            }
            easy.http_headers(list)?;
        }

        {
            let mut transfer = easy.transfer();
            transfer.header_function(|data| {
                if let Ok(s) = str::from_utf8(data) {
                    header_lines.push(s.trim_end().to_string());
                }
                true
            })?;
            transfer.write_function(|data| {
                body.extend_from_slice(data);
                Ok(data.len())
            })?;
            transfer.perform()?;
        }

        let code = u16::try_from(easy.response_code()?)?;
        let mut resp = http::Response::new(body);
        *resp.status_mut() = StatusCode::from_u16(code)?;
        *resp.headers_mut() = parse_headers(&header_lines);
        Ok(resp)
    }
}

impl RoundTrip for CurlTransport {
    fn round_trip(&self, req: &Request) -> Result<Response, BoxError> {
        self.perform(req)
    }
}

/// Build a header map from raw header lines. With redirects curl reports one
/// block per hop; only the last block (after the final status line) is kept.
fn parse_headers(lines: &[String]) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for line in lines {
        let line = line.trim();
        if line.starts_with("HTTP/") {
            headers.clear();
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            let name = HeaderName::from_bytes(name.trim().as_bytes());
            let value = HeaderValue::from_str(value.trim());
            if let (Ok(name), Ok(value)) = (name, value) {
                headers.append(name, value);
            }
        }
    }
    headers
}
