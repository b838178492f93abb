//! Minimal HTTP/1.1 server answering a scripted sequence of status codes.
//!
//! The n-th request gets the n-th status (the last one repeats). Every
//! response closes the connection.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

pub struct StatusServer {
    pub url: String,
    hits: Arc<AtomicUsize>,
    request_lines: Arc<Mutex<Vec<String>>>,
}

impl StatusServer {
    /// Requests served so far.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    /// Request lines received so far, e.g. `GET / HTTP/1.1`.
    pub fn request_lines(&self) -> Vec<String> {
        self.request_lines.lock().unwrap().clone()
    }
}

/// Starts a server in a background thread. Runs until the process exits.
pub fn start(statuses: Vec<u16>) -> StatusServer {
    start_with_headers(statuses, Vec::new())
}

/// Like `start` but adds `extra_headers` to every response.
pub fn start_with_headers(statuses: Vec<u16>, extra_headers: Vec<(String, String)>) -> StatusServer {
    assert!(!statuses.is_empty(), "need at least one status");
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    let statuses = Arc::new(statuses);
    let extra_headers = Arc::new(extra_headers);
    let request_lines = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&request_lines);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            let status = statuses[n.min(statuses.len() - 1)];
            let extra_headers = Arc::clone(&extra_headers);
            let recorded = Arc::clone(&recorded);
            thread::spawn(move || handle(stream, status, &extra_headers, &recorded));
        }
    });
    StatusServer {
        url: format!("http://127.0.0.1:{}/", port),
        hits,
        request_lines,
    }
}

fn handle(
    mut stream: TcpStream,
    status: u16,
    extra_headers: &[(String, String)],
    recorded: &Mutex<Vec<String>>,
) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(2)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) | Err(_) => return,
        Ok(n) => n,
    };
    let request = String::from_utf8_lossy(&buf[..n]);
    if let Some(line) = request.lines().next() {
        recorded.lock().unwrap().push(line.trim().to_string());
    }
    let body = format!("status {}", status);
    let mut response = format!(
        "HTTP/1.1 {} Scripted\r\nContent-Length: {}\r\nConnection: close\r\n",
        status,
        body.len()
    );
    for (name, value) in extra_headers {
        response.push_str(&format!("{}: {}\r\n", name, value));
    }
    response.push_str("\r\n");
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.write_all(body.as_bytes());
}
