//! Minimal HTTP/1.1 server that supports HEAD and Range GET for integration tests.
//!
//! Serves a single static body. Responds to HEAD with Content-Length (unless
//! told to omit it), an optional ETag and Accept-Ranges: bytes; responds to GET
//! with Range with 206 Partial Content. Individual ranges can be made to fail
//! or to respond late.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct RangeServerOptions {
    /// Sent as the `ETag` header on HEAD (verbatim, include quotes).
    pub etag: Option<String>,
    /// If true, HEAD omits Content-Length.
    pub omit_content_length: bool,
    /// If true, GET ignores Range and always returns 200 with the full body.
    pub ignore_ranges: bool,
    /// GETs whose range starts at the key are answered with this status.
    pub fail_range_start: HashMap<u64, u16>,
    /// GETs whose range starts at the key are answered after this delay.
    pub delay_range_start: HashMap<u64, Duration>,
}

/// A running server. It runs until the process exits.
pub struct RangeServer {
    pub url: String,
    gets: Arc<AtomicUsize>,
}

impl RangeServer {
    /// Number of GET requests served so far.
    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }
}

/// Starts a server in a background thread serving `body`.
pub fn start(body: Vec<u8>) -> RangeServer {
    start_with_options(body, RangeServerOptions::default())
}

/// Like `start` but allows customizing server behavior.
pub fn start_with_options(body: Vec<u8>, opts: RangeServerOptions) -> RangeServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let body = Arc::new(body);
    let opts = Arc::new(opts);
    let gets = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&gets);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let body = Arc::clone(&body);
            let opts = Arc::clone(&opts);
            let counter = Arc::clone(&counter);
            thread::spawn(move || handle(stream, &body, &opts, &counter));
        }
    });
    RangeServer {
        url: format!("http://127.0.0.1:{}/data.csv", port),
        gets,
    }
}

fn handle(
    mut stream: std::net::TcpStream,
    body: &[u8],
    opts: &RangeServerOptions,
    gets: &AtomicUsize,
) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(2)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) => return,
        Ok(n) => n,
        Err(_) => return,
    };
    let request = match std::str::from_utf8(&buf[..n]) {
        Ok(s) => s,
        Err(_) => return,
    };
    let (method, range) = parse_request(request);
    let total = body.len() as u64;

    if method.eq_ignore_ascii_case("HEAD") {
        let length = if opts.omit_content_length {
            String::new()
        } else {
            format!("Content-Length: {}\r\n", total)
        };
        let etag = opts
            .etag
            .as_ref()
            .map(|t| format!("ETag: {}\r\n", t))
            .unwrap_or_default();
        let response = format!(
            "HTTP/1.1 200 OK\r\n{}{}Accept-Ranges: bytes\r\nConnection: close\r\n\r\n",
            length, etag
        );
        let _ = stream.write_all(response.as_bytes());
        return;
    }

    if method.eq_ignore_ascii_case("GET") {
        gets.fetch_add(1, Ordering::SeqCst);
        if let Some((start, _)) = range {
            if let Some(delay) = opts.delay_range_start.get(&start) {
                thread::sleep(*delay);
            }
            if let Some(status) = opts.fail_range_start.get(&start) {
                let response = format!(
                    "HTTP/1.1 {} Injected Failure\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                    status
                );
                let _ = stream.write_all(response.as_bytes());
                return;
            }
        }
        let (status, slice) = match range {
            Some((start, end_incl)) if !opts.ignore_ranges => {
                let end_incl = end_incl.min(total.saturating_sub(1));
                if start > end_incl {
                    ("416 Range Not Satisfiable", &body[0..0])
                } else {
                    ("206 Partial Content", &body[start as usize..=end_incl as usize])
                }
            }
            _ => ("200 OK", body),
        };
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            status,
            slice.len()
        );
        let _ = stream.write_all(response.as_bytes());
        let _ = stream.write_all(slice);
        return;
    }
    let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\n\r\n");
}

/// Returns (method, optional (start, end_inclusive) for Range: bytes=X-Y).
fn parse_request(request: &str) -> (&str, Option<(u64, u64)>) {
    let mut method = "";
    let mut range = None;
    for line in request.lines() {
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        if method.is_empty() {
            method = line.split_whitespace().next().unwrap_or("");
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("range") {
                let value = value.trim();
                if let Some(part) = value.strip_prefix("bytes=") {
                    if let Some((a, b)) = part.split_once('-') {
                        let start = a.trim().parse::<u64>().unwrap_or(0);
                        let end = b.trim();
                        let end_incl = if end.is_empty() {
                            u64::MAX
                        } else {
                            end.parse::<u64>().unwrap_or(0)
                        };
                        range = Some((start, end_incl));
                    }
                }
            }
        }
    }
    (method, range)
}
