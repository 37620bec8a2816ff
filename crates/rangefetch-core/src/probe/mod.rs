//! HTTP HEAD / metadata probing.
//!
//! Uses the curl crate (libcurl) to fetch response headers only and read
//! `Content-Length` (required) and `ETag` (optional integrity token).

mod parse;

use std::str;
use std::time::Duration;

use thiserror::Error;

use crate::control::{AttemptContext, Interrupt};
use crate::transport::HttpOptions;

pub(crate) use parse::parse_headers;

/// What the remote endpoint told us about the resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteResource {
    /// Total size in bytes from `Content-Length`.
    pub total_size: u64,
    /// Raw `ETag` value, if present. Opaque; compared by the verifier.
    pub integrity_token: Option<String>,
    /// True if the server sent `Accept-Ranges: bytes`. Informational only.
    pub accept_ranges: bool,
}

/// Probing failed; no chunk work is started.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("HEAD request failed: {0}")]
    Transport(#[from] curl::Error),
    #[error("HEAD returned HTTP {0}")]
    Http(u32),
    #[error("response has no Content-Length header")]
    MissingContentLength,
    #[error("Content-Length {0:?} is not a byte count")]
    InvalidContentLength(String),
    #[error("probe cancelled")]
    Cancelled,
    #[error("deadline exceeded while probing")]
    DeadlineExceeded,
}

impl From<Interrupt> for ProbeError {
    fn from(i: Interrupt) -> Self {
        match i {
            Interrupt::Cancelled => ProbeError::Cancelled,
            Interrupt::DeadlineExceeded => ProbeError::DeadlineExceeded,
        }
    }
}

/// Performs a HEAD request and returns the parsed resource metadata.
///
/// Follows redirects; only the headers of the final response are parsed.
/// Blocks the current thread. The deadline in `ctx` caps the request timeout
/// and cancellation aborts the transfer from the progress callback.
pub fn probe(url: &str, opts: &HttpOptions, ctx: &AttemptContext) -> Result<RemoteResource, ProbeError> {
    ctx.check()?;
    let mut headers: Vec<String> = Vec::new();

    let mut easy = curl::easy::Easy::new();
    easy.url(url)?;
    easy.nobody(true)?; // HEAD request
    easy.follow_location(true)?;
    easy.max_redirections(opts.max_redirections)?;
    easy.connect_timeout(opts.connect_timeout)?;
    easy.timeout(bounded_timeout(opts.probe_timeout, ctx))?;
    easy.progress(true)?;

    let perform_result = {
        let mut transfer = easy.transfer();
        transfer.header_function(|data| {
            if let Ok(s) = str::from_utf8(data) {
                let line = s.trim_end();
                // A new status line starts the headers of the next (redirected) response.
                if line.starts_with("HTTP/") {
                    headers.clear();
                }
                headers.push(line.to_string());
            }
            true
        })?;
        transfer.progress_function(|_, _, _, _| ctx.interruption().is_none())?;
        transfer.perform()
    };
    if let Err(e) = perform_result {
        if let Some(why) = ctx.interruption() {
            return Err(why.into());
        }
        return Err(ProbeError::Transport(e));
    }

    let code = easy.response_code()?;
    if !(200..300).contains(&code) {
        return Err(ProbeError::Http(code));
    }

    parse_headers(&headers)
}

/// `base` capped by the time left before the deadline (at least 1ms so curl
/// does not read zero as "no timeout").
pub(crate) fn bounded_timeout(base: Duration, ctx: &AttemptContext) -> Duration {
    match ctx.remaining() {
        Some(left) => base.min(left).max(Duration::from_millis(1)),
        None => base,
    }
}
