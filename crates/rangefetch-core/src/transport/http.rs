//! libcurl transport: HEAD probe and single range GET.

use std::cell::Cell;
use std::io::Write;
use std::str;
use std::time::Duration;

use super::{HttpOptions, Transport};
use crate::control::{AttemptContext, Interrupt};
use crate::probe::{self, ProbeError, RemoteResource};
use crate::retry::FetchError;
use crate::segmenter::ChunkRange;

/// Blocking libcurl transport. One fresh Easy handle per request.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    opts: HttpOptions,
}

impl HttpTransport {
    pub fn new(opts: HttpOptions) -> Self {
        Self { opts }
    }

    pub fn options(&self) -> &HttpOptions {
        &self.opts
    }
}

impl Transport for HttpTransport {
    fn probe(&self, address: &str, ctx: &AttemptContext) -> Result<RemoteResource, ProbeError> {
        probe::probe(address, &self.opts, ctx)
    }

    fn fetch_range(
        &self,
        address: &str,
        range: ChunkRange,
        out: &mut dyn Write,
        ctx: &AttemptContext,
    ) -> Result<u64, FetchError> {
        fetch_one_range(address, range, out, &self.opts, ctx)
    }
}

fn interrupted(why: Interrupt) -> FetchError {
    match why {
        Interrupt::Cancelled => FetchError::Cancelled,
        Interrupt::DeadlineExceeded => FetchError::DeadlineExceeded,
    }
}

/// Status code from an HTTP status line ("HTTP/1.1 206 Partial Content").
fn parse_status_line(line: &str) -> Option<u32> {
    if !line.starts_with("HTTP/") {
        return None;
    }
    line.split_whitespace().nth(1)?.parse().ok()
}

/// GET with `Range: bytes=start-end`, streaming the body into `out`.
///
/// The body is only written once the final response is known to be 2xx, and
/// never past the range length: a longer body means the server ignored the
/// range, and the transfer is aborted.
fn fetch_one_range(
    url: &str,
    range: ChunkRange,
    out: &mut dyn Write,
    opts: &HttpOptions,
    ctx: &AttemptContext,
) -> Result<u64, FetchError> {
    ctx.check().map_err(interrupted)?;

    let expected = range.len();
    let mut received = 0u64;
    let status: Cell<Option<u32>> = Cell::new(None);
    let mut overflow = false;
    let mut storage_error: Option<std::io::Error> = None;

    let mut easy = curl::easy::Easy::new();
    easy.url(url)?;
    easy.follow_location(true)?;
    easy.max_redirections(opts.max_redirections)?;
    easy.connect_timeout(opts.connect_timeout)?;
    // Low-speed limit: abort if throughput stays under the limit, so big
    // chunks on slow links are not killed by a hard wall-clock timeout.
    easy.low_speed_limit(opts.low_speed_limit)?;
    easy.low_speed_time(opts.low_speed_time)?;
    let wall_clock = match opts.attempt_timeout {
        Some(t) => Some(probe::bounded_timeout(t, ctx)),
        None => ctx.remaining().map(|left| left.max(Duration::from_millis(1))),
    };
    if let Some(t) = wall_clock {
        easy.timeout(t)?;
    }
    // curl expects "start-end" (inclusive), not "bytes=start-end".
    easy.range(&range.curl_range())?;
    easy.progress(true)?;

    let perform_result = {
        let mut transfer = easy.transfer();
        transfer.header_function(|data| {
            if let Ok(s) = str::from_utf8(data) {
                if let Some(code) = parse_status_line(s.trim_end()) {
                    status.set(Some(code));
                }
            }
            true
        })?;
        transfer.write_function(|data| {
            let ok = matches!(status.get(), Some(code) if (200..300).contains(&code));
            if !ok {
                // Error page body; drop it, the status is reported after perform.
                return Ok(data.len());
            }
            if received + data.len() as u64 > expected {
                overflow = true;
                return Ok(0);
            }
            if let Err(e) = out.write_all(data) {
                storage_error = Some(e);
                return Ok(0);
            }
            received += data.len() as u64;
            Ok(data.len())
        })?;
        transfer.progress_function(|_, _, _, _| ctx.interruption().is_none())?;
        transfer.perform()
    };

    if let Err(e) = perform_result {
        if let Some(io_err) = storage_error {
            return Err(FetchError::Storage(io_err));
        }
        if overflow {
            return Err(FetchError::RangeIgnored {
                status: status.get().unwrap_or(0),
                expected,
            });
        }
        if let Some(why) = ctx.interruption() {
            return Err(interrupted(why));
        }
        return Err(FetchError::Curl(e));
    }

    let code = easy.response_code()?;
    if !(200..300).contains(&code) {
        return Err(FetchError::Http(code));
    }
    if received != expected {
        return Err(FetchError::PartialTransfer { expected, received });
    }
    Ok(received)
}
