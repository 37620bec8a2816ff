//! Request/response transport used by the engine.
//!
//! `Transport` is the seam between the engine and the network: a metadata
//! probe and a single range fetch. `HttpTransport` implements it with libcurl;
//! tests substitute scripted transports.

mod http;

use std::io::Write;
use std::time::Duration;

use crate::control::AttemptContext;
use crate::probe::{ProbeError, RemoteResource};
use crate::retry::FetchError;
use crate::segmenter::ChunkRange;

pub use http::HttpTransport;

/// Timeouts and limits applied to every HTTP request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpOptions {
    pub connect_timeout: Duration,
    /// Wall-clock cap for the HEAD probe.
    pub probe_timeout: Duration,
    /// Wall-clock cap for one range attempt; `None` leaves it to the low-speed limit.
    pub attempt_timeout: Option<Duration>,
    /// Abort an attempt (as a timeout) if it stays below this many bytes/s ...
    pub low_speed_limit: u32,
    /// ... for this long.
    pub low_speed_time: Duration,
    pub max_redirections: u32,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(30),
            attempt_timeout: None,
            low_speed_limit: 1024,
            low_speed_time: Duration::from_secs(60),
            max_redirections: 10,
        }
    }
}

/// Network capability the engine needs: probe once, then fetch ranges.
pub trait Transport: Send + Sync {
    /// Metadata-only request for size and integrity token.
    fn probe(&self, address: &str, ctx: &AttemptContext) -> Result<RemoteResource, ProbeError>;

    /// One attempt at fetching `range`, streaming the body into `out`.
    /// Returns the number of body bytes written. Must abort with
    /// `FetchError::Cancelled`/`DeadlineExceeded` when `ctx` is interrupted.
    fn fetch_range(
        &self,
        address: &str,
        range: ChunkRange,
        out: &mut dyn Write,
        ctx: &AttemptContext,
    ) -> Result<u64, FetchError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn probe(&self, address: &str, ctx: &AttemptContext) -> Result<RemoteResource, ProbeError> {
        (**self).probe(address, ctx)
    }

    fn fetch_range(
        &self,
        address: &str,
        range: ChunkRange,
        out: &mut dyn Write,
        ctx: &AttemptContext,
    ) -> Result<u64, FetchError> {
        (**self).fetch_range(address, range, out, ctx)
    }
}

#[cfg(test)]
pub(crate) mod testing;
