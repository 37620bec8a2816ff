//! Retry and backoff policy.
//!
//! This module encapsulates attempt error classification (timeouts,
//! connection failures vs. permanent failures), the linear backoff policy and
//! the explicit per-chunk retry state machine, so the chunk fetcher and the
//! coordinator share one policy.

mod classify;
mod error;
mod policy;
mod run;

pub use classify::{classify, classify_curl_error};
pub use error::{ChunkError, FetchError};
pub use policy::{ErrorKind, RetryDecision, RetryPolicy, RetryState};
pub use run::{run_with_retry, AttemptReport};
