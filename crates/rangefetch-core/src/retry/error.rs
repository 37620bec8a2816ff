//! Per-attempt and per-chunk error types.

use thiserror::Error;

/// Error from a single fetch attempt (one range GET). Classified by
/// `retry::classify` before the retry loop decides what to do next.
#[derive(Debug, Error)]
pub enum FetchError {
    /// libcurl reported an error (timeout, connection, TLS, ...).
    #[error("{0}")]
    Curl(#[from] curl::Error),
    /// Response had a non-2xx status.
    #[error("HTTP {0}")]
    Http(u32),
    /// Body ended before (or ran past) the requested range length.
    #[error("partial transfer: expected {expected} bytes, got {received}")]
    PartialTransfer { expected: u64, received: u64 },
    /// Server answered with more bytes than the range asked for, i.e. it
    /// ignored the `Range` header. Retrying will not help.
    #[error("server ignored the byte range (HTTP {status}, body longer than {expected} bytes)")]
    RangeIgnored { status: u32, expected: u64 },
    /// Chunk storage could not be created or written.
    #[error("chunk storage: {0}")]
    Storage(#[from] std::io::Error),
    /// The transfer was aborted because the cancellation token fired.
    #[error("cancelled")]
    Cancelled,
    /// The transfer was aborted because the overall deadline passed.
    #[error("deadline exceeded")]
    DeadlineExceeded,
}

/// Terminal failure of one chunk after the retry loop stopped.
#[derive(Debug, Error)]
pub enum ChunkError {
    /// A non-retryable failure; no further attempts were made.
    #[error("permanent failure on attempt {attempt}: {source}")]
    Permanent {
        attempt: u32,
        #[source]
        source: FetchError,
    },
    /// Every attempt failed transiently; carries the last cause.
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: FetchError,
    },
    /// The overall deadline passed during an attempt or a backoff wait.
    #[error("deadline exceeded after {attempts} attempts")]
    DeadlineExceeded { attempts: u32 },
    /// Stopped because another chunk failed or the caller cancelled.
    #[error("cancelled after {attempts} attempts")]
    Cancelled { attempts: u32 },
    /// The worker thread died before reporting an outcome.
    #[error("worker thread panicked")]
    WorkerPanicked,
}

impl ChunkError {
    /// True for the outcomes that count as a chunk failure (everything but cancellation).
    pub fn is_failure(&self) -> bool {
        !matches!(self, ChunkError::Cancelled { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            ChunkError::Permanent { attempt, .. } => *attempt,
            ChunkError::Exhausted { attempts, .. }
            | ChunkError::DeadlineExceeded { attempts }
            | ChunkError::Cancelled { attempts } => *attempts,
            ChunkError::WorkerPanicked => 0,
        }
    }
}
