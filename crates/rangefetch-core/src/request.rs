//! Immutable description of one download, validated once at construction.

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::retry::RetryPolicy;
use crate::transport::HttpOptions;

pub const DEFAULT_CHUNKS: usize = 4;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_EXTENSION: &str = "bin";
pub const DEFAULT_OUTPUT_DIR: &str = "output";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("invalid source address {address:?}: {reason}")]
    Address { address: String, reason: String },
    #[error("invalid output extension {0:?}")]
    Extension(String),
    #[error("max attempts must be at least 1")]
    NoAttempts,
}

/// What to download and how. Built with [`DownloadRequest::builder`].
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadRequest {
    address: String,
    chunk_count: usize,
    output_extension: String,
    output_dir: PathBuf,
    deadline: Option<Duration>,
    max_workers: Option<usize>,
    retry: RetryPolicy,
    http: HttpOptions,
    keep_chunks_on_failure: bool,
}

impl DownloadRequest {
    pub fn builder(address: impl Into<String>) -> DownloadRequestBuilder {
        DownloadRequestBuilder {
            address: address.into(),
            chunk_count: DEFAULT_CHUNKS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: RetryPolicy::default().base_delay,
            output_extension: DEFAULT_EXTENSION.to_string(),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            deadline: None,
            max_workers: None,
            http: HttpOptions::default(),
            keep_chunks_on_failure: false,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    pub fn max_attempts(&self) -> u32 {
        self.retry.max_attempts
    }

    pub fn output_extension(&self) -> &str {
        &self.output_extension
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Overall time budget, measured from the start of the download.
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    /// Worker-pool size: the chunk count, capped by `max_workers` when set.
    pub fn worker_count(&self) -> usize {
        match self.max_workers {
            Some(cap) => cap.clamp(1, self.chunk_count.max(1)),
            None => self.chunk_count.max(1),
        }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn http_options(&self) -> &HttpOptions {
        &self.http
    }

    pub fn keep_chunks_on_failure(&self) -> bool {
        self.keep_chunks_on_failure
    }
}

#[derive(Debug, Clone)]
pub struct DownloadRequestBuilder {
    address: String,
    chunk_count: usize,
    max_attempts: u32,
    base_delay: Duration,
    output_extension: String,
    output_dir: PathBuf,
    deadline: Option<Duration>,
    max_workers: Option<usize>,
    http: HttpOptions,
    keep_chunks_on_failure: bool,
}

impl DownloadRequestBuilder {
    /// Chunk count is checked by the planner against the probed size, not here.
    pub fn chunk_count(mut self, n: usize) -> Self {
        self.chunk_count = n;
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    /// Backoff unit: attempt `k` waits `k * base_delay` before attempt `k + 1`.
    pub fn base_delay(mut self, d: Duration) -> Self {
        self.base_delay = d;
        self
    }

    pub fn output_extension(mut self, ext: impl Into<String>) -> Self {
        self.output_extension = ext.into();
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn deadline(mut self, d: Option<Duration>) -> Self {
        self.deadline = d;
        self
    }

    pub fn max_workers(mut self, n: Option<usize>) -> Self {
        self.max_workers = n;
        self
    }

    pub fn http_options(mut self, opts: HttpOptions) -> Self {
        self.http = opts;
        self
    }

    pub fn keep_chunks_on_failure(mut self, keep: bool) -> Self {
        self.keep_chunks_on_failure = keep;
        self
    }

    pub fn build(self) -> Result<DownloadRequest, RequestError> {
        validate_address(&self.address)?;
        let output_extension = normalize_extension(&self.output_extension)?;
        if self.max_attempts == 0 {
            return Err(RequestError::NoAttempts);
        }
        Ok(DownloadRequest {
            address: self.address,
            chunk_count: self.chunk_count,
            output_extension,
            output_dir: self.output_dir,
            deadline: self.deadline,
            max_workers: self.max_workers,
            retry: RetryPolicy::new(self.max_attempts, self.base_delay),
            http: self.http,
            keep_chunks_on_failure: self.keep_chunks_on_failure,
        })
    }
}

fn validate_address(address: &str) -> Result<(), RequestError> {
    let err = |reason: String| RequestError::Address {
        address: address.to_string(),
        reason,
    };
    let parsed = url::Url::parse(address).map_err(|e| err(e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => {}
        other => return Err(err(format!("unsupported scheme {:?}", other))),
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(err("missing host".to_string()));
    }
    Ok(())
}

/// Accepts `csv` or `.csv`. Rejects anything that could escape the output
/// directory or is not a plain filename suffix.
fn normalize_extension(ext: &str) -> Result<String, RequestError> {
    let trimmed = ext.trim().trim_start_matches('.');
    let ok = !trimmed.is_empty()
        && trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        && !trimmed.contains("..");
    if ok {
        Ok(trimmed.to_string())
    } else {
        Err(RequestError::Extension(ext.to_string()))
    }
}
