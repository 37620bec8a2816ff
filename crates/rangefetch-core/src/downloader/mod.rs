//! Concurrent chunk download: per-chunk fetch with retry, and the coordinator
//! that runs chunks on a bounded worker pool and aggregates their outcomes.

mod coordinator;
mod fetch;

use std::fmt;
use std::path::PathBuf;

use crate::retry::ChunkError;
use crate::segmenter::ChunkRange;

pub(crate) use coordinator::run_chunks;
pub(crate) use fetch::FetchJob;

/// Terminal state of one chunk.
#[derive(Debug)]
pub enum ChunkStatus {
    Succeeded { bytes: u64, attempts: u32 },
    Failed(ChunkError),
    /// Stopped by cancellation; `attempts` is 0 when it never started.
    Cancelled { attempts: u32 },
}

/// Outcome of one chunk: index, range, storage handle, terminal status.
#[derive(Debug)]
pub struct ChunkReport {
    pub index: usize,
    pub range: ChunkRange,
    /// Chunk-local storage. Removed after a successful merge.
    pub path: PathBuf,
    pub status: ChunkStatus,
}

impl ChunkReport {
    pub fn succeeded(&self) -> bool {
        matches!(self.status, ChunkStatus::Succeeded { .. })
    }
}

/// Every chunk failure of one download, in chunk-index order.
#[derive(Debug)]
pub struct AggregatedDownloadError {
    pub failures: Vec<(usize, ChunkError)>,
    /// Chunks that were cancelled (never started or interrupted).
    pub cancelled: Vec<usize>,
}

impl AggregatedDownloadError {
    /// Splits reports into failures and cancellations. `None` when nothing failed.
    pub fn from_reports(reports: Vec<ChunkReport>) -> Option<Self> {
        let mut failures = Vec::new();
        let mut cancelled = Vec::new();
        for r in reports {
            match r.status {
                ChunkStatus::Failed(e) => failures.push((r.index, e)),
                ChunkStatus::Cancelled { .. } => cancelled.push(r.index),
                ChunkStatus::Succeeded { .. } => {}
            }
        }
        if failures.is_empty() {
            None
        } else {
            Some(Self {
                failures,
                cancelled,
            })
        }
    }
}

impl fmt::Display for AggregatedDownloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} chunk(s) failed", self.failures.len())?;
        for (index, err) in &self.failures {
            write!(f, "; chunk {}: {}", index, err)?;
        }
        if !self.cancelled.is_empty() {
            write!(f, " ({} cancelled)", self.cancelled.len())?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregatedDownloadError {}
