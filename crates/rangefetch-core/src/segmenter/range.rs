//! Chunk range type and plan construction.

use thiserror::Error;

/// A single chunk: byte range `[start, end]` (both inclusive, 0-indexed).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRange {
    /// First byte offset (inclusive).
    pub start: u64,
    /// Last byte offset (inclusive).
    pub end: u64,
}

impl ChunkRange {
    /// Length of this chunk in bytes. Never zero for a planned range.
    pub fn len(&self) -> u64 {
        (self.end + 1).saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    /// HTTP Range header value: `bytes=start-end`.
    pub fn range_header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }

    /// Range spec as libcurl expects it (no `bytes=` unit): `start-end`.
    pub fn curl_range(&self) -> String {
        format!("{}-{}", self.start, self.end)
    }
}

/// Planning failed because the chunk count does not fit the resource.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("chunk count must be at least 1")]
    NoChunks,
    #[error("resource is empty (0 bytes); nothing to split")]
    EmptyResource,
    #[error("{chunks} chunks requested for a {total_size}-byte resource; a chunk would be empty")]
    TooManyChunks { chunks: usize, total_size: u64 },
}

/// Ordered, contiguous, disjoint ranges covering exactly `[0, total_size)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPlan {
    total_size: u64,
    ranges: Vec<ChunkRange>,
}

impl ChunkPlan {
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Number of chunks (always at least 1).
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn ranges(&self) -> &[ChunkRange] {
        &self.ranges
    }

    pub fn get(&self, index: usize) -> Option<ChunkRange> {
        self.ranges.get(index).copied()
    }

    /// Nominal chunk length (`total_size / chunks`); the last chunk also carries the remainder.
    pub fn chunk_size(&self) -> u64 {
        self.ranges.first().map(ChunkRange::len).unwrap_or(0)
    }
}

/// Builds a chunk plan for `total_size` bytes split into `chunk_count` ranges.
///
/// Every chunk gets `total_size / chunk_count` bytes and the remainder of the
/// division goes to the last chunk only.
pub fn plan_chunks(total_size: u64, chunk_count: usize) -> Result<ChunkPlan, PlanError> {
    if chunk_count == 0 {
        return Err(PlanError::NoChunks);
    }
    if total_size == 0 {
        return Err(PlanError::EmptyResource);
    }
    let n = chunk_count as u64;
    if n > total_size {
        return Err(PlanError::TooManyChunks {
            chunks: chunk_count,
            total_size,
        });
    }

    let chunk_size = total_size / n;
    let mut ranges = Vec::with_capacity(chunk_count);
    for i in 0..n {
        let start = i * chunk_size;
        let end = if i == n - 1 {
            total_size - 1
        } else {
            (i + 1) * chunk_size - 1
        };
        ranges.push(ChunkRange { start, end });
    }

    Ok(ChunkPlan { total_size, ranges })
}
