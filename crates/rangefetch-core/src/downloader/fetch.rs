//! One chunk: range GET into chunk storage, retried per policy.

use std::cell::Cell;
use std::io::{BufWriter, Write};

use crate::control::AttemptContext;
use crate::events::{Event, EventSink};
use crate::retry::{run_with_retry, AttemptReport, ChunkError, ErrorKind, FetchError, RetryPolicy};
use crate::segmenter::ChunkRange;
use crate::storage::ChunkStore;
use crate::transport::Transport;

/// Everything a worker needs that is shared by all chunks of one download.
pub(crate) struct FetchJob<'a, T: ?Sized> {
    pub transport: &'a T,
    pub address: &'a str,
    pub store: &'a ChunkStore,
    pub policy: &'a RetryPolicy,
    pub ctx: &'a AttemptContext,
    pub sink: &'a dyn EventSink,
}

/// Chunk fetched and flushed to storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Fetched {
    pub bytes: u64,
    pub attempts: u32,
}

impl<'a, T: Transport + ?Sized> FetchJob<'a, T> {
    /// Fetch chunk `index` until it succeeds, fails, or is interrupted.
    /// Storage is recreated on every attempt.
    pub(crate) fn fetch_chunk(&self, index: usize, range: ChunkRange) -> Result<Fetched, ChunkError> {
        let stored = Cell::new(0u64);
        let attempts = Cell::new(0u32);
        let observe = |report: AttemptReport<'_>| self.report(index, range, &stored, report);
        run_with_retry(self.policy, self.ctx, observe, |attempt| {
            attempts.set(attempt);
            let n = self.attempt(index, range)?;
            stored.set(n);
            Ok(n)
        })
        .map(|bytes| Fetched {
            bytes,
            attempts: attempts.get(),
        })
    }

    fn attempt(&self, index: usize, range: ChunkRange) -> Result<u64, FetchError> {
        let file = self.store.recreate(index)?;
        let mut out = BufWriter::new(file);
        let received = self
            .transport
            .fetch_range(self.address, range, &mut out, self.ctx)?;
        out.flush()?;
        let expected = range.len();
        if received != expected {
            return Err(FetchError::PartialTransfer { expected, received });
        }
        Ok(received)
    }

    fn report(&self, index: usize, range: ChunkRange, stored: &Cell<u64>, report: AttemptReport<'_>) {
        match report {
            AttemptReport::Started { attempt } => self.sink.info(&Event::AttemptStarted {
                index,
                attempt,
                range,
            }),
            AttemptReport::Succeeded { attempt } => self.sink.info(&Event::AttemptSucceeded {
                index,
                attempt,
                bytes: stored.get(),
            }),
            AttemptReport::Failed {
                attempt,
                kind,
                error,
            } => {
                let event = Event::AttemptFailed {
                    index,
                    attempt,
                    transient: kind.is_transient(),
                    cause: error.to_string(),
                };
                match kind {
                    ErrorKind::Cancelled | ErrorKind::DeadlineExceeded => self.sink.info(&event),
                    _ => self.sink.warning(&event),
                }
            }
            AttemptReport::Backoff { attempt, delay } => self.sink.info(&Event::BackoffScheduled {
                index,
                attempt,
                delay,
            }),
        }
    }
}
