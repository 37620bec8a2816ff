//! Bounded worker pool over the chunk queue.
//!
//! Workers pull chunk indices from a shared queue and send `(index, outcome)`
//! back over a channel. Only the coordinator looks at outcomes: on the first
//! chunk failure it sets the cancellation token (exactly once) and drains the
//! queue, then keeps receiving until every worker has exited.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::{Mutex, PoisonError};

use super::fetch::{FetchJob, Fetched};
use super::{ChunkReport, ChunkStatus};
use crate::control::CancelReason;
use crate::events::Event;
use crate::retry::ChunkError;
use crate::segmenter::{ChunkPlan, ChunkRange};
use crate::transport::Transport;

type Outcome = Result<Fetched, ChunkError>;

/// Runs every chunk of `plan` on at most `max_workers` threads and returns one
/// terminal report per chunk, in index order.
pub(crate) fn run_chunks<T: Transport + ?Sized>(
    job: &FetchJob<'_, T>,
    plan: &ChunkPlan,
    max_workers: usize,
) -> Vec<ChunkReport> {
    let count = plan.len();
    let queue: Mutex<VecDeque<(usize, ChunkRange)>> =
        Mutex::new(plan.ranges().iter().copied().enumerate().collect());
    let mut statuses: Vec<Option<ChunkStatus>> = (0..count).map(|_| None).collect();
    let num_workers = max_workers.min(count).max(1);

    std::thread::scope(|scope| {
        let (tx, rx) = mpsc::channel::<(usize, Outcome)>();
        let mut handles = Vec::with_capacity(num_workers);
        for _ in 0..num_workers {
            let tx = tx.clone();
            let queue = &queue;
            handles.push(scope.spawn(move || loop {
                if job.ctx.cancel.is_cancelled() {
                    break;
                }
                let next = queue
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .pop_front();
                let Some((index, range)) = next else {
                    break;
                };
                // A panicking fetch is a chunk failure like any other.
                let fetch = AssertUnwindSafe(|| job.fetch_chunk(index, range));
                let outcome =
                    panic::catch_unwind(fetch).unwrap_or(Err(ChunkError::WorkerPanicked));
                if tx.send((index, outcome)).is_err() {
                    break;
                }
            }));
        }
        drop(tx);

        for (index, outcome) in rx {
            let status = record(job, index, outcome);
            let failed = matches!(status, ChunkStatus::Failed(_));
            statuses[index] = Some(status);
            if failed {
                for (drained, _) in drain(&queue) {
                    job.sink.info(&Event::ChunkCancelled { index: drained });
                    statuses[drained] = Some(ChunkStatus::Cancelled { attempts: 0 });
                }
            }
        }

        for h in handles {
            if h.join().is_err() {
                tracing::error!("chunk worker panicked");
            }
        }
    });

    // Anything still queued never started; anything else without a report
    // was lost with a worker that died outside a fetch.
    let never_started: Vec<usize> = queue
        .into_inner()
        .unwrap_or_else(PoisonError::into_inner)
        .into_iter()
        .map(|(i, _)| i)
        .collect();
    for index in never_started {
        if statuses[index].is_none() {
            job.sink.info(&Event::ChunkCancelled { index });
            statuses[index] = Some(ChunkStatus::Cancelled { attempts: 0 });
        }
    }

    statuses
        .into_iter()
        .enumerate()
        .map(|(index, status)| {
            let status = status.unwrap_or_else(|| {
                let err = ChunkError::WorkerPanicked;
                job.sink.error(&Event::ChunkFailed {
                    index,
                    cause: err.to_string(),
                });
                ChunkStatus::Failed(err)
            });
            ChunkReport {
                index,
                range: plan.ranges()[index],
                path: job.store.chunk_path(index),
                status,
            }
        })
        .collect()
}

/// Turn one worker outcome into a terminal status. The first failure sets
/// the cancellation token.
fn record<T: Transport + ?Sized>(job: &FetchJob<'_, T>, index: usize, outcome: Outcome) -> ChunkStatus {
    match outcome {
        Ok(Fetched { bytes, attempts }) => ChunkStatus::Succeeded { bytes, attempts },
        Err(ChunkError::Cancelled { attempts }) => {
            job.sink.info(&Event::ChunkCancelled { index });
            ChunkStatus::Cancelled { attempts }
        }
        Err(err) => {
            job.sink.error(&Event::ChunkFailed {
                index,
                cause: err.to_string(),
            });
            let reason = match err {
                ChunkError::DeadlineExceeded { .. } => CancelReason::DeadlineExceeded,
                _ => CancelReason::ChunkFailed { index },
            };
            if job.ctx.cancel.cancel(reason) {
                job.sink.warning(&Event::CancellationTriggered { reason });
            }
            ChunkStatus::Failed(err)
        }
    }
}

/// Take every queued chunk out so no worker can start it.
fn drain(queue: &Mutex<VecDeque<(usize, ChunkRange)>>) -> Vec<(usize, ChunkRange)> {
    let drained: Vec<_> = queue
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .drain(..)
        .collect();
    if !drained.is_empty() {
        tracing::debug!(drained = drained.len(), "queued chunks will not start");
    }
    drained
}
