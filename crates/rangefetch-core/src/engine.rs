//! Download lifecycle: probe, plan, fetch, merge, verify.
//!
//! `Idle → Probing → Planning → Fetching → AllSucceeded → Merging → Verifying → Done`,
//! or `Fetching → AnyFailed → Cancelling → Failed`. Any step may also go
//! straight to `Failed`. Every transition is emitted as an event.

use std::path::PathBuf;
use std::time::Instant;

use chrono::Local;

use crate::control::{AttemptContext, CancelReason, CancelToken};
use crate::downloader::{run_chunks, AggregatedDownloadError, ChunkReport, FetchJob};
use crate::error::DownloadError;
use crate::events::{Event, EventSink};
use crate::merge::{algorithm_for, merge_chunks, verify, IntegrityVerdict};
use crate::probe::{ProbeError, RemoteResource};
use crate::request::DownloadRequest;
use crate::segmenter::{plan_chunks, ChunkPlan};
use crate::storage::{artifact_path, ChunkStore, STAMP_FORMAT};
use crate::transport::{HttpTransport, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Probing,
    Planning,
    Fetching,
    AllSucceeded,
    Merging,
    Verifying,
    Done,
    AnyFailed,
    Cancelling,
    Failed,
}

/// Successful download.
#[derive(Debug)]
pub struct AggregateOutcome {
    pub resource: RemoteResource,
    pub plan: ChunkPlan,
    /// One report per chunk, in index order. Storage paths no longer exist.
    pub chunks: Vec<ChunkReport>,
    pub artifact: PathBuf,
    pub bytes: u64,
    /// Hex digest of the artifact, in the algorithm the token asked for (MD5 otherwise).
    pub digest: String,
    pub verdict: IntegrityVerdict,
}

/// Download `request` over HTTP.
pub fn download(
    request: &DownloadRequest,
    sink: &dyn EventSink,
    cancel: CancelToken,
) -> Result<AggregateOutcome, DownloadError> {
    let transport = HttpTransport::new(*request.http_options());
    download_with(request, &transport, sink, cancel)
}

/// Download `request` through any transport.
pub fn download_with<T: Transport + ?Sized>(
    request: &DownloadRequest,
    transport: &T,
    sink: &dyn EventSink,
    cancel: CancelToken,
) -> Result<AggregateOutcome, DownloadError> {
    let deadline = request.deadline().map(|d| Instant::now() + d);
    let ctx = AttemptContext::new(cancel, deadline);
    let mut life = Lifecycle::new(sink);
    let address = request.address();

    life.enter(Phase::Probing);
    let resource = match transport.probe(address, &ctx) {
        Ok(r) => r,
        Err(ProbeError::Cancelled) => return Err(life.fail(cancelled(&ctx))),
        Err(e) => return Err(life.fail(e.into())),
    };
    sink.info(&Event::Probed {
        address: address.to_string(),
        total_size: resource.total_size,
        integrity_token: resource.integrity_token.clone(),
    });
    if resource.integrity_token.is_none() {
        sink.warning(&Event::IntegrityTokenMissing {
            address: address.to_string(),
        });
    }

    life.enter(Phase::Planning);
    let plan = plan_chunks(resource.total_size, request.chunk_count())
        .map_err(|e| life.fail(e.into()))?;
    let last_chunk_len = plan.ranges().last().map_or(0, |r| r.len());
    sink.info(&Event::Planned {
        chunks: plan.len(),
        chunk_size: plan.chunk_size(),
        last_chunk_len,
    });

    life.enter(Phase::Fetching);
    let started = Local::now();
    let output_dir = request.output_dir();
    let stamp = started.format(STAMP_FORMAT).to_string();
    let store = ChunkStore::create_unique_in(output_dir, &stamp).map_err(|source| {
        life.fail(DownloadError::Storage {
            path: output_dir.to_path_buf(),
            source,
        })
    })?;
    let job = FetchJob {
        transport,
        address,
        store: &store,
        policy: request.retry_policy(),
        ctx: &ctx,
        sink,
    };
    let chunks = run_chunks(&job, &plan, request.worker_count());

    if !chunks.iter().all(ChunkReport::succeeded) {
        life.enter(Phase::AnyFailed);
        life.enter(Phase::Cancelling);
        release(store, request.keep_chunks_on_failure(), sink);
        let err = match AggregatedDownloadError::from_reports(chunks) {
            Some(agg) => DownloadError::Aggregated(agg),
            None => cancelled(&ctx),
        };
        return Err(life.fail(err));
    }

    life.enter(Phase::AllSucceeded);
    life.enter(Phase::Merging);
    let token = resource.integrity_token.as_deref();
    let artifact = artifact_path(output_dir, request.output_extension(), &started);
    let merged = match merge_chunks(
        &store,
        plan.len(),
        &artifact,
        plan.total_size(),
        algorithm_for(token),
        sink,
    ) {
        Ok(m) => m,
        Err(e) => {
            release(store, request.keep_chunks_on_failure(), sink);
            return Err(life.fail(e.into()));
        }
    };
    release(store, false, sink);

    life.enter(Phase::Verifying);
    let verdict = verify(token, &merged.digest);
    match &verdict {
        IntegrityVerdict::Match { token } => sink.info(&Event::IntegrityVerified {
            token: token.clone(),
        }),
        IntegrityVerdict::Mismatch { expected, actual } => {
            sink.warning(&Event::IntegrityMismatch {
                expected: expected.clone(),
                actual: actual.clone(),
            })
        }
        IntegrityVerdict::Unverifiable => {}
    }

    life.enter(Phase::Done);
    sink.info(&Event::Completed {
        artifact: merged.artifact.clone(),
        bytes: merged.bytes,
    });
    Ok(AggregateOutcome {
        resource,
        plan,
        chunks,
        artifact: merged.artifact,
        bytes: merged.bytes,
        digest: merged.digest,
        verdict,
    })
}

fn cancelled(ctx: &AttemptContext) -> DownloadError {
    let reason = ctx.cancel.reason().unwrap_or(if ctx.deadline_passed() {
        CancelReason::DeadlineExceeded
    } else {
        CancelReason::Requested
    });
    DownloadError::Cancelled { reason }
}

/// Delete chunk storage, or keep it and say where.
fn release(store: ChunkStore, keep: bool, sink: &dyn EventSink) {
    if keep {
        let path = store.retain();
        sink.warning(&Event::ChunkStorageRetained { path });
        return;
    }
    let path = store.dir().to_path_buf();
    match store.remove() {
        Ok(()) => sink.info(&Event::ChunkStorageRemoved { path }),
        Err(e) => tracing::warn!(path = %path.display(), "could not remove chunk storage: {}", e),
    }
}

struct Lifecycle<'a> {
    phase: Phase,
    sink: &'a dyn EventSink,
}

impl<'a> Lifecycle<'a> {
    fn new(sink: &'a dyn EventSink) -> Self {
        Self {
            phase: Phase::Idle,
            sink,
        }
    }

    fn enter(&mut self, to: Phase) {
        let from = std::mem::replace(&mut self.phase, to);
        self.sink.info(&Event::PhaseChanged { from, to });
    }

    fn fail(&mut self, err: DownloadError) -> DownloadError {
        self.enter(Phase::Failed);
        self.sink.error(&Event::Failed {
            cause: err.to_string(),
        });
        err
    }
}
