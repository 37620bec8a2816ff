//! Structured lifecycle events and the sink capability that receives them.
//!
//! The engine emits one `Event` per phase transition and per fetch attempt
//! outcome. It owns no destination: a sink decides where events go.
//! `TracingSink` forwards them to `tracing`; `MemorySink` records them.

use std::fmt;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crate::control::CancelReason;
use crate::engine::Phase;
use crate::segmenter::ChunkRange;

/// One lifecycle point, with named fields. Rendered to text only by `Display`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    PhaseChanged {
        from: Phase,
        to: Phase,
    },
    Probed {
        address: String,
        total_size: u64,
        integrity_token: Option<String>,
    },
    IntegrityTokenMissing {
        address: String,
    },
    Planned {
        chunks: usize,
        chunk_size: u64,
        last_chunk_len: u64,
    },
    AttemptStarted {
        index: usize,
        attempt: u32,
        range: ChunkRange,
    },
    AttemptSucceeded {
        index: usize,
        attempt: u32,
        bytes: u64,
    },
    AttemptFailed {
        index: usize,
        attempt: u32,
        transient: bool,
        cause: String,
    },
    BackoffScheduled {
        index: usize,
        attempt: u32,
        delay: Duration,
    },
    ChunkFailed {
        index: usize,
        cause: String,
    },
    ChunkCancelled {
        index: usize,
    },
    CancellationTriggered {
        reason: CancelReason,
    },
    ChunkMerged {
        index: usize,
        bytes: u64,
    },
    IntegrityVerified {
        token: String,
    },
    IntegrityMismatch {
        expected: String,
        actual: String,
    },
    ChunkStorageRemoved {
        path: PathBuf,
    },
    ChunkStorageRetained {
        path: PathBuf,
    },
    Completed {
        artifact: PathBuf,
        bytes: u64,
    },
    Failed {
        cause: String,
    },
}

impl Event {
    /// Short stable name, used as the `event` field in structured logs.
    pub fn name(&self) -> &'static str {
        match self {
            Event::PhaseChanged { .. } => "phase_changed",
            Event::Probed { .. } => "probed",
            Event::IntegrityTokenMissing { .. } => "integrity_token_missing",
            Event::Planned { .. } => "planned",
            Event::AttemptStarted { .. } => "attempt_started",
            Event::AttemptSucceeded { .. } => "attempt_succeeded",
            Event::AttemptFailed { .. } => "attempt_failed",
            Event::BackoffScheduled { .. } => "backoff_scheduled",
            Event::ChunkFailed { .. } => "chunk_failed",
            Event::ChunkCancelled { .. } => "chunk_cancelled",
            Event::CancellationTriggered { .. } => "cancellation_triggered",
            Event::ChunkMerged { .. } => "chunk_merged",
            Event::IntegrityVerified { .. } => "integrity_verified",
            Event::IntegrityMismatch { .. } => "integrity_mismatch",
            Event::ChunkStorageRemoved { .. } => "chunk_storage_removed",
            Event::ChunkStorageRetained { .. } => "chunk_storage_retained",
            Event::Completed { .. } => "completed",
            Event::Failed { .. } => "failed",
        }
    }

    /// Chunk index the event refers to, if any.
    pub fn chunk_index(&self) -> Option<usize> {
        match self {
            Event::AttemptStarted { index, .. }
            | Event::AttemptSucceeded { index, .. }
            | Event::AttemptFailed { index, .. }
            | Event::BackoffScheduled { index, .. }
            | Event::ChunkFailed { index, .. }
            | Event::ChunkCancelled { index }
            | Event::ChunkMerged { index, .. } => Some(*index),
            _ => None,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::PhaseChanged { from, to } => write!(f, "{:?} -> {:?}", from, to),
            Event::Probed {
                address,
                total_size,
                integrity_token,
            } => write!(
                f,
                "{} is {} bytes, integrity token {}",
                address,
                total_size,
                integrity_token.as_deref().unwrap_or("<none>")
            ),
            Event::IntegrityTokenMissing { address } => write!(
                f,
                "{} sent no integrity token; the artifact will not be verified",
                address
            ),
            Event::Planned {
                chunks,
                chunk_size,
                last_chunk_len,
            } => write!(
                f,
                "{} chunks of {} bytes (last chunk {} bytes)",
                chunks, chunk_size, last_chunk_len
            ),
            Event::AttemptStarted {
                index,
                attempt,
                range,
            } => write!(
                f,
                "chunk {} attempt {}: requesting {}",
                index,
                attempt,
                range.range_header_value()
            ),
            Event::AttemptSucceeded {
                index,
                attempt,
                bytes,
            } => write!(
                f,
                "chunk {} attempt {}: stored {} bytes",
                index, attempt, bytes
            ),
            Event::AttemptFailed {
                index,
                attempt,
                transient,
                cause,
            } => write!(
                f,
                "chunk {} attempt {} failed ({}): {}",
                index,
                attempt,
                if *transient { "transient" } else { "permanent" },
                cause
            ),
            Event::BackoffScheduled {
                index,
                attempt,
                delay,
            } => write!(
                f,
                "chunk {}: retrying after attempt {} in {:?}",
                index, attempt, delay
            ),
            Event::ChunkFailed { index, cause } => write!(f, "chunk {} failed: {}", index, cause),
            Event::ChunkCancelled { index } => write!(f, "chunk {} cancelled", index),
            Event::CancellationTriggered { reason } => {
                write!(f, "cancelling remaining chunks: {}", reason)
            }
            Event::ChunkMerged { index, bytes } => {
                write!(f, "merged chunk {} ({} bytes)", index, bytes)
            }
            Event::IntegrityVerified { token } => {
                write!(f, "integrity check passed: digest matches {}", token)
            }
            Event::IntegrityMismatch { expected, actual } => write!(
                f,
                "integrity check failed: digest {} does not match token {}",
                actual, expected
            ),
            Event::ChunkStorageRemoved { path } => {
                write!(f, "removed chunk storage {}", path.display())
            }
            Event::ChunkStorageRetained { path } => {
                write!(f, "chunk storage kept for inspection at {}", path.display())
            }
            Event::Completed { artifact, bytes } => {
                write!(f, "wrote {} bytes to {}", bytes, artifact.display())
            }
            Event::Failed { cause } => write!(f, "download failed: {}", cause),
        }
    }
}

/// Severity the engine attached to an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warning,
    Error,
}

/// Receives engine events. Called from worker threads, hence `Send + Sync`.
pub trait EventSink: Send + Sync {
    fn info(&self, event: &Event);
    fn warning(&self, event: &Event);
    fn error(&self, event: &Event);

    fn emit(&self, level: Level, event: &Event) {
        match level {
            Level::Info => self.info(event),
            Level::Warning => self.warning(event),
            Level::Error => self.error(event),
        }
    }
}

/// Forwards events to `tracing` with `event` and `chunk` fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn info(&self, event: &Event) {
        tracing::info!(event = event.name(), chunk = ?event.chunk_index(), "{}", event);
    }

    fn warning(&self, event: &Event) {
        tracing::warn!(event = event.name(), chunk = ?event.chunk_index(), "{}", event);
    }

    fn error(&self, event: &Event) {
        tracing::error!(event = event.name(), chunk = ?event.chunk_index(), "{}", event);
    }
}

/// Records every event in order. Useful for embedding and tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<(Level, Event)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, level: Level, event: &Event) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((level, event.clone()));
    }

    /// Snapshot of everything recorded so far.
    pub fn events(&self) -> Vec<(Level, Event)> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Events recorded at `level`.
    pub fn at(&self, level: Level) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, e)| e)
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events().iter().filter(|(_, e)| pred(e)).count()
    }
}

impl EventSink for MemorySink {
    fn info(&self, event: &Event) {
        self.push(Level::Info, event);
    }

    fn warning(&self, event: &Event) {
        self.push(Level::Warning, event);
    }

    fn error(&self, event: &Event) {
        self.push(Level::Error, event);
    }
}
