//! Cancellation and deadline control shared by every worker of one download.
//!
//! A `CancelToken` is set at most once; the first caller wins and records the
//! reason. Workers poll it before each attempt and from the curl progress
//! callback, and backoff sleeps wait on it so they wake as soon as it fires.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Why a download was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// A chunk failed permanently or exhausted its attempts.
    ChunkFailed { index: usize },
    /// The caller-supplied overall deadline passed.
    DeadlineExceeded,
    /// Cancellation requested from outside the engine (e.g. Ctrl-C).
    Requested,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::ChunkFailed { index } => write!(f, "chunk {} failed", index),
            CancelReason::DeadlineExceeded => write!(f, "deadline exceeded"),
            CancelReason::Requested => write!(f, "cancellation requested"),
        }
    }
}

struct Inner {
    cancelled: AtomicBool,
    reason: Mutex<Option<CancelReason>>,
    wake: Condvar,
}

/// One-shot cancellation signal. Cheap to clone; all clones share the same state.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("reason", &self.reason())
            .finish()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                reason: Mutex::new(None),
                wake: Condvar::new(),
            }),
        }
    }

    /// Set the token. Returns true only for the call that actually set it;
    /// later calls keep the first reason.
    pub fn cancel(&self, reason: CancelReason) -> bool {
        let mut slot = self
            .inner
            .reason
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return false;
        }
        *slot = Some(reason);
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.wake.notify_all();
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Reason recorded by the first `cancel` call, if any.
    pub fn reason(&self) -> Option<CancelReason> {
        *self
            .inner
            .reason
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleep up to `timeout`, returning early (false) if the token fires.
    /// Returns true when the full duration elapsed without cancellation.
    pub fn sleep(&self, timeout: Duration) -> bool {
        let slot = self
            .inner
            .reason
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let (slot, _) = self
            .inner
            .wake
            .wait_timeout_while(slot, timeout, |reason| reason.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        slot.is_none()
    }
}

/// Why an attempt or a wait was cut short.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    Cancelled,
    DeadlineExceeded,
}

/// Cancellation token plus the optional overall deadline of one download.
/// Passed by reference to the prober, every fetch attempt, and backoff sleeps.
#[derive(Debug, Clone, Default)]
pub struct AttemptContext {
    pub cancel: CancelToken,
    pub deadline: Option<Instant>,
}

impl AttemptContext {
    pub fn new(cancel: CancelToken, deadline: Option<Instant>) -> Self {
        Self { cancel, deadline }
    }

    /// Time left before the deadline; `None` when there is no deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn deadline_passed(&self) -> bool {
        self.deadline.map(|d| Instant::now() >= d).unwrap_or(false)
    }

    /// Cancellation takes precedence over the deadline.
    pub fn interruption(&self) -> Option<Interrupt> {
        if self.cancel.is_cancelled() {
            Some(Interrupt::Cancelled)
        } else if self.deadline_passed() {
            Some(Interrupt::DeadlineExceeded)
        } else {
            None
        }
    }

    pub fn check(&self) -> Result<(), Interrupt> {
        match self.interruption() {
            Some(i) => Err(i),
            None => Ok(()),
        }
    }

    /// Backoff sleep bounded by the deadline and woken by cancellation.
    pub fn sleep(&self, delay: Duration) -> Result<(), Interrupt> {
        self.check()?;
        let bounded = match self.remaining() {
            Some(left) if left < delay => {
                if !self.cancel.sleep(left) {
                    return Err(Interrupt::Cancelled);
                }
                return Err(Interrupt::DeadlineExceeded);
            }
            _ => delay,
        };
        if !self.cancel.sleep(bounded) {
            return Err(Interrupt::Cancelled);
        }
        self.check()
    }
}
