use std::time::Duration;

/// High-level classification of an attempt failure for retry purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Operation timed out (connect/read).
    Timeout,
    /// Network-level failure (refused, reset, empty reply, short body).
    Connection,
    /// Transfer aborted because the cancellation token fired.
    Cancelled,
    /// Transfer aborted because the overall deadline passed.
    DeadlineExceeded,
    /// Any other error (HTTP status, storage, ignored range); never retried.
    Other,
}

impl ErrorKind {
    /// Transient kinds consume a retry slot and back off; everything else stops the loop.
    pub fn is_transient(self) -> bool {
        matches!(self, ErrorKind::Timeout | ErrorKind::Connection)
    }
}

/// Decision returned by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Do not retry this error.
    NoRetry,
    /// Retry after the given delay.
    RetryAfter(Duration),
}

/// Linear backoff policy: after failed attempt `n` wait `n * base_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts per chunk (including the first). At least 1.
    pub max_attempts: u32,
    /// Backoff unit; the delay after attempt `n` is `n * base_delay`.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Backoff delay after failed attempt `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }

    /// Decide what follows a failed attempt.
    ///
    /// `attempt` is 1-based (1 = first attempt). Returns `RetryDecision::NoRetry`
    /// for non-transient kinds or when the attempt budget is spent.
    pub fn decide(&self, attempt: u32, kind: ErrorKind) -> RetryDecision {
        if !kind.is_transient() || attempt >= self.max_attempts {
            return RetryDecision::NoRetry;
        }
        RetryDecision::RetryAfter(self.backoff(attempt))
    }
}

/// Explicit state of one chunk's retry loop.
///
/// `Attempting -> Succeeded`, `Attempting -> Backoff -> Attempting`,
/// `Attempting -> Exhausted` (transient, budget spent) and
/// `Attempting -> Failed` (permanent). Terminal states absorb further events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Attempting { attempt: u32 },
    Backoff { attempt: u32, delay: Duration },
    Succeeded { attempts: u32 },
    Exhausted { attempts: u32 },
    Failed { attempts: u32 },
}

impl RetryState {
    pub fn start() -> Self {
        RetryState::Attempting { attempt: 1 }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RetryState::Succeeded { .. } | RetryState::Exhausted { .. } | RetryState::Failed { .. }
        )
    }

    /// Attempts made so far (the current one included while attempting).
    pub fn attempts(&self) -> u32 {
        match *self {
            RetryState::Attempting { attempt } | RetryState::Backoff { attempt, .. } => attempt,
            RetryState::Succeeded { attempts }
            | RetryState::Exhausted { attempts }
            | RetryState::Failed { attempts } => attempts,
        }
    }

    pub fn on_success(self) -> Self {
        match self {
            RetryState::Attempting { attempt } => RetryState::Succeeded { attempts: attempt },
            other => other,
        }
    }

    pub fn on_failure(self, kind: ErrorKind, policy: &RetryPolicy) -> Self {
        match self {
            RetryState::Attempting { attempt } => match policy.decide(attempt, kind) {
                RetryDecision::RetryAfter(delay) => RetryState::Backoff { attempt, delay },
                RetryDecision::NoRetry if kind.is_transient() => {
                    RetryState::Exhausted { attempts: attempt }
                }
                RetryDecision::NoRetry => RetryState::Failed { attempts: attempt },
            },
            other => other,
        }
    }

    /// Backoff wait finished; start the next attempt.
    pub fn after_backoff(self) -> Self {
        match self {
            RetryState::Backoff { attempt, .. } => RetryState::Attempting {
                attempt: attempt + 1,
            },
            other => other,
        }
    }
}
