//! Retry loop: run an attempt closure until success or the policy says stop.

use super::classify;
use super::error::{ChunkError, FetchError};
use super::policy::{ErrorKind, RetryPolicy, RetryState};
use crate::control::{AttemptContext, Interrupt};
use std::time::Duration;

/// Progress of the retry loop, reported to the caller's observer.
#[derive(Debug)]
pub enum AttemptReport<'a> {
    Started { attempt: u32 },
    Succeeded { attempt: u32 },
    Failed {
        attempt: u32,
        kind: ErrorKind,
        error: &'a FetchError,
    },
    Backoff { attempt: u32, delay: Duration },
}

fn interrupted(why: Interrupt, attempts: u32) -> ChunkError {
    match why {
        Interrupt::Cancelled => ChunkError::Cancelled { attempts },
        Interrupt::DeadlineExceeded => ChunkError::DeadlineExceeded { attempts },
    }
}

/// Runs `f(attempt)` driven by `RetryState` until it succeeds or stops.
///
/// Cancellation and the deadline are checked before every attempt, so no new
/// attempt starts once the token is set. Backoff waits wake early on cancellation.
pub fn run_with_retry<T, F, O>(
    policy: &RetryPolicy,
    ctx: &AttemptContext,
    mut observe: O,
    mut f: F,
) -> Result<T, ChunkError>
where
    F: FnMut(u32) -> Result<T, FetchError>,
    O: FnMut(AttemptReport<'_>),
{
    let mut state = RetryState::start();
    loop {
        let attempt = state.attempts();
        if let Err(why) = ctx.check() {
            return Err(interrupted(why, attempt - 1));
        }
        observe(AttemptReport::Started { attempt });

        let err = match f(attempt) {
            Ok(value) => {
                observe(AttemptReport::Succeeded { attempt });
                return Ok(value);
            }
            Err(e) => e,
        };

        let kind = classify::classify(&err);
        observe(AttemptReport::Failed {
            attempt,
            kind,
            error: &err,
        });
        match kind {
            ErrorKind::Cancelled => return Err(ChunkError::Cancelled { attempts: attempt }),
            ErrorKind::DeadlineExceeded => {
                return Err(ChunkError::DeadlineExceeded { attempts: attempt })
            }
            _ => {}
        }

        state = state.on_failure(kind, policy);
        match state {
            RetryState::Backoff { attempt, delay } => {
                observe(AttemptReport::Backoff { attempt, delay });
                if let Err(why) = ctx.sleep(delay) {
                    return Err(interrupted(why, attempt));
                }
                state = state.after_backoff();
            }
            RetryState::Exhausted { attempts } => {
                return Err(ChunkError::Exhausted {
                    attempts,
                    last: err,
                })
            }
            RetryState::Failed { attempts } => {
                return Err(ChunkError::Permanent {
                    attempt: attempts,
                    source: err,
                })
            }
            RetryState::Attempting { .. } | RetryState::Succeeded { .. } => {
                unreachable!("on_failure never yields {:?}", state)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{CancelReason, CancelToken};
    use std::time::Instant;

    fn timeout() -> FetchError {
        FetchError::Curl(curl::Error::new(28))
    }

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(1))
    }

    #[test]
    fn succeeds_after_transient_failures() {
        let ctx = AttemptContext::default();
        let mut calls = 0;
        let out = run_with_retry(&fast(3), &ctx, |_| {}, |attempt| {
            calls += 1;
            if attempt < 3 {
                Err(timeout())
            } else {
                Ok(attempt)
            }
        });
        assert_eq!(out.unwrap(), 3);
        assert_eq!(calls, 3);
    }

    #[test]
    fn exhausts_with_last_transient_error() {
        let ctx = AttemptContext::default();
        let err = run_with_retry(&fast(2), &ctx, |_| {}, |_| -> Result<(), _> {
            Err(FetchError::PartialTransfer {
                expected: 10,
                received: 3,
            })
        })
        .unwrap_err();
        match err {
            ChunkError::Exhausted { attempts, last } => {
                assert_eq!(attempts, 2);
                assert!(matches!(last, FetchError::PartialTransfer { received: 3, .. }));
            }
            other => panic!("expected Exhausted, got {:?}", other),
        }
    }

    #[test]
    fn permanent_error_stops_immediately() {
        let ctx = AttemptContext::default();
        let mut calls = 0;
        let err = run_with_retry(&fast(5), &ctx, |_| {}, |_| -> Result<(), _> {
            calls += 1;
            Err(FetchError::Http(404))
        })
        .unwrap_err();
        assert_eq!(calls, 1);
        assert!(matches!(
            err,
            ChunkError::Permanent {
                attempt: 1,
                source: FetchError::Http(404)
            }
        ));
    }

    #[test]
    fn no_attempt_after_cancellation() {
        let ctx = AttemptContext::default();
        ctx.cancel.cancel(CancelReason::Requested);
        let mut calls = 0;
        let err = run_with_retry(&fast(3), &ctx, |_| {}, |_| -> Result<(), FetchError> {
            calls += 1;
            Ok(())
        })
        .unwrap_err();
        assert_eq!(calls, 0);
        assert!(matches!(err, ChunkError::Cancelled { attempts: 0 }));
    }

    #[test]
    fn cancellation_during_backoff_stops_loop() {
        let cancel = CancelToken::new();
        let ctx = AttemptContext::new(cancel.clone(), None);
        let policy = RetryPolicy::new(5, Duration::from_secs(30));
        let start = Instant::now();
        let mut calls = 0;
        let err = run_with_retry(
            &policy,
            &ctx,
            |report| {
                if let AttemptReport::Backoff { .. } = report {
                    cancel.cancel(CancelReason::ChunkFailed { index: 9 });
                }
            },
            |_| -> Result<(), _> {
                calls += 1;
                Err(timeout())
            },
        )
        .unwrap_err();
        assert_eq!(calls, 1);
        assert!(matches!(err, ChunkError::Cancelled { attempts: 1 }));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn deadline_during_backoff_reports_deadline() {
        let ctx = AttemptContext::new(
            CancelToken::new(),
            Some(Instant::now() + Duration::from_millis(20)),
        );
        let policy = RetryPolicy::new(5, Duration::from_secs(30));
        let err = run_with_retry(&policy, &ctx, |_| {}, |_| -> Result<(), _> {
            Err(timeout())
        })
        .unwrap_err();
        assert!(matches!(err, ChunkError::DeadlineExceeded { attempts: 1 }));
    }

    #[test]
    fn observer_sees_attempt_sequence() {
        let ctx = AttemptContext::default();
        let mut seen = Vec::new();
        let _ = run_with_retry(
            &fast(2),
            &ctx,
            |r| {
                seen.push(match r {
                    AttemptReport::Started { attempt } => format!("start{}", attempt),
                    AttemptReport::Succeeded { attempt } => format!("ok{}", attempt),
                    AttemptReport::Failed { attempt, .. } => format!("fail{}", attempt),
                    AttemptReport::Backoff { attempt, .. } => format!("wait{}", attempt),
                })
            },
            |attempt| if attempt == 1 { Err(timeout()) } else { Ok(()) },
        );
        assert_eq!(seen, ["start1", "fail1", "wait1", "start2", "ok2"]);
    }
}
