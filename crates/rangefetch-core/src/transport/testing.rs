//! Scripted in-memory transport for engine and coordinator tests.

use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::Transport;
use crate::control::{AttemptContext, Interrupt};
use crate::probe::{ProbeError, RemoteResource};
use crate::retry::FetchError;
use crate::segmenter::{plan_chunks, ChunkRange};

/// What one attempt at a chunk does.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Step {
    Succeed,
    /// Sleep (interruptibly), then succeed.
    SucceedAfter(Duration),
    /// curl operation timeout (transient).
    Timeout,
    /// Non-2xx response (permanent).
    Status(u32),
    /// Park until cancelled or past the deadline.
    Hang,
    /// Panic inside the transport.
    Panic,
}

pub(crate) struct ScriptedTransport {
    payload: Vec<u8>,
    token: Option<String>,
    probe_fails: bool,
    index_of_start: HashMap<u64, usize>,
    scripts: Mutex<HashMap<usize, Vec<Step>>>,
    attempts: Mutex<Vec<u32>>,
    completed: Mutex<Vec<usize>>,
    started_after_cancel: AtomicUsize,
}

impl ScriptedTransport {
    /// Serves `payload`, planned the same way the engine will plan it with `chunks`.
    pub(crate) fn new(payload: Vec<u8>, chunks: usize) -> Self {
        let plan = plan_chunks(payload.len() as u64, chunks).expect("valid test plan");
        let index_of_start = plan
            .ranges()
            .iter()
            .enumerate()
            .map(|(i, r)| (r.start, i))
            .collect();
        Self {
            attempts: Mutex::new(vec![0; chunks]),
            payload,
            token: None,
            probe_fails: false,
            index_of_start,
            scripts: Mutex::new(HashMap::new()),
            completed: Mutex::new(Vec::new()),
            started_after_cancel: AtomicUsize::new(0),
        }
    }

    pub(crate) fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub(crate) fn without_content_length(mut self) -> Self {
        self.probe_fails = true;
        self
    }

    /// Steps for successive attempts of `index`; attempts past the script succeed.
    pub(crate) fn script(self, index: usize, steps: Vec<Step>) -> Self {
        self.scripts.lock().unwrap().insert(index, steps);
        self
    }

    pub(crate) fn attempts(&self, index: usize) -> u32 {
        self.attempts.lock().unwrap()[index]
    }

    pub(crate) fn total_attempts(&self) -> u32 {
        self.attempts.lock().unwrap().iter().sum()
    }

    /// Chunk indices in the order their successful attempts finished.
    pub(crate) fn completion_order(&self) -> Vec<usize> {
        self.completed.lock().unwrap().clone()
    }

    pub(crate) fn started_after_cancel(&self) -> usize {
        self.started_after_cancel.load(Ordering::SeqCst)
    }

    fn interrupted(why: Interrupt) -> FetchError {
        match why {
            Interrupt::Cancelled => FetchError::Cancelled,
            Interrupt::DeadlineExceeded => FetchError::DeadlineExceeded,
        }
    }
}

impl Transport for ScriptedTransport {
    fn probe(&self, _address: &str, ctx: &AttemptContext) -> Result<RemoteResource, ProbeError> {
        ctx.check()?;
        if self.probe_fails {
            return Err(ProbeError::MissingContentLength);
        }
        Ok(RemoteResource {
            total_size: self.payload.len() as u64,
            integrity_token: self.token.clone(),
            accept_ranges: true,
        })
    }

    fn fetch_range(
        &self,
        _address: &str,
        range: ChunkRange,
        out: &mut dyn Write,
        ctx: &AttemptContext,
    ) -> Result<u64, FetchError> {
        if ctx.cancel.is_cancelled() {
            self.started_after_cancel.fetch_add(1, Ordering::SeqCst);
        }
        let index = self.index_of_start[&range.start];
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            attempts[index] += 1;
            attempts[index]
        };
        let step = self
            .scripts
            .lock()
            .unwrap()
            .get(&index)
            .and_then(|s| s.get(attempt as usize - 1).copied())
            .unwrap_or(Step::Succeed);

        match step {
            Step::Succeed => {}
            Step::SucceedAfter(d) => ctx.sleep(d).map_err(Self::interrupted)?,
            Step::Timeout => return Err(FetchError::Curl(curl::Error::new(28))),
            Step::Status(code) => return Err(FetchError::Http(code)),
            Step::Panic => panic!("scripted transport panic on chunk {}", index),
            Step::Hang => loop {
                if let Err(why) = ctx.sleep(Duration::from_millis(5)) {
                    return Err(Self::interrupted(why));
                }
            },
        }

        let body = &self.payload[range.start as usize..=range.end as usize];
        out.write_all(body)?;
        self.completed.lock().unwrap().push(index);
        Ok(body.len() as u64)
    }
}
