//! Shared state of the single training job.
//!
//! All fields live behind one mutex. The lock is only ever held for a single
//! read, append or flag update, never across an await point, so pollers
//! cannot be starved by the output pump.

use crate::error::{TrainingError, TrainingResult};
use crate::progress::{JobOutcome, ProgressEvent, ProgressSink};
use serde::Serialize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// The external process currently owned by the runner.
///
/// The pid is recorded for diagnostics. Stopping goes through the job's
/// cancellation token, whose holder owns the child and signals it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessHandle {
    pub pid: Option<u32>,
}

/// Point-in-time view returned to pollers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogSnapshot {
    pub logs: String,
    pub is_training: bool,
}

#[derive(Debug, Default)]
struct JobInner {
    active: bool,
    job_name: Option<String>,
    logs: Vec<String>,
    cancel_requested: bool,
    cancel: CancellationToken,
    process: Option<ProcessHandle>,
}

#[derive(Debug, Default)]
pub struct JobState {
    inner: Mutex<JobInner>,
}

impl JobState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, JobInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim the job slot and reset the log to `header`.
    ///
    /// Returns the token the runner watches for stop requests.
    pub fn try_begin(&self, job_name: &str, header: String) -> TrainingResult<CancellationToken> {
        let mut inner = self.lock();
        if inner.active {
            return Err(conflict(&inner));
        }
        inner.active = true;
        inner.job_name = Some(job_name.to_string());
        inner.logs = vec![header];
        inner.cancel_requested = false;
        inner.cancel = CancellationToken::new();
        inner.process = None;
        Ok(inner.cancel.clone())
    }

    /// Fails with `Conflict` while a job is running.
    pub fn ensure_idle(&self) -> TrainingResult<()> {
        let inner = self.lock();
        if inner.active { Err(conflict(&inner)) } else { Ok(()) }
    }

    pub fn append(&self, line: impl Into<String>) {
        let mut inner = self.lock();
        inner.logs.push(line.into());
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.lock().active
    }

    #[must_use]
    pub fn cancel_requested(&self) -> bool {
        self.lock().cancel_requested
    }

    #[must_use]
    pub fn job_name(&self) -> Option<String> {
        self.lock().job_name.clone()
    }

    #[must_use]
    pub fn process(&self) -> Option<ProcessHandle> {
        self.lock().process.clone()
    }

    /// Flag the running job for cancellation and wake the runner.
    ///
    /// Returns `false` when no job is active.
    pub fn request_cancel(&self) -> bool {
        let mut inner = self.lock();
        if !inner.active {
            return false;
        }
        inner.cancel_requested = true;
        inner.cancel.cancel();
        debug!(job = ?inner.job_name, pid = ?inner.process.as_ref().and_then(|p| p.pid), "cancellation requested");
        true
    }

    pub fn attach_process(&self, pid: Option<u32>) {
        let mut inner = self.lock();
        if inner.active {
            inner.process = Some(ProcessHandle { pid });
        }
    }

    pub fn release_process(&self) {
        self.lock().process = None;
    }

    /// Log the final line and free the slot.
    ///
    /// Only the first call for a job has any effect.
    pub fn finish(&self, outcome: JobOutcome) -> bool {
        let mut inner = self.lock();
        if !inner.active {
            return false;
        }
        inner.logs.push(ProgressEvent::Finished(outcome).to_string());
        inner.active = false;
        inner.process = None;
        true
    }

    #[must_use]
    pub fn snapshot(&self) -> LogSnapshot {
        let inner = self.lock();
        let mut logs = inner.logs.join("\n");
        if !logs.is_empty() {
            logs.push('\n');
        }
        LogSnapshot { logs, is_training: inner.active }
    }

    #[must_use]
    pub fn log_lines(&self) -> Vec<String> {
        self.lock().logs.clone()
    }
}

impl ProgressSink for JobState {
    fn on_event(&self, event: ProgressEvent) {
        self.append(event.to_string());
    }
}

fn conflict(inner: &JobInner) -> TrainingError {
    TrainingError::Conflict(inner.job_name.clone().unwrap_or_else(|| "unknown".to_string()))
}
