//! User-facing job log lines.
//!
//! Pollers render the log verbatim and stop polling once a final marker
//! appears, so every terminal line carries a distinct prefix.

use std::fmt;

pub const COMPLETED_MARKER: &str = "✅ Training complete";
pub const FAILED_MARKER: &str = "❌ Training failed";
pub const CANCELLED_MARKER: &str = "🛑 Training stopped by request";

/// Progress messages the runner appends to the job log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Started { job_name: String, resume: bool },
    Resuming { checkpoint: String },
    Extracting { dataset_name: String },
    CheckingFormat,
    Converted { classes: Vec<String>, boxes: usize, images_missing: usize },
    DatasetReady { manifest: String },
    Launching,
    Command { command_line: String },
    Finished(JobOutcome),
}

/// How a job ended. Exactly one of these is logged per job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Failed(String),
    Cancelled,
}

/// Receives progress messages for a job.
pub trait ProgressSink: Send + Sync {
    fn on_event(&self, event: ProgressEvent);
}

impl JobOutcome {
    #[must_use]
    pub fn marker(&self) -> &'static str {
        match self {
            Self::Completed => COMPLETED_MARKER,
            Self::Failed(_) => FAILED_MARKER,
            Self::Cancelled => CANCELLED_MARKER,
        }
    }
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Started { job_name, resume: false } => write!(f, "--- Starting job: {job_name} ---"),
            Self::Started { job_name, resume: true } => write!(f, "--- Starting job: {job_name} (resume) ---"),
            Self::Resuming { checkpoint } => write!(f, "🔄 [1/3] Resuming from checkpoint: {checkpoint}"),
            Self::Extracting { dataset_name } => write!(f, "📦 [1/3] Extracting dataset: {dataset_name}"),
            Self::CheckingFormat => write!(f, "🔄 [2/3] Checking dataset format"),
            Self::Converted { classes, boxes, images_missing } => {
                write!(f, "✅ Converted COCO annotations: {boxes} boxes, classes {classes:?}")?;
                if *images_missing > 0 {
                    write!(f, " ({images_missing} images missing from the archive)")?;
                }
                Ok(())
            }
            Self::DatasetReady { manifest } => write!(f, "✅ Dataset ready: {manifest}"),
            Self::Launching => write!(f, "🚀 [3/3] Launching training"),
            Self::Command { command_line } => write!(f, "🔧 Command: {command_line}"),
            Self::Finished(JobOutcome::Completed) => write!(f, "{COMPLETED_MARKER}"),
            Self::Finished(JobOutcome::Failed(reason)) => write!(f, "{FAILED_MARKER}: {reason}"),
            Self::Finished(JobOutcome::Cancelled) => write!(f, "{CANCELLED_MARKER}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_final_lines_are_distinct() {
        let done = ProgressEvent::Finished(JobOutcome::Completed).to_string();
        let failed = ProgressEvent::Finished(JobOutcome::Failed("exit status 1".to_string())).to_string();
        let cancelled = ProgressEvent::Finished(JobOutcome::Cancelled).to_string();

        assert!(done.starts_with(COMPLETED_MARKER));
        assert!(failed.starts_with(FAILED_MARKER));
        assert!(failed.ends_with("exit status 1"));
        assert!(cancelled.starts_with(CANCELLED_MARKER));
        assert_ne!(done, cancelled);
    }

    #[test]
    fn test_header_marks_resume() {
        let line = ProgressEvent::Started { job_name: "run1".to_string(), resume: true }.to_string();
        assert_eq!(line, "--- Starting job: run1 (resume) ---");
    }
}
