//! Single-flight training job runner.
//!
//! `start` validates synchronously and then hands the job to a background
//! task that stages the dataset, launches the trainer and pumps its output
//! into [`JobState`] until the process exits or a stop is requested.

use crate::dataset::{self, NormalizedDataset};
use crate::error::{TrainingError, TrainingResult};
use crate::job::{DatasetUpload, StartRequest};
use crate::layout::TrainingLayout;
use crate::progress::{JobOutcome, ProgressEvent, ProgressSink};
use crate::state::{JobState, LogSnapshot};
use crate::trainer::{Invocation, TrainerCommand};
use std::io::{PipeReader, Read};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, info_span, warn};

/// Owns the job slot and launches jobs into it.
#[derive(Debug, Clone)]
pub struct JobRunner {
    layout: TrainingLayout,
    trainer: TrainerCommand,
    state: Arc<JobState>,
}

enum JobPlan {
    Fresh(DatasetUpload),
    Resume { checkpoint: PathBuf },
}

impl JobRunner {
    #[must_use]
    pub fn new(layout: TrainingLayout, trainer: TrainerCommand) -> Self {
        Self { layout, trainer, state: Arc::new(JobState::new()) }
    }

    #[must_use]
    pub fn layout(&self) -> &TrainingLayout {
        &self.layout
    }

    #[must_use]
    pub fn state(&self) -> &Arc<JobState> {
        &self.state
    }

    /// Validate `request` and start the job in the background.
    ///
    /// Must be called from within a tokio runtime. The returned handle
    /// resolves once the job is finalized; dropping it does not stop the job.
    pub fn start(&self, mut request: StartRequest) -> TrainingResult<JoinHandle<JobOutcome>> {
        self.state.ensure_idle()?;
        request.validate()?;

        let job_name = request.job_name.trim().to_string();
        let resume = request.is_resume();
        let plan = if resume {
            let checkpoint = self.layout.find_resume_checkpoint(&job_name).ok_or_else(|| {
                TrainingError::NotFound(format!(
                    "no checkpoint to resume from at {}/last.*",
                    self.layout.weights_dir(&job_name).display()
                ))
            })?;
            JobPlan::Resume { checkpoint }
        } else {
            let upload = request.dataset.take().ok_or_else(|| {
                TrainingError::Validation("a dataset archive is required to start a new training job".to_string())
            })?;
            JobPlan::Fresh(upload)
        };

        let header = ProgressEvent::Started { job_name: job_name.clone(), resume }.to_string();
        let cancel = self.state.try_begin(&job_name, header)?;
        info!(job = %job_name, resume, "training job accepted");

        let job = BackgroundJob {
            layout: self.layout.clone(),
            trainer: self.trainer.clone(),
            state: Arc::clone(&self.state),
            cancel,
        };
        let span = info_span!("training_job", job = %job_name);
        Ok(tokio::spawn(job.run(request, plan).instrument(span)))
    }

    /// Ask the running job to stop. Returns `false` when nothing is running.
    ///
    /// The job's cancellation token is the signal path: it wakes the output
    /// pump, which owns the child, sends it the kill signal and reaps it.
    /// A job still staging its dataset stops at the next checkpoint instead.
    /// Does not wait for the job to wind down.
    pub fn stop(&self) -> bool {
        let accepted = self.state.request_cancel();
        if accepted {
            info!(job = ?self.state.job_name(), "stop requested");
        }
        accepted
    }

    #[must_use]
    pub fn logs(&self) -> LogSnapshot {
        self.state.snapshot()
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }
}

struct BackgroundJob {
    layout: TrainingLayout,
    trainer: TrainerCommand,
    state: Arc<JobState>,
    cancel: CancellationToken,
}

impl BackgroundJob {
    async fn run(self, request: StartRequest, plan: JobPlan) -> JobOutcome {
        let outcome = match self.execute(&request, plan).await {
            Ok(outcome) => outcome,
            Err(TrainingError::Cancelled) => JobOutcome::Cancelled,
            Err(e) => {
                error!(error = %e, "training job failed");
                JobOutcome::Failed(e.to_string())
            }
        };
        info!(outcome = ?outcome, "training job finished");
        self.state.finish(outcome.clone());
        outcome
    }

    async fn execute(&self, request: &StartRequest, plan: JobPlan) -> TrainingResult<JobOutcome> {
        let invocation = match plan {
            JobPlan::Resume { checkpoint } => {
                self.state.on_event(ProgressEvent::Resuming { checkpoint: checkpoint.display().to_string() });
                self.trainer.resume(&checkpoint)
            }
            JobPlan::Fresh(upload) => {
                let manifest = self.stage_dataset(upload).await?;
                self.check_cancelled()?;
                self.trainer.fresh(request, &manifest, &self.layout)
            }
        };

        self.check_cancelled()?;
        self.state.on_event(ProgressEvent::Launching);
        self.state.on_event(ProgressEvent::Command { command_line: invocation.to_string() });
        self.launch(&invocation).await
    }

    fn check_cancelled(&self) -> TrainingResult<()> {
        if self.state.cancel_requested() { Err(TrainingError::Cancelled) } else { Ok(()) }
    }

    /// Persist, extract and normalize the uploaded archive.
    async fn stage_dataset(&self, upload: DatasetUpload) -> TrainingResult<PathBuf> {
        let file_name = upload.safe_file_name()?;
        let dataset_name = upload.dataset_name()?;
        self.state.on_event(ProgressEvent::Extracting { dataset_name: dataset_name.clone() });

        tokio::fs::create_dir_all(self.layout.uploads_dir()).await?;
        let archive_path = self.layout.upload_path(&file_name);
        tokio::fs::write(&archive_path, &upload.bytes).await?;
        drop(upload);

        let extract_dir = self.layout.dataset_dir(&dataset_name);
        let target = extract_dir.clone();
        tokio::task::spawn_blocking(move || dataset::extract_archive(&archive_path, &target))
            .await
            .map_err(|e| TrainingError::Other(e.into()))??;

        self.check_cancelled()?;
        self.state.on_event(ProgressEvent::CheckingFormat);

        let normalized: NormalizedDataset = tokio::task::spawn_blocking(move || dataset::normalize(&extract_dir))
            .await
            .map_err(|e| TrainingError::Other(e.into()))??;

        if let Some(report) = &normalized.conversion {
            self.state.on_event(ProgressEvent::Converted {
                classes: report.names.clone(),
                boxes: report.boxes_written,
                images_missing: report.images_missing,
            });
        }
        self.state.on_event(ProgressEvent::DatasetReady { manifest: normalized.manifest_path.display().to_string() });
        Ok(normalized.manifest_path)
    }

    /// Run the trainer to completion, appending every output line to the log.
    ///
    /// stdout and stderr share one pipe so lines keep the order the trainer
    /// wrote them in.
    async fn launch(&self, invocation: &Invocation) -> TrainingResult<JobOutcome> {
        let (reader, writer) = std::io::pipe()?;
        let stderr_writer = writer.try_clone()?;

        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .env("PYTHONUNBUFFERED", "1")
            .stdin(Stdio::null())
            .stdout(Stdio::from(writer))
            .stderr(Stdio::from(stderr_writer))
            .kill_on_drop(true);

        let spawned = command.spawn();
        // Release our copies of the write end, or the reader never sees EOF.
        drop(command);
        let mut child = spawned.map_err(|e| {
            TrainingError::ExternalProcess(format!("failed to start {}: {e}", invocation.program.display()))
        })?;
        let pid = child.id();
        self.state.attach_process(pid);
        info!(pid = ?pid, program = %invocation.program.display(), "trainer process started");

        let mut lines = spawn_output_reader(reader)?;
        let mut cancelled = false;

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    cancelled = true;
                    break;
                }
                line = lines.recv() => match line {
                    Some(line) => self.state.append(line),
                    None => break,
                },
            }
            if self.state.cancel_requested() {
                cancelled = true;
                break;
            }
        }

        if cancelled {
            info!(pid = ?pid, "terminating trainer process");
            if let Err(e) = child.start_kill() {
                warn!(error = %e, "trainer process could not be signalled");
            }
        }
        let status = child.wait().await;
        self.state.release_process();

        if cancelled || self.state.cancel_requested() {
            return Ok(JobOutcome::Cancelled);
        }
        let status = status.map_err(|e| TrainingError::ExternalProcess(format!("failed to reap trainer: {e}")))?;
        if status.success() {
            Ok(JobOutcome::Completed)
        } else {
            Err(TrainingError::ExternalProcess(format!("trainer exited abnormally ({status})")))
        }
    }
}

/// Longest line kept before it is flushed without a terminator.
const MAX_LINE_BYTES: usize = 64 * 1024;

/// Drain `reader` on its own thread, forwarding each complete line.
///
/// The channel closes once every write end of the pipe is gone. If the
/// receiver is dropped first the thread stops at the next line.
fn spawn_output_reader(mut reader: PipeReader) -> std::io::Result<mpsc::UnboundedReceiver<String>> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::Builder::new().name("trainer-output".to_string()).spawn(move || {
        let mut splitter = LineSplitter::default();
        let mut chunk = [0_u8; 8192];
        let mut lines = Vec::new();
        loop {
            let read = match reader.read(&mut chunk) {
                Ok(0) => break,
                Ok(read) => read,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(error = %e, "failed to read trainer output");
                    break;
                }
            };
            splitter.push(&chunk[..read], &mut lines);
            for line in lines.drain(..) {
                if tx.send(line).is_err() {
                    return;
                }
            }
        }
        if let Some(line) = splitter.finish() {
            let _ = tx.send(line);
        }
    })?;
    Ok(rx)
}

/// Splits a byte stream into lines ending in `\n`, `\r` or `\r\n`.
///
/// Progress bars redraw with a bare `\r`, so each redraw becomes its own
/// line. Invalid UTF-8 is replaced.
#[derive(Debug, Default)]
struct LineSplitter {
    buf: Vec<u8>,
    after_cr: bool,
}

impl LineSplitter {
    fn push(&mut self, bytes: &[u8], out: &mut Vec<String>) {
        for &byte in bytes {
            match byte {
                b'\n' if self.after_cr => self.after_cr = false,
                b'\n' => out.push(self.take_line()),
                b'\r' => {
                    out.push(self.take_line());
                    self.after_cr = true;
                }
                _ => {
                    self.after_cr = false;
                    self.buf.push(byte);
                    if self.buf.len() >= MAX_LINE_BYTES {
                        out.push(self.take_line());
                    }
                }
            }
        }
    }

    /// Whatever is left once the stream ends.
    fn finish(mut self) -> Option<String> {
        if self.buf.is_empty() { None } else { Some(self.take_line()) }
    }

    fn take_line(&mut self) -> String {
        let line = String::from_utf8_lossy(&self.buf).into_owned();
        self.buf.clear();
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split(chunks: &[&[u8]]) -> Vec<String> {
        let mut splitter = LineSplitter::default();
        let mut out = Vec::new();
        for chunk in chunks {
            splitter.push(chunk, &mut out);
        }
        out.extend(splitter.finish());
        out
    }

    #[test]
    fn test_splitter_ends_lines_on_cr_and_lf() {
        assert_eq!(split(&[b"first\r\nsec\xffond\nlast"]), vec!["first", "sec\u{fffd}ond", "last"]);
        assert_eq!(split(&[b"10%\r20%\r30%\r\ndone\n"]), vec!["10%", "20%", "30%", "done"]);
    }

    #[test]
    fn test_splitter_crlf_across_chunks_is_one_ending() {
        assert_eq!(split(&[b"epoch 1\r", b"\nepoch 2\n"]), vec!["epoch 1", "epoch 2"]);
        assert_eq!(split(&[b"a\n\n", b"b\r\r"]), vec!["a", "", "b", ""]);
    }

    #[test]
    fn test_splitter_flushes_overlong_lines() {
        let long = vec![b'x'; MAX_LINE_BYTES + 10];
        let lines = split(&[&long]);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].len(), MAX_LINE_BYTES);
        assert_eq!(lines[1].len(), 10);
    }

    #[tokio::test]
    async fn test_stop_without_job_is_rejected() {
        let temp = tempfile::TempDir::new().unwrap();
        let runner = JobRunner::new(TrainingLayout::for_base_dir(temp.path()), TrainerCommand::default());
        assert!(!runner.stop());
        assert!(!runner.is_active());
    }
}
