//! Analyzer process lifecycle
//!
//! The analyzer is invoked as `<executable> -v <file>` with stdin closed.
//! Standard output and standard error are read by two independent tasks,
//! each with its own [`LineDecoder`] for the runner's output encoding. A third task waits for both readers to
//! hit end-of-file, reaps the child and sends the single
//! [`JobEvent::Finished`].
//!
//! Process-group creation and termination are OS specific and live in the
//! `unix`/`windows` backends; nothing else in the crate branches on platform.

use crate::decoder::LineDecoder;
use crate::job::{AnalysisJob, JobEvent, JobId, JobStatus, Stream};
use crate::{Error, Result};
use encoding_rs::{Encoding, UTF_8};
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[cfg(unix)]
mod unix;
#[cfg(unix)]
use unix as platform;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
use windows as platform;

const READ_BUFFER_SIZE: usize = 8192;

pub(crate) use platform::terminate_group;

/// Spawns analyzer jobs and hands out their event streams
#[derive(Debug)]
pub struct ProcessRunner {
    next_id: AtomicU64,
    encoding: &'static Encoding,
}

impl ProcessRunner {
    /// Runner for analyzers that write UTF-8
    pub fn new() -> Self {
        Self::with_encoding(UTF_8)
    }

    pub fn with_encoding(encoding: &'static Encoding) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            encoding,
        }
    }

    pub fn encoding(&self) -> &'static Encoding {
        self.encoding
    }

    /// Launch the analyzer against `target`.
    ///
    /// Must be called from within a tokio runtime. The returned receiver
    /// yields the job's output fragments and, last, its completion.
    pub fn start(
        &self,
        executable: &Path,
        target: &Path,
    ) -> Result<(AnalysisJob, mpsc::UnboundedReceiver<JobEvent>)> {
        if target.as_os_str().is_empty() {
            return Err(Error::InvalidTarget);
        }

        let mut cmd = Command::new(executable);
        cmd.arg("-v")
            .arg(target)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        platform::configure(&mut cmd);

        let mut child = cmd.spawn().map_err(|e| Error::SpawnFailure {
            executable: executable.display().to_string(),
            reason: e.to_string(),
        })?;

        let id = JobId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let job = AnalysisJob::new(id, target, child.id());
        info!(
            job = %id,
            pid = ?job.pid(),
            executable = %executable.display(),
            target = %target.display(),
            "started analyzer"
        );

        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let readers = (
            child.stdout.take().map(|out| {
                let decoder = LineDecoder::with_encoding(self.encoding);
                tokio::spawn(read_stream(out, Stream::Stdout, decoder, job.clone(), events_tx.clone()))
            }),
            child.stderr.take().map(|err| {
                let decoder = LineDecoder::with_encoding(self.encoding);
                tokio::spawn(read_stream(err, Stream::Stderr, decoder, job.clone(), events_tx.clone()))
            }),
        );

        let waiter_job = job.clone();
        tokio::spawn(async move {
            let (stdout_reader, stderr_reader) = readers;
            if let Some(handle) = stdout_reader {
                let _ = handle.await;
            }
            if let Some(handle) = stderr_reader {
                let _ = handle.await;
            }

            let exit_code = match child.wait().await {
                Ok(status) => status.code(),
                Err(e) => {
                    warn!(job = %waiter_job.id(), "failed to reap analyzer: {}", e);
                    None
                }
            };
            waiter_job.set_exited(exit_code);
            info!(
                job = %waiter_job.id(),
                exit_code = ?exit_code,
                elapsed_ms = u64::try_from(waiter_job.elapsed().as_millis()).unwrap_or(u64::MAX),
                "analyzer finished"
            );
            let _ = events_tx.send(JobEvent::Finished {
                job: waiter_job.id(),
                exit_code,
            });
        });

        Ok((job, events_rx))
    }

    /// Terminate the job's process group; repeated calls are no-ops
    pub fn kill(job: &AnalysisJob) -> bool {
        job.kill()
    }

    pub fn poll(job: &AnalysisJob) -> JobStatus {
        job.poll()
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

/// Read one stream to end-of-file, forwarding decoded fragments in order
async fn read_stream<R>(
    mut reader: R,
    stream: Stream,
    mut decoder: LineDecoder,
    job: AnalysisJob,
    events: mpsc::UnboundedSender<JobEvent>,
) where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => forward(&job, stream, &events, decoder.decode(&buf[..n])),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!(job = %job.id(), ?stream, "read failed: {}", e);
                break;
            }
        }
    }

    forward(&job, stream, &events, decoder.finish());
    debug!(job = %job.id(), ?stream, "stream closed");
}

fn forward(
    job: &AnalysisJob,
    stream: Stream,
    events: &mpsc::UnboundedSender<JobEvent>,
    text: String,
) {
    if text.is_empty() {
        return;
    }
    job.record_output(stream, &text);
    // The receiver is gone once the job has been superseded; output is dropped.
    let _ = events.send(JobEvent::Data { job: job.id(), text });
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};
    use tokio::time::timeout;

    fn fake_analyzer(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("pmccabe");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    async fn collect(mut events: mpsc::UnboundedReceiver<JobEvent>) -> (String, Option<i32>) {
        let mut text = String::new();
        while let Some(event) = events.recv().await {
            match event {
                JobEvent::Data { text: fragment, .. } => text.push_str(&fragment),
                JobEvent::Finished { exit_code, .. } => {
                    assert!(events.recv().await.is_none(), "no events after Finished");
                    return (text, exit_code);
                }
            }
        }
        panic!("channel closed without Finished");
    }

    #[tokio::test]
    async fn test_empty_target_is_rejected() {
        let runner = ProcessRunner::new();
        let result = runner.start(Path::new("/bin/true"), Path::new(""));
        assert!(matches!(result, Err(Error::InvalidTarget)));
    }

    #[tokio::test]
    async fn test_missing_executable_is_spawn_failure() {
        let runner = ProcessRunner::new();
        let result = runner.start(Path::new("/nonexistent/pmccabe"), Path::new("foo.c"));
        match result {
            Err(Error::SpawnFailure { executable, .. }) => {
                assert_eq!(executable, "/nonexistent/pmccabe");
            }
            other => panic!("expected SpawnFailure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_streams_output_and_completes() {
        let dir = tempdir().unwrap();
        let exe = fake_analyzer(
            &dir,
            "echo \"3\t2\t5\t10\t4\t$2(12): my_function\"\necho \"banner\" >&2",
        );
        let runner = ProcessRunner::new();
        let (job, events) = runner.start(&exe, Path::new("foo.c")).unwrap();

        let (text, exit_code) = timeout(Duration::from_secs(10), collect(events)).await.unwrap();
        assert!(text.contains("3\t2\t5\t10\t4\tfoo.c(12): my_function\n"));
        assert!(text.contains("banner\n"));
        assert_eq!(exit_code, Some(0));
        assert_eq!(job.poll(), JobStatus::Exited { code: Some(0) });
        assert_eq!(job.stderr(), "banner\n");
    }

    #[tokio::test]
    async fn test_argument_order() {
        let dir = tempdir().unwrap();
        let exe = fake_analyzer(&dir, "echo \"$1|$2\"");
        let runner = ProcessRunner::new();
        let (_job, events) = runner.start(&exe, Path::new("src/foo.c")).unwrap();

        let (text, _) = timeout(Duration::from_secs(10), collect(events)).await.unwrap();
        assert_eq!(text, "-v|src/foo.c\n");
    }

    #[tokio::test]
    async fn test_nonzero_exit_code_is_reported() {
        let dir = tempdir().unwrap();
        let exe = fake_analyzer(&dir, "echo partial\nexit 3");
        let runner = ProcessRunner::new();
        let (_job, events) = runner.start(&exe, Path::new("foo.c")).unwrap();

        let (text, exit_code) = timeout(Duration::from_secs(10), collect(events)).await.unwrap();
        assert_eq!(text, "partial\n");
        assert_eq!(exit_code, Some(3));
    }

    #[tokio::test]
    async fn test_crlf_output_is_normalized() {
        let dir = tempdir().unwrap();
        let exe = fake_analyzer(&dir, "printf 'a\\r\\nb\\rc\\n'");
        let runner = ProcessRunner::new();
        let (_job, events) = runner.start(&exe, Path::new("foo.c")).unwrap();

        let (text, _) = timeout(Duration::from_secs(10), collect(events)).await.unwrap();
        assert_eq!(text, "a\nb\nc\n");
    }

    #[tokio::test]
    async fn test_output_decoded_with_runner_encoding() {
        let dir = tempdir().unwrap();
        // "café" and "naïve" in windows-1252
        let exe = fake_analyzer(&dir, "printf 'caf\\351\\r\\nna\\357ve\\n'");
        let encoding = Encoding::for_label(b"windows-1252").unwrap();
        let runner = ProcessRunner::with_encoding(encoding);
        let (job, events) = runner.start(&exe, Path::new("foo.c")).unwrap();

        let (text, _) = timeout(Duration::from_secs(10), collect(events)).await.unwrap();
        assert_eq!(text, "café\nnaïve\n");
        assert_eq!(job.stdout(), "café\nnaïve\n");
    }

    #[tokio::test]
    async fn test_job_ids_are_unique() {
        let dir = tempdir().unwrap();
        let exe = fake_analyzer(&dir, "true");
        let runner = ProcessRunner::new();
        let (first, _) = runner.start(&exe, Path::new("a.c")).unwrap();
        let (second, _) = runner.start(&exe, Path::new("b.c")).unwrap();
        assert_ne!(first.id(), second.id());
    }

    #[tokio::test]
    async fn test_kill_terminates_and_second_kill_is_noop() {
        let dir = tempdir().unwrap();
        let exe = fake_analyzer(&dir, "echo started\nsleep 30\necho never");
        let runner = ProcessRunner::new();
        let (job, events) = runner.start(&exe, Path::new("foo.c")).unwrap();
        assert_eq!(ProcessRunner::poll(&job), JobStatus::Running);

        assert!(ProcessRunner::kill(&job));
        assert!(!ProcessRunner::kill(&job));

        let (text, exit_code) = timeout(Duration::from_secs(10), collect(events)).await.unwrap();
        assert!(!text.contains("never"));
        assert_eq!(exit_code, None);
        assert!(job.is_cancelled());
    }

    #[tokio::test]
    async fn test_kill_reaches_grandchildren() {
        let dir = tempdir().unwrap();
        // The background sleep holds the output pipes open; completion can
        // only be observed if it dies together with the shell.
        let exe = fake_analyzer(&dir, "sleep 30 &\nwait");
        let runner = ProcessRunner::new();
        let (job, events) = runner.start(&exe, Path::new("foo.c")).unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(job.kill());

        let (_, exit_code) = timeout(Duration::from_secs(10), collect(events)).await.unwrap();
        assert_eq!(exit_code, None);
        assert_eq!(job.poll(), JobStatus::Exited { code: None });
    }
}
