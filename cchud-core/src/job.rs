//! Analysis job handle and the events a running job emits

use crate::lock;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Identifies one run; never reused within a [`crate::ProcessRunner`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(u64);

impl JobId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Result of a non-blocking status check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Running,
    /// `code` is `None` when the process was ended by a signal
    Exited { code: Option<i32> },
}

/// Everything a job reports, in order, over its event channel.
///
/// `Finished` is always the last event and is sent only after both output
/// streams reached end-of-file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEvent {
    Data { job: JobId, text: String },
    Finished { job: JobId, exit_code: Option<i32> },
}

/// Which output stream a fragment came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Stream {
    Stdout,
    Stderr,
}

#[derive(Debug)]
struct JobInner {
    id: JobId,
    target: PathBuf,
    started_at: DateTime<Utc>,
    started: Instant,
    pid: Option<u32>,
    kill_requested: AtomicBool,
    stdout: Mutex<String>,
    stderr: Mutex<String>,
    status: Mutex<JobStatus>,
}

/// Shared handle to one analyzer run.
///
/// Cloning is cheap; all clones observe the same process.
#[derive(Debug, Clone)]
pub struct AnalysisJob {
    inner: Arc<JobInner>,
}

impl AnalysisJob {
    pub(crate) fn new(id: JobId, target: &Path, pid: Option<u32>) -> Self {
        Self {
            inner: Arc::new(JobInner {
                id,
                target: target.to_path_buf(),
                started_at: Utc::now(),
                started: Instant::now(),
                pid,
                kill_requested: AtomicBool::new(false),
                stdout: Mutex::new(String::new()),
                stderr: Mutex::new(String::new()),
                status: Mutex::new(JobStatus::Running),
            }),
        }
    }

    pub fn id(&self) -> JobId {
        self.inner.id
    }

    /// The file handed to the analyzer
    pub fn target(&self) -> &Path {
        &self.inner.target
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.inner.started_at
    }

    pub fn elapsed(&self) -> Duration {
        self.inner.started.elapsed()
    }

    pub fn pid(&self) -> Option<u32> {
        self.inner.pid
    }

    /// Whether a termination signal was delivered by [`AnalysisJob::kill`]
    pub fn is_cancelled(&self) -> bool {
        self.inner.kill_requested.load(Ordering::Acquire)
    }

    pub fn poll(&self) -> JobStatus {
        *lock(&self.inner.status)
    }

    /// Request termination of the job's whole process group.
    ///
    /// Returns `true` if a signal was sent. A job that already exited, or
    /// was already killed, is left alone and does not count as cancelled.
    /// Does not wait for the process to exit.
    pub fn kill(&self) -> bool {
        if self.poll() != JobStatus::Running {
            debug!(job = %self.id(), "kill after exit ignored");
            return false;
        }
        let Some(pid) = self.inner.pid else {
            return false;
        };
        if self
            .inner
            .kill_requested
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(job = %self.id(), "kill already requested");
            return false;
        }

        match crate::runner::terminate_group(pid) {
            Ok(()) => {
                info!(job = %self.id(), pid, "sent termination to analyzer process group");
                true
            }
            Err(e) => {
                self.inner.kill_requested.store(false, Ordering::Release);
                warn!(job = %self.id(), pid, "failed to terminate analyzer: {}", e);
                false
            }
        }
    }

    /// Standard output received so far
    pub fn stdout(&self) -> String {
        lock(&self.inner.stdout).clone()
    }

    /// Standard error received so far
    pub fn stderr(&self) -> String {
        lock(&self.inner.stderr).clone()
    }

    /// Both streams, standard output first
    pub fn output(&self) -> String {
        let stdout = self.stdout();
        let stderr = self.stderr();
        if stderr.is_empty() {
            stdout
        } else if stdout.is_empty() {
            stderr
        } else {
            format!("{stdout}{stderr}")
        }
    }

    pub(crate) fn record_output(&self, stream: Stream, text: &str) {
        let buffer = match stream {
            Stream::Stdout => &self.inner.stdout,
            Stream::Stderr => &self.inner.stderr,
        };
        lock(buffer).push_str(text);
    }

    pub(crate) fn set_exited(&self, code: Option<i32>) {
        *lock(&self.inner.status) = JobStatus::Exited { code };
    }
}
