//! One analysis session: at most one active run, one display consumer
//!
//! Producers (the per-job intake tasks) only ever touch the
//! [`DeliveryQueue`]. The owner of the session drains it with
//! [`AnalysisSession::drain_once`] or [`AnalysisSession::pump`], which are
//! the only places the [`RenderSurface`] is called.

use crate::annotator::{annotate, AnnotatedRange, LineRange};
use crate::bucketer::{partition, Buckets, SeverityBucket};
use crate::config::AnalyzerConfig;
use crate::job::{AnalysisJob, JobEvent, JobId};
use crate::parser::{parse_line, parse_output};
use crate::queue::{Append, Completion, Delivery, DeliveryQueue};
use crate::runner::ProcessRunner;
use crate::surface::RenderSurface;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Structured outcome of one run
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub target: PathBuf,
    /// `None` when the analyzer could not be started
    pub job: Option<JobId>,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub exit_code: Option<i32>,
    pub cancelled: bool,
    pub buckets: Buckets,
    pub annotations: Vec<AnnotatedRange>,
}

impl Report {
    /// Whether the analyzer ran and exited cleanly (or was stopped by a signal)
    pub fn succeeded(&self) -> bool {
        self.job.is_some() && matches!(self.exit_code, None | Some(0))
    }
}

/// What one call to [`AnalysisSession::drain_once`] did
#[derive(Debug)]
pub enum DrainStep {
    /// A block of output was appended to the surface
    Delivered,
    /// The active run finished and its results were rendered
    Completed(Report),
    /// Nothing was queued
    Idle,
}

#[derive(Debug)]
struct ActiveRun {
    target: PathBuf,
    job: Option<AnalysisJob>,
    started_at: DateTime<Utc>,
    started: Instant,
}

pub struct AnalysisSession {
    config: AnalyzerConfig,
    runner: ProcessRunner,
    queue: Arc<DeliveryQueue>,
    active: Option<ActiveRun>,
    transcript: String,
}

impl AnalysisSession {
    pub fn new(config: AnalyzerConfig) -> Result<Self> {
        let encoding = config.encoding()?;
        config.warn_suspicious();
        let queue = Arc::new(DeliveryQueue::new(config.delivery_block_size));
        Ok(Self {
            config,
            runner: ProcessRunner::with_encoding(encoding),
            queue,
            active: None,
            transcript: String::new(),
        })
    }

    pub const fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Queue handle, for waiting on new work alongside other events
    pub fn queue(&self) -> Arc<DeliveryQueue> {
        Arc::clone(&self.queue)
    }

    /// The running job, if any
    pub fn active_job(&self) -> Option<&AnalysisJob> {
        self.active.as_ref().and_then(|run| run.job.as_ref())
    }

    /// Output delivered to the surface for the current run
    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    /// Start analyzing `target`, superseding any run in progress.
    ///
    /// Configuration problems are returned before anything is touched. If
    /// the analyzer cannot be launched, the failure is also queued as output
    /// followed by a completion, so the consumer renders it like a run.
    pub fn run(&mut self, target: &Path) -> Result<JobId> {
        let executable = self.config.check_runnable()?;

        if let Some(previous) = self.active.take() {
            if let Some(job) = previous.job {
                debug!(job = %job.id(), "superseding active run");
                job.kill();
            }
        }
        self.transcript.clear();

        let started_at = Utc::now();
        let started = Instant::now();
        match self.runner.start(&executable, target) {
            Ok((job, events)) => {
                let id = job.id();
                self.queue.reset(Some(id));
                tokio::spawn(intake(Arc::clone(&self.queue), job.clone(), events));
                self.active = Some(ActiveRun {
                    target: target.to_path_buf(),
                    job: Some(job),
                    started_at,
                    started,
                });
                Ok(id)
            }
            Err(e) => {
                self.queue.reset(None);
                if let Error::SpawnFailure { .. } = e {
                    warn!("{}", e);
                    self.queue.append(None, &format!("{e}\n"));
                    self.queue.finish(None, None);
                    self.active = Some(ActiveRun {
                        target: target.to_path_buf(),
                        job: None,
                        started_at,
                        started,
                    });
                }
                Err(e)
            }
        }
    }

    /// Kill the active job; returns whether a termination was sent
    pub fn cancel(&self) -> bool {
        self.active_job().is_some_and(AnalysisJob::kill)
    }

    /// Apply one unit of queued work to `surface`
    pub fn drain_once<S>(&mut self, surface: &mut S) -> DrainStep
    where
        S: RenderSurface + ?Sized,
    {
        match self.queue.pop() {
            None => DrainStep::Idle,
            Some(Delivery::Text(text)) => {
                self.transcript.push_str(&text);
                surface.append_text(&text);
                DrainStep::Delivered
            }
            Some(Delivery::Finished(completion)) => {
                DrainStep::Completed(self.complete(completion, surface))
            }
        }
    }

    /// Drain until the active run completes, yielding to the runtime after
    /// every block and sleeping while the queue is empty.
    ///
    /// Returns `None` straight away when no run is in progress.
    pub async fn pump<S>(&mut self, surface: &mut S) -> Option<Report>
    where
        S: RenderSurface + ?Sized,
    {
        loop {
            match self.drain_once(surface) {
                DrainStep::Completed(report) => return Some(report),
                DrainStep::Delivered => tokio::task::yield_now().await,
                DrainStep::Idle if self.active.is_none() => return None,
                DrainStep::Idle => self.queue.wait_for_work().await,
            }
        }
    }

    fn complete<S>(&mut self, completion: Completion, surface: &mut S) -> Report
    where
        S: RenderSurface + ?Sized,
    {
        let run = self.active.take();
        let job = run.as_ref().and_then(|run| run.job.clone());
        let elapsed = run.as_ref().map(|run| run.started.elapsed()).unwrap_or_default();
        let cancelled = job.as_ref().is_some_and(AnalysisJob::is_cancelled);

        let marker = completion_marker(&completion, elapsed.as_secs_f64(), cancelled);
        let marker = if self.transcript.is_empty() || self.transcript.ends_with('\n') {
            marker
        } else {
            format!("\n{marker}")
        };
        self.transcript.push_str(&marker);
        surface.append_text(&marker);

        let target = run.as_ref().map(|run| run.target.clone()).unwrap_or_default();
        let mut report = Report {
            target,
            job: completion.job,
            started_at: run.as_ref().map_or_else(Utc::now, |run| run.started_at),
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            exit_code: completion.exit_code,
            cancelled,
            buckets: Buckets::default(),
            annotations: Vec::new(),
        };

        let Some(job) = job else {
            surface.status_message("pmccabe: analyzer could not be started");
            return report;
        };

        let thresholds = self.config.thresholds();
        let records = parse_output(&job.stdout())
            .into_iter()
            .chain(parse_output(&job.stderr()));
        report.buckets = partition(records, thresholds);

        if self.config.output_highlighting_enabled {
            self.highlight_output(surface);
        }

        if self.config.annotations_enabled {
            let line_count = count_lines(&report.target);
            report.annotations = annotate(&report.buckets, line_count);
            let ranges: Vec<LineRange> = report.annotations.iter().map(|a| a.range).collect();
            let labels: Vec<String> = report.annotations.iter().map(AnnotatedRange::label).collect();
            surface.set_annotations(&ranges, &labels);
        }

        let buckets = &report.buckets;
        surface.status_message(&format!(
            "pmccabe: {} functions ({} high, {} medium, {} low)",
            buckets.len(),
            buckets.high.len(),
            buckets.medium.len(),
            buckets.low.len()
        ));

        info!(
            job = %job.id(),
            functions = buckets.len(),
            high = buckets.high.len(),
            exit_code = ?report.exit_code,
            "analysis complete"
        );
        report
    }

    /// Mark every record line of the transcript with its bucket's style
    fn highlight_output<S>(&self, surface: &mut S)
    where
        S: RenderSurface + ?Sized,
    {
        let thresholds = self.config.thresholds();
        let mut regions: [Vec<LineRange>; 3] = Default::default();
        for (index, line) in self.transcript.lines().enumerate() {
            if let Some(record) = parse_line(line) {
                regions[thresholds.classify(&record) as usize].push(LineRange::line(index));
            }
        }
        for bucket in SeverityBucket::ALL {
            surface.set_regions(bucket, &regions[bucket as usize], bucket.style_hint());
        }
    }
}

impl std::fmt::Debug for AnalysisSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisSession")
            .field("config", &self.config)
            .field("active", &self.active)
            .field("pending", &self.queue.has_pending())
            .finish_non_exhaustive()
    }
}

/// Move one job's events into the queue until the job ends or is superseded
async fn intake(
    queue: Arc<DeliveryQueue>,
    job: AnalysisJob,
    mut events: mpsc::UnboundedReceiver<JobEvent>,
) {
    while let Some(event) = events.recv().await {
        let outcome = match &event {
            JobEvent::Data { job: id, text } => queue.append(Some(*id), text),
            JobEvent::Finished { job: id, exit_code } => queue.finish(Some(*id), *exit_code),
        };
        if outcome == Append::Stale {
            job.kill();
            break;
        }
    }
    debug!(job = %job.id(), "intake stopped");
}

fn completion_marker(completion: &Completion, secs: f64, cancelled: bool) -> String {
    if completion.job.is_none() {
        return "[Finished]\n".to_string();
    }
    if cancelled {
        return format!("[Cancelled after {secs:.1}s]\n");
    }
    match completion.exit_code {
        None | Some(0) => format!("[Finished in {secs:.1}s]\n"),
        Some(code) => format!("[Finished in {secs:.1}s with exit code {code}]\n"),
    }
}

/// Lines in the target as it is now; an unreadable file has none
fn count_lines(path: &Path) -> usize {
    match std::fs::read(path) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).lines().count(),
        Err(e) => {
            warn!("cannot read {} for annotations: {}", path.display(), e);
            0
        }
    }
}
