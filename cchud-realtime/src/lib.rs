//! cchud Real-time - rerun analysis when the target file changes
//!
//! Editors often save by writing a temporary file and renaming it over the
//! original, which replaces the inode a file watch would be attached to. The
//! watcher therefore observes the target's parent directory and filters
//! events down to the target's file name.

#![warn(clippy::all, clippy::pedantic)]

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

/// Configuration for watch mode
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Quiet period after the last change before a rerun (milliseconds)
    pub debounce_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { debounce_ms: 300 }
    }
}

/// Events emitted by [`FileWatcher`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WatchEvent {
    /// The target settled after one or more writes
    Changed {
        path: PathBuf,
        timestamp: DateTime<Utc>,
    },
    /// The underlying watcher reported a problem
    Error {
        message: String,
        timestamp: DateTime<Utc>,
    },
}

/// Watches a single file
pub struct FileWatcher {
    target: PathBuf,
    watcher: Option<RecommendedWatcher>,
    config: WatchConfig,
}

impl FileWatcher {
    /// The target must exist and be a regular file
    pub fn new(target: impl AsRef<Path>) -> Result<Self> {
        let target = target.as_ref();
        let target = target
            .canonicalize()
            .with_context(|| format!("Cannot watch {}", target.display()))?;
        if !target.is_file() {
            return Err(anyhow!("Watch target is not a file: {}", target.display()));
        }

        Ok(Self {
            target,
            watcher: None,
            config: WatchConfig::default(),
        })
    }

    pub fn with_config(mut self, config: WatchConfig) -> Self {
        self.config = config;
        self
    }

    /// Canonical path of the watched file
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Begin watching; must be called inside a tokio runtime.
    ///
    /// The returned channel closes after [`FileWatcher::stop`].
    pub fn start(&mut self) -> Result<mpsc::Receiver<WatchEvent>> {
        let (event_tx, event_rx) = mpsc::channel(64);
        let (raw_tx, raw_rx) = mpsc::channel(256);

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            // A full channel already holds a pending change; the debounce
            // fires regardless.
            if let Err(e) = raw_tx.try_send(res) {
                debug!("dropping file event: {}", e);
            }
        })?;

        let directory = self
            .target
            .parent()
            .ok_or_else(|| anyhow!("Watch target has no parent directory"))?;
        watcher
            .watch(directory, RecursiveMode::NonRecursive)
            .context("Failed to start watching directory")?;
        self.watcher = Some(watcher);

        tokio::spawn(debounce(
            raw_rx,
            event_tx,
            self.target.clone(),
            Duration::from_millis(self.config.debounce_ms),
        ));

        info!("Watching {} for changes", self.target.display());
        Ok(event_rx)
    }

    /// Stop watching
    pub fn stop(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            drop(watcher);
            info!("Stopped watching {}", self.target.display());
        }
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Collapse bursts of raw events into one `Changed` per quiet period
async fn debounce(
    mut raw: mpsc::Receiver<notify::Result<Event>>,
    events: mpsc::Sender<WatchEvent>,
    target: PathBuf,
    delay: Duration,
) {
    let mut deadline: Option<Instant> = None;

    loop {
        let fire = async move {
            match deadline {
                Some(at) => sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            received = raw.recv() => match received {
                Some(Ok(event)) => {
                    if is_relevant(&event, &target) {
                        deadline = Some(Instant::now() + delay);
                    }
                }
                Some(Err(e)) => {
                    warn!("File watcher error: {}", e);
                    let error = WatchEvent::Error {
                        message: e.to_string(),
                        timestamp: Utc::now(),
                    };
                    if events.send(error).await.is_err() {
                        break;
                    }
                }
                None => {
                    debug!("File watcher channel closed");
                    break;
                }
            },

            () = fire => {
                deadline = None;
                let changed = WatchEvent::Changed {
                    path: target.clone(),
                    timestamp: Utc::now(),
                };
                if events.send(changed).await.is_err() {
                    break;
                }
            }
        }
    }
}

/// Content-changing event naming the target's file
fn is_relevant(event: &Event, target: &Path) -> bool {
    let changes_content = matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_));
    changes_content
        && event
            .paths
            .iter()
            .any(|path| path.file_name().is_some() && path.file_name() == target.file_name())
}
