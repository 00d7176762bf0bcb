//! cchud Core - streaming complexity analysis
//!
//! This crate runs the `pmccabe` analyzer against a single source file and
//! turns its output into something an editor or terminal can display:
//! - [`decoder`]: incremental decoding of the configured encoding with line-ending normalization
//! - [`runner`]: process lifecycle (spawn, stream, kill, poll)
//! - [`queue`]: bounded-block delivery to a single-threaded consumer
//! - [`parser`], [`bucketer`], [`annotator`]: records, severity tiers, source ranges
//! - [`session`]: the object that owns one active run at a time

#![warn(
    clippy::all,
    clippy::pedantic,
    clippy::nursery
)]
#![allow(
    clippy::module_name_repetitions,
)]

pub mod annotator;
pub mod bucketer;
pub mod config;
pub mod decoder;
pub mod job;
pub mod parser;
pub mod queue;
pub mod runner;
pub mod session;
pub mod surface;

pub use annotator::{annotate, AnnotatedRange, LineRange};
pub use bucketer::{classify, partition, Buckets, SeverityBucket, Thresholds};
pub use config::AnalyzerConfig;
pub use decoder::LineDecoder;
pub use job::{AnalysisJob, JobEvent, JobId, JobStatus};
pub use parser::{parse_line, parse_output, ComplexityRecord};
pub use queue::{Append, Completion, DeliveryQueue, Delivery};
pub use runner::ProcessRunner;
pub use session::{AnalysisSession, DrainStep, Report};
pub use surface::RenderSurface;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Result type used throughout cchud core
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for cchud core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The analyzer cannot be run with the current settings
    #[error("{0}")]
    Configuration(String),

    /// The target file path was empty
    #[error("Invalid analysis target: no file path given")]
    InvalidTarget,

    /// The analyzer process could not be created
    #[error("Failed to launch '{executable}': {reason}")]
    SpawnFailure { executable: String, reason: String },

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Utility error
    #[error("Utility error: {0}")]
    Util(#[from] cchud_utils::UtilError),
}

/// Lock a mutex, recovering the guard if a holder panicked.
///
/// Every critical section in this crate leaves its state consistent, so a
/// poisoned lock still guards valid data.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
