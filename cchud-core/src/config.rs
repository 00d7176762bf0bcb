//! Analyzer settings
//!
//! Field names follow the settings keys an editor host stores, so a
//! `cchud.toml` can be shared between the CLI and an editor integration.

use crate::bucketer::Thresholds;
use crate::queue::DEFAULT_BLOCK_SIZE;
use crate::{Error, Result};
use cchud_utils::ConfigBuilder;
use encoding_rs::Encoding;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Settings consumed by [`crate::AnalysisSession`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Path to the pmccabe executable
    pub executable_path: PathBuf,
    /// Modified complexity above this is `high`
    pub high_complexity_threshold: u32,
    /// Modified complexity above this (and not high) is `medium`
    pub medium_complexity_threshold: u32,
    /// Highlight matching lines in the output surface
    pub output_highlighting_enabled: bool,
    /// Annotate the analyzed source with complexity labels
    pub annotations_enabled: bool,
    /// Encoding of the analyzer's output, as a WHATWG label (`utf-8`, `latin1`, `shift_jis`, ...)
    pub text_encoding: String,
    /// Maximum characters per delivered block
    pub delivery_block_size: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            executable_path: default_executable(),
            high_complexity_threshold: 15,
            medium_complexity_threshold: 7,
            output_highlighting_enabled: false,
            annotations_enabled: true,
            text_encoding: "utf-8".to_string(),
            delivery_block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

#[cfg(windows)]
fn default_executable() -> PathBuf {
    PathBuf::from(r"C:\Program Files\pmccabe\pmccabe.exe")
}

#[cfg(not(windows))]
fn default_executable() -> PathBuf {
    PathBuf::from("/usr/bin/pmccabe")
}

impl AnalyzerConfig {
    /// Defaults, overlaid with `path` when given (`.toml`, `.json`, `.yaml`)
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = ConfigBuilder::<Self>::new().load_file(path)?.build();
        if let Some(path) = path {
            debug!("Loaded analyzer config from {}", path.display());
        }
        Ok(config)
    }

    pub const fn thresholds(&self) -> Thresholds {
        Thresholds {
            high: self.high_complexity_threshold,
            medium: self.medium_complexity_threshold,
        }
    }

    /// Check that a run can start and return the executable to launch.
    ///
    /// A bare program name is looked up on `PATH`.
    pub fn check_runnable(&self) -> Result<PathBuf> {
        self.check_encoding()?;

        let path = &self.executable_path;
        if path.is_file() {
            return Ok(path.clone());
        }

        let is_bare_name = path.components().count() == 1 && !path.as_os_str().is_empty();
        if is_bare_name {
            if let Ok(resolved) = which::which(path) {
                return Ok(resolved);
            }
        }

        Err(Error::Configuration(format!(
            "The pmccabe executable provided at '{}' does not exist",
            path.display()
        )))
    }

    /// The encoding named by `text_encoding`
    pub fn encoding(&self) -> Result<&'static Encoding> {
        Encoding::for_label(self.text_encoding.as_bytes()).ok_or_else(|| {
            Error::Configuration(format!("Unknown text encoding '{}'", self.text_encoding))
        })
    }

    pub fn check_encoding(&self) -> Result<()> {
        self.encoding().map(|_| ())
    }

    /// Log settings that are accepted but will not behave sensibly
    pub fn warn_suspicious(&self) {
        if self.medium_complexity_threshold > self.high_complexity_threshold {
            warn!(
                medium = self.medium_complexity_threshold,
                high = self.high_complexity_threshold,
                "medium complexity threshold exceeds high threshold; the medium tier will be empty"
            );
        }
        if self.delivery_block_size == 0 {
            warn!("delivery_block_size is 0; falling back to {}", DEFAULT_BLOCK_SIZE);
        }
    }
}
