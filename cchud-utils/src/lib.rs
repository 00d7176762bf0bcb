//! cchud Utilities - logging and configuration helpers
//!
//! Shared by every crate in the workspace so that log formatting and
//! config-file handling behave the same in the library and the CLI.

#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod config;
pub mod logging;

pub use config::{load_config, ConfigBuilder};
pub use logging::{basic_config, init_logging, LogLevel, LoggerConfig};

/// Result type used throughout cchud utilities
pub type Result<T> = std::result::Result<T, UtilError>;

/// Error types for utility operations
#[derive(Debug, thiserror::Error)]
pub enum UtilError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}
