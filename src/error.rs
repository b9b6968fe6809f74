//! Error types for the eventual runtime support code.
//!
//! Futures themselves never produce these: an operation's failure travels inside
//! [`crate::outcome::Try::Failure`]. These cover queue workers, configuration and logging.

use thiserror::Error;

/// Execution context errors
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Failed to spawn worker thread for queue '{label}': {source}")]
    Spawn {
        label: String,
        #[source]
        source: std::io::Error,
    },
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Logging setup errors
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Invalid log format: {0} (must be 'json' or 'text')")]
    InvalidFormat(String),

    #[error("Invalid log output: {0} (must be 'stdout', 'stderr', or 'file')")]
    InvalidOutput(String),

    #[error("Invalid log directive: {0}")]
    Directive(String),

    #[error("Failed to open log file {path:?}: {source}")]
    File {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to install subscriber: {0}")]
    Install(String),
}
