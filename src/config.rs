//! Configuration System
//!
//! Layered runtime configuration: built-in defaults, an optional TOML file, then
//! `EVENTUAL__SECTION__KEY` environment variables. Drives thread naming for background
//! operations, the default serial queue label, and logging.

use crate::error::ConfigError;
use crate::logging::LoggingConfig;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

const DEFAULT_THREAD_NAME_PREFIX: &str = "eventual-op";
const DEFAULT_QUEUE_LABEL: &str = "eventual-completion";
const MIN_STACK_SIZE: usize = 16 * 1024;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Threads that run future operations
    #[serde(default)]
    pub background: BackgroundConfig,

    /// Serial completion queues
    #[serde(default)]
    pub queue: QueueConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Background thread settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackgroundConfig {
    /// Thread names are `<prefix>-<n>`
    #[serde(default = "default_thread_name_prefix")]
    pub thread_name_prefix: String,

    /// Stack size in bytes; platform default when unset
    #[serde(default)]
    pub stack_size: Option<usize>,
}

fn default_thread_name_prefix() -> String {
    DEFAULT_THREAD_NAME_PREFIX.to_string()
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            thread_name_prefix: default_thread_name_prefix(),
            stack_size: None,
        }
    }
}

/// Serial queue settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_queue_label")]
    pub default_label: String,
}

fn default_queue_label() -> String {
    DEFAULT_QUEUE_LABEL.to_string()
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            default_label: default_queue_label(),
        }
    }
}

impl BackgroundConfig {
    pub fn validate(&self) -> Result<(), String> {
        validate_thread_name("Thread name prefix", &self.thread_name_prefix)?;
        if let Some(stack_size) = self.stack_size {
            if stack_size < MIN_STACK_SIZE {
                return Err(format!(
                    "Stack size {} is below the minimum of {} bytes",
                    stack_size, MIN_STACK_SIZE
                ));
            }
        }
        Ok(())
    }
}

impl QueueConfig {
    pub fn validate(&self) -> Result<(), String> {
        validate_thread_name("Queue label", &self.default_label)
    }
}

fn validate_thread_name(what: &str, name: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err(format!("{} cannot be empty", what));
    }
    if name.contains('\0') {
        return Err(format!("{} cannot contain NUL bytes", what));
    }
    Ok(())
}

impl RuntimeConfig {
    /// Load configuration.
    ///
    /// Precedence (highest to lowest):
    /// 1. Environment variables (`EVENTUAL__BACKGROUND__STACK_SIZE`, ...)
    /// 2. The file at `path`, if given (must exist)
    /// 3. Defaults
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("background.thread_name_prefix", DEFAULT_THREAD_NAME_PREFIX)?
            .set_default("queue.default_label", DEFAULT_QUEUE_LABEL)?;

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("EVENTUAL")
                .separator("__")
                .try_parsing(true),
        );

        let config: RuntimeConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if let Err(e) = self.background.validate() {
            errors.push(format!("background: {}", e));
        }
        if let Err(e) = self.queue.validate() {
            errors.push(format!("queue: {}", e));
        }
        if let Err(e) = self.logging.validate() {
            errors.push(format!("logging: {}", e));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(errors.join("; ")))
        }
    }
}
