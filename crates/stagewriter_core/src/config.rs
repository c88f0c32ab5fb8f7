//! Writer and logging configuration.
//!
//! # Responsibility
//! - Describe tunable writer behavior (rollback policy).
//! - Carry logging bootstrap settings for embedding applications.
//!
//! # Invariants
//! - Every field has a default, so partial JSON documents are accepted.
//! - Log levels are validated at parse time, not at first use.

use crate::logging::{default_log_level, init_logging, normalize_level};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What a writer does with its buckets when a deferred save is rolled back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackPolicy {
    /// Keep staged buckets as they were at save time. A later save re-issues
    /// the same repository calls.
    #[default]
    Retain,
    /// Abandon staged work: entities that left `current` for an update or a
    /// delete come back with their persisted value, staged creates are
    /// dropped. Fits repositories that take part in the rolled-back
    /// transaction themselves.
    Discard,
}

impl RollbackPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Retain => "retain",
            Self::Discard => "discard",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterOptions {
    pub rollback_policy: RollbackPolicy,
}

/// Logging bootstrap settings.
///
/// Logging stays disabled when `log_dir` is absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub log_dir: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level().to_string(),
            log_dir: None,
        }
    }
}

impl LoggingConfig {
    /// Starts file logging when a directory is configured.
    ///
    /// Returns whether logging is active afterwards.
    pub fn init(&self) -> Result<bool, ConfigError> {
        match self.log_dir.as_deref() {
            Some(dir) => {
                init_logging(&self.level, dir).map_err(ConfigError::Logging)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Top-level configuration document.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StageWriterConfig {
    pub writer: WriterOptions,
    pub logging: LoggingConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration document: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("{0}")]
    Logging(String),
}

impl StageWriterConfig {
    /// Parses a JSON document and normalizes the log level.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_json::from_str(raw)?;
        config.logging.level = normalize_level(&config.logging.level)
            .map_err(ConfigError::Logging)?
            .to_string();
        Ok(config)
    }
}
