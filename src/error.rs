//! Error handling module for dvwa-deploy
//!
//! Provides centralized error handling with proper error types using thiserror.
//! Best-effort steps never surface here; only failures that abort the run do.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for a deployment run
#[derive(Error, Debug)]
pub enum DeployError {
    /// IO errors (temporary directory, file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors (loading, parsing)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation errors (config values, CLI overrides)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Pre-flight check failures (privileges, required binaries)
    #[error("Pre-flight check failed: {0}")]
    Preflight(String),

    /// A step marked critical did not succeed
    #[error("Critical step failed: {} (exit code {})", .label, display_code(.code))]
    CriticalStep { label: String, code: Option<i32> },

    /// A command could not be started at all
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Layout normalizer filesystem failure
    #[error("Normalize failed at {}: {}", .path.display(), .source)]
    Normalize {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn display_code(code: &Option<i32>) -> String {
    code.map_or_else(|| "none".to_string(), |c| c.to_string())
}

/// Result type alias for deployment operations
pub type Result<T> = std::result::Result<T, DeployError>;

impl DeployError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a pre-flight error
    pub fn preflight(msg: impl Into<String>) -> Self {
        Self::Preflight(msg.into())
    }

    /// Create a critical step error
    pub fn critical_step(label: impl Into<String>, code: Option<i32>) -> Self {
        Self::CriticalStep {
            label: label.into(),
            code,
        }
    }

    /// Create a normalizer error tied to the path that failed
    pub fn normalize(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Normalize {
            path: path.into(),
            source,
        }
    }

    /// Process exit code this error should produce.
    ///
    /// Critical steps propagate the child's own exit code when it has one.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::CriticalStep { code: Some(c), .. } if *c != 0 => *c,
            _ => 1,
        }
    }
}
