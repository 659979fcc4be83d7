//! Error handling for the proof-of-work engine
//!
//! Every failure the engine reports is synchronous: a job is rejected before the
//! search loop starts. Exhaustion and cancellation are normal outcomes carried in
//! [`MiningResult`](crate::MiningResult), never errors.

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the proof-of-work engine
#[derive(Error, Debug)]
pub enum Error {
    /// Header template is not exactly 80 bytes (or not valid hex)
    #[error("Invalid header: {message}")]
    InvalidHeader { message: String },

    /// Compact bits are malformed or the target is out of range
    #[error("Invalid target: {message}")]
    InvalidTarget { message: String },

    /// `start` was called while a search is already running
    #[error("A search is already running on this engine")]
    AlreadyRunning,

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// A hosted worker task failed outside the search itself
    #[error("Worker error: {message}")]
    Worker { message: String },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML configuration parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Create an invalid header error
    pub fn invalid_header(message: impl Into<String>) -> Self {
        Self::InvalidHeader {
            message: message.into(),
        }
    }

    /// Create an invalid target error
    pub fn invalid_target(message: impl Into<String>) -> Self {
        Self::InvalidTarget {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a worker error
    pub fn worker(message: impl Into<String>) -> Self {
        Self::Worker {
            message: message.into(),
        }
    }

    /// Whether this error rejected a job (as opposed to a host-side failure)
    pub fn is_job_rejection(&self) -> bool {
        matches!(
            self,
            Error::InvalidHeader { .. } | Error::InvalidTarget { .. } | Error::AlreadyRunning
        )
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Error::InvalidHeader { .. } => "invalid_header",
            Error::InvalidTarget { .. } => "invalid_target",
            Error::AlreadyRunning => "already_running",
            Error::Config { .. } => "config",
            Error::Worker { .. } => "worker",
            Error::Io(_) => "io",
            Error::Json(_) => "json",
            Error::Yaml(_) => "yaml",
        }
    }
}
