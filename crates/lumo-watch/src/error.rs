//! Error types for watcher runtimes.

use thiserror::Error;

/// Result type alias for watcher operations.
pub type WatchResult<T> = Result<T, WatchError>;

/// Errors from detection backends and runtimes.
#[derive(Debug, Error)]
pub enum WatchError {
    /// A detection engine reported failure for this cycle.
    #[error("detector `{name}` failed: {message}")]
    Detector { name: String, message: String },

    /// A config named a detection engine that is not registered.
    #[error("no detector registered for `{name}`")]
    UnknownDetector { name: String },

    /// A watcher config is missing a required field.
    #[error("invalid watcher config: {message}")]
    InvalidConfig { message: String },

    /// HTTP fetch failed.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Result (de)serialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl WatchError {
    pub fn detector(name: impl Into<String>, message: impl std::fmt::Display) -> Self {
        WatchError::Detector {
            name: name.into(),
            message: message.to_string(),
        }
    }
}
