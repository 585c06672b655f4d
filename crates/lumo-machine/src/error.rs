//! Error types for the machine crate.

use lumo_expr::ExprError;
use thiserror::Error;

/// Result type alias for machine operations.
pub type MachineResult<T> = Result<T, MachineError>;

/// Errors that can occur during engine operations.
#[derive(Debug, Error)]
pub enum MachineError {
    /// A state was referenced by name but does not exist.
    #[error("unknown state: {name}")]
    UnknownState { name: String },

    /// A pipeline was referenced by name but is not registered.
    #[error("unknown pipeline: {name}")]
    UnknownPipeline { name: String },

    /// A rule specification could not be normalized.
    #[error("invalid rule: {message}")]
    InvalidRule { message: String },

    /// A rule index was out of range.
    #[error("rule index {index} out of range ({len} rules)")]
    RuleIndexOutOfRange { index: usize, len: usize },

    /// A schedule trigger time was not `HH:MM`.
    #[error("invalid schedule time `{value}` (expected HH:MM)")]
    InvalidScheduleTime { value: String },

    /// Sandbox compilation or evaluation failed.
    #[error("expression error: {0}")]
    Expr(#[from] ExprError),

    /// Serialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// File store I/O failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Engine configuration could not be loaded.
    #[error("config error: {message}")]
    Config { message: String },

    /// A user-supplied interval callback reported failure.
    #[error("interval callback failed: {message}")]
    Callback { message: String },
}
