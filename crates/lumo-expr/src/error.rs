//! Error types for the expression sandbox.

use thiserror::Error;

/// Result type alias for sandbox operations.
pub type ExprResult<T> = Result<T, ExprError>;

/// Errors produced while compiling or evaluating sandboxed code.
#[derive(Debug, Clone, Error)]
pub enum ExprError {
    /// Lexing or parsing failed.
    #[error("parse error at line {line}: {message}")]
    Parse { line: u32, message: String },

    /// Expression nesting exceeded the parse-time depth cap.
    #[error("expression nesting too deep (max {max})")]
    TooDeep { max: usize },

    /// An identifier was neither a variable nor a known constant.
    #[error("undefined variable: {name}")]
    UndefinedVariable { name: String },

    /// A call named a function outside the whitelisted table.
    #[error("unknown function: {name}")]
    UnknownFunction { name: String },

    /// A builtin was called with the wrong number of arguments.
    #[error("{name} expects {expected} argument(s), got {got}")]
    Arity {
        name: String,
        expected: String,
        got: usize,
    },

    /// An operation was applied to a value of the wrong type.
    #[error("type error: {message}")]
    Type { message: String },

    /// A host binding is not exposed in the current evaluation context.
    #[error("{name} is not available in this context")]
    Unavailable { name: String },

    /// A render return value did not follow the frame conventions.
    #[error("invalid render result: {message}")]
    BadRenderResult { message: String },
}

impl ExprError {
    pub(crate) fn type_err(message: impl Into<String>) -> Self {
        ExprError::Type {
            message: message.into(),
        }
    }
}
