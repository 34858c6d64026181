//! Error types for rule compilation and evaluation

use thiserror::Error;

/// Result type alias for rule operations
pub type Result<T> = std::result::Result<T, RuleError>;

/// Errors raised while compiling or running a step rule
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuleError {
    /// Lexing or parsing failed
    #[error("rule compilation failed at offset {offset}: {message}")]
    Parse { offset: usize, message: String },

    /// Evaluation failed (unknown field, type mismatch, division by zero, …)
    #[error("rule execution failed: {0}")]
    Eval(String),

    /// The expression evaluated to something other than a boolean
    #[error("rule result is not a boolean (got {0})")]
    NotBoolean(&'static str),
}

impl RuleError {
    pub(crate) fn eval(message: impl Into<String>) -> Self {
        RuleError::Eval(message.into())
    }
}
