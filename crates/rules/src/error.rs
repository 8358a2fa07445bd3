//! Error types for expression evaluation and diagnosis configuration.

/// Errors raised while compiling or evaluating a check condition.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExpressionError {
    /// Malformed condition text; `position` is a byte offset into the source.
    #[error("syntax error at offset {position}: {message}")]
    Syntax { position: usize, message: String },

    #[error("null operand for `{0}`")]
    NullOperand(String),

    #[error("attempt to divide by zero")]
    DivideByZero,

    #[error("unknown data name `{0}`")]
    UnknownName(String),

    #[error("index {index} is out of range for `{name}`")]
    InvalidIndex { name: String, index: usize },

    #[error("unknown function `{0}`")]
    UnknownFunction(String),

    #[error("function `{name}` failed: {message}")]
    Function { name: String, message: String },

    #[error("type error: {0}")]
    Type(String),
}

impl ExpressionError {
    pub(crate) fn syntax(position: usize, message: impl Into<String>) -> Self {
        ExpressionError::Syntax {
            position,
            message: message.into(),
        }
    }

    pub(crate) fn function(name: &str, message: impl Into<String>) -> Self {
        ExpressionError::Function {
            name: name.to_string(),
            message: message.into(),
        }
    }
}

/// Errors raised while loading a diagnosis configuration.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    /// Unreadable or structurally invalid configuration.
    #[error("parse config error: {0}")]
    ParseConfig(String),

    /// Malformed diagnosis tree node.
    #[error("diagnosis tree error: {0}")]
    Tree(String),

    #[error("expression error: {0}")]
    Expression(#[from] ExpressionError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result alias for rule operations.
pub type Result<T> = std::result::Result<T, RuleError>;
