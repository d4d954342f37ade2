use thiserror::Error;

/// Everything that can go wrong while compiling or evaluating an expression.
/// Compile-time variants carry the source offset; evaluation variants carry
/// enough context for a useful diagnostic line.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExpressionError {
    #[error("unexpected character '{ch}' at offset {offset}")]
    UnexpectedChar { ch: char, offset: usize },

    #[error("unterminated string literal starting at offset {offset}")]
    UnterminatedString { offset: usize },

    #[error("malformed number '{text}'")]
    MalformedNumber { text: String },

    #[error("unexpected token {found} (expected {expected})")]
    UnexpectedToken { expected: String, found: String },

    #[error("unknown function '{name}'")]
    UnknownFunction { name: String },

    #[error("{name}() expects {expected} argument(s), got {got}")]
    BadArity {
        name: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("cannot apply '{op}' to {lhs} and {rhs}")]
    TypeMismatch {
        op: &'static str,
        lhs: &'static str,
        rhs: &'static str,
    },

    #[error("integer division by zero")]
    DivisionByZero,

    #[error("unknown property '{name}'")]
    UnknownProperty { name: String },

    #[error("property read aborted: {reason}")]
    ReadAborted { reason: String },
}
