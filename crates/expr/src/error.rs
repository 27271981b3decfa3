//! Formula errors.

use thiserror::Error;

/// Errors raised while lexing or parsing a formula.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExprError {
    #[error("empty formula")]
    Empty,

    #[error("invalid character at offset {position}: `{text}`")]
    InvalidToken { position: usize, text: String },

    #[error("unexpected `{found}` at offset {position}, expected {expected}")]
    UnexpectedToken {
        position: usize,
        found: String,
        expected: &'static str,
    },

    #[error("unexpected end of formula, expected {expected}")]
    UnexpectedEnd { expected: &'static str },

    #[error("unknown function `{name}` at offset {position}")]
    UnknownFunction { name: String, position: usize },

    #[error("{function}() takes {expected} argument(s), {found} given")]
    Arity {
        function: &'static str,
        expected: &'static str,
        found: usize,
    },
}

/// Errors raised while evaluating a formula against a scenario.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("variable `{0}` has no value")]
    UnboundVariable(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("math domain error in {operation}({argument})")]
    Domain {
        operation: &'static str,
        argument: f64,
    },

    #[error("numerical result out of range")]
    Overflow,
}
