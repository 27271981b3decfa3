//! Parse errors for model files and distribution specs.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from parsing a single distribution spec string such as
/// `normal(mu=0,sigma=1)`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DistributionError {
    #[error("malformed distribution spec `{0}`: expected `kind(key=value, ...)`")]
    Malformed(String),

    #[error("unknown distribution kind `{0}`")]
    UnknownKind(String),

    #[error("{kind}: missing parameter `{param}`")]
    MissingParameter {
        kind: &'static str,
        param: &'static str,
    },

    #[error("{kind}: unexpected parameter `{param}`")]
    UnexpectedParameter { kind: &'static str, param: String },

    #[error("{kind}: parameter `{param}` given more than once")]
    DuplicateParameter { kind: &'static str, param: String },

    #[error("parameter `{param}` is not a finite number: `{value}`")]
    InvalidNumber { param: String, value: String },

    #[error("{kind}: {reason}")]
    InvalidParameters { kind: &'static str, reason: String },
}

/// Errors from parsing a model file.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("failed to read model file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("model has no `FUNCTION:` line")]
    MissingFunction,

    #[error("line {line}: empty formula")]
    EmptyFunction { line: usize },

    #[error("line {line}: more than one `FUNCTION:` line")]
    DuplicateFunction { line: usize },

    #[error("line {line}: expected `<variable>: <distribution>`, got `{content}`")]
    MalformedLine { line: usize, content: String },

    #[error("line {line}: `{name}` is not a valid variable name")]
    InvalidVariableName { line: usize, name: String },

    #[error("line {line}: variable `{name}` is reserved")]
    ReservedVariableName { line: usize, name: String },

    #[error("line {line}: variable `{name}` defined more than once")]
    DuplicateVariable { line: usize, name: String },

    #[error("line {line}: variable `{variable}`: {source}")]
    Distribution {
        line: usize,
        variable: String,
        #[source]
        source: DistributionError,
    },
}
