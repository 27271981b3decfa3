use crate::runtime::WorkerState;
use montecarlo_broker::BrokerError;
use montecarlo_expr::{EvalError, ExprError};
use thiserror::Error;

/// Fatal worker errors. The worker stops when one is returned.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("Operation requires state {expected:?}, worker is {actual:?}")]
    InvalidState {
        expected: WorkerState,
        actual: WorkerState,
    },
}

/// Why one scenario could not be evaluated. The scenario is dropped.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvaluationError {
    #[error("no model loaded")]
    NoModel,

    #[error("malformed expression: {0}")]
    Malformed(#[from] ExprError),

    #[error(transparent)]
    Eval(#[from] EvalError),
}

impl EvaluationError {
    /// Short label for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::NoModel => "no_model",
            Self::Malformed(_) => "malformed",
            Self::Eval(EvalError::UnboundVariable(_)) => "unbound_variable",
            Self::Eval(EvalError::DivisionByZero) => "division_by_zero",
            Self::Eval(EvalError::Domain { .. }) => "domain",
            Self::Eval(EvalError::Overflow) => "overflow",
        }
    }
}
