//! Worker runtime.
//!
//! A worker loads the model once, then competes with its peers for
//! scenarios under a prefetch window of one, evaluating each against the
//! model formula and publishing the result.
//!
//! ```text
//! Bootstrapping ──► AwaitingModel ──► Ready ──► Consuming ──► Stopped
//!                        │  ▲
//!                        └──┘ poll every 3s until a model arrives
//! ```
//!
//! Shutdown is abrupt: the channel is closed without draining, and the
//! broker redelivers whatever was in flight to another worker.

mod config;
mod error;
mod runtime;

pub use config::WorkerConfig;
pub use error::{EvaluationError, WorkerError};
pub use runtime::{StopReason, WorkerReport, WorkerRuntime, WorkerState, WorkerStats};
