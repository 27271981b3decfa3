//! Core types for distributed Monte Carlo runs.
//!
//! This crate provides the data objects exchanged between the publisher,
//! the workers and the aggregator:
//!
//! - **Model**: the formula plus one [`DistributionSpec`] per variable
//! - **Scenario**: one sampled assignment of values, tagged with a [`ScenarioId`]
//! - **ResultRecord**: a formula output tagged with the producing [`WorkerId`]
//! - **Wire messages**: the JSON bodies carried by the three queues
//!
//! # Design Philosophy
//!
//! This crate is self-contained. It does not depend on any other workspace
//! crate, making it the foundation layer. Distribution specs are parsed once,
//! at model-load time, into a tagged variant instead of being re-split on
//! every sample.

mod distribution;
mod error;
mod identifiers;
mod message;
mod model;
mod result;
mod scenario;

pub use distribution::DistributionSpec;
pub use error::{DistributionError, ParseError};
pub use identifiers::{ScenarioId, WorkerId};
pub use message::{
    ModelMessage, QueueMessage, ResultMessage, ScenarioMessage, MODEL_EXCHANGE, MODEL_QUEUE,
    MODEL_TTL, RESULT_QUEUE, SCENARIO_QUEUE,
};
pub use model::Model;
pub use result::ResultRecord;
pub use scenario::Scenario;
