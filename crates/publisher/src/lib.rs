//! Task publisher.
//!
//! [`TaskPublisher`] declares the shared topology, publishes the model once
//! and then streams sampled scenarios onto `scenarioQueue` in id order.

mod config;
mod publisher;

pub use config::PublisherConfig;
pub use publisher::{PublishError, PublishSummary, TaskPublisher};
