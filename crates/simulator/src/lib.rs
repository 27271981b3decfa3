//! Monte Carlo simulator.
//!
//! Runs a complete deployment inside one process: the publisher streams
//! scenarios, a pool of worker threads competes for them and an aggregator
//! collects the results, all through an in-process broker with the same
//! delivery semantics as a networked one.
//!
//! # Example
//!
//! ```ignore
//! use montecarlo_simulator::{Simulator, SimulatorConfig};
//! use montecarlo_types::Model;
//!
//! let mut config = SimulatorConfig::default();
//! config.run.scenarios = 10_000;
//! config.run.seed = Some(42);
//!
//! let model = Model::load("model.txt")?;
//! let report = Simulator::new(config, model)?.run()?;
//! report.print_summary();
//! ```

mod config;
mod report;
mod runner;

pub use config::{
    AggregatorConfigToml, PublisherConfigToml, RunConfig, SimulatorConfig, TelemetryConfigToml,
    WorkersConfig,
};
pub use report::{Completion, SimulationReport};
pub use runner::{SimulationError, Simulator};
