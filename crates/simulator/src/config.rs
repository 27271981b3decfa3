//! Simulator configuration.
//!
//! Example TOML:
//!
//! ```toml
//! [run]
//! model_file = "model.txt"
//! scenarios = 1000
//! seed = 42
//!
//! [workers]
//! count = 4
//! prefetch = 1
//! model_poll_interval_ms = 3000
//! model_delivery = "broadcast"
//!
//! [publisher]
//! model_ttl_ms = 600000
//!
//! [aggregator]
//! snapshot_interval_ms = 1000
//! dedup = false
//! histogram_bins = 50
//!
//! [telemetry]
//! log_level = "info"
//! log_file = "logs/sim.log"
//! prometheus = false
//! ```

use anyhow::{Context, Result};
use montecarlo_aggregator::AggregatorConfig;
use montecarlo_broker::ModelDelivery;
use montecarlo_publisher::PublisherConfig;
use montecarlo_types::WorkerId;
use montecarlo_worker::WorkerConfig;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level simulator configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SimulatorConfig {
    #[serde(default)]
    pub run: RunConfig,

    #[serde(default)]
    pub workers: WorkersConfig,

    #[serde(default)]
    pub publisher: PublisherConfigToml,

    #[serde(default)]
    pub aggregator: AggregatorConfigToml,

    #[serde(default)]
    pub telemetry: TelemetryConfigToml,
}

/// What to run.
#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    /// Model definition file
    #[serde(default)]
    pub model_file: Option<PathBuf>,

    /// Number of scenarios to publish
    #[serde(default = "default_scenarios")]
    pub scenarios: u64,

    /// Sampling seed. When omitted, a random seed is used and reported.
    #[serde(default)]
    pub seed: Option<u64>,

    /// Give up waiting for the queues to drain after this long
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            model_file: None,
            scenarios: default_scenarios(),
            seed: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_scenarios() -> u64 {
    1000
}

fn default_timeout_secs() -> u64 {
    300
}

/// Worker pool configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkersConfig {
    /// Number of worker threads
    #[serde(default = "default_worker_count")]
    pub count: usize,

    /// Unacknowledged scenarios allowed per worker
    #[serde(default = "default_prefetch")]
    pub prefetch: u16,

    /// Backoff between model pull attempts (milliseconds)
    #[serde(default = "default_model_poll_interval_ms")]
    pub model_poll_interval_ms: u64,

    /// How the model reaches the workers
    #[serde(default)]
    pub model_delivery: ModelDelivery,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            count: default_worker_count(),
            prefetch: default_prefetch(),
            model_poll_interval_ms: default_model_poll_interval_ms(),
            model_delivery: ModelDelivery::default(),
        }
    }
}

fn default_worker_count() -> usize {
    4
}

fn default_prefetch() -> u16 {
    1
}

fn default_model_poll_interval_ms() -> u64 {
    3000
}

/// Publisher configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PublisherConfigToml {
    /// Retention window of the published model (milliseconds)
    #[serde(default = "default_model_ttl_ms")]
    pub model_ttl_ms: u64,
}

impl Default for PublisherConfigToml {
    fn default() -> Self {
        Self {
            model_ttl_ms: default_model_ttl_ms(),
        }
    }
}

fn default_model_ttl_ms() -> u64 {
    600_000
}

/// Aggregator configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AggregatorConfigToml {
    /// Snapshot cadence (milliseconds)
    #[serde(default = "default_snapshot_interval_ms")]
    pub snapshot_interval_ms: u64,

    /// Replace repeated results for a scenario instead of appending them
    #[serde(default)]
    pub dedup: bool,

    #[serde(default = "default_histogram_bins")]
    pub histogram_bins: usize,
}

impl Default for AggregatorConfigToml {
    fn default() -> Self {
        Self {
            snapshot_interval_ms: default_snapshot_interval_ms(),
            dedup: false,
            histogram_bins: default_histogram_bins(),
        }
    }
}

fn default_snapshot_interval_ms() -> u64 {
    1000
}

fn default_histogram_bins() -> usize {
    50
}

/// Logging and metrics output.
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfigToml {
    /// Log filter used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Optional log file path. If provided, logs are written to this file.
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Print the Prometheus exposition at exit
    #[serde(default)]
    pub prometheus: bool,
}

impl Default for TelemetryConfigToml {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_file: None,
            prometheus: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl SimulatorConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Configuration of the `index`-th worker.
    pub fn worker_config(&self, index: usize) -> WorkerConfig {
        WorkerConfig {
            worker_id: WorkerId::for_process(index),
            prefetch: self.workers.prefetch,
            model_poll_interval: Duration::from_millis(self.workers.model_poll_interval_ms),
            model_delivery: self.workers.model_delivery,
            max_scenarios: None,
        }
    }

    pub fn publisher_config(&self) -> PublisherConfig {
        PublisherConfig {
            model_delivery: self.workers.model_delivery,
            model_ttl: Duration::from_millis(self.publisher.model_ttl_ms),
        }
    }

    pub fn aggregator_config(&self) -> AggregatorConfig {
        AggregatorConfig {
            snapshot_interval: Duration::from_millis(self.aggregator.snapshot_interval_ms),
            dedup: self.aggregator.dedup,
            histogram_bins: self.aggregator.histogram_bins,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.run.timeout_secs)
    }
}
