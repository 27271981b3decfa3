//! Monte Carlo Simulator CLI
//!
//! Runs a publisher, a pool of workers and an aggregator in one process.
//!
//! # Example
//!
//! ```bash
//! # 10k scenarios over 8 workers with a fixed seed
//! montecarlo-sim --model model.txt -n 10000 -w 8 --seed 42
//!
//! # Everything from a config file, with a log file
//! montecarlo-sim --config sim.toml --logfile logs/sim.log
//!
//! # Reproduce the legacy shared model queue
//! montecarlo-sim --model model.txt -w 2 --model-delivery shared-queue
//! ```

use anyhow::{bail, Context, Result};
use clap::Parser;
use montecarlo_aggregator::LogRenderer;
use montecarlo_broker::ModelDelivery;
use montecarlo_simulator::{Completion, Simulator, SimulatorConfig, TelemetryConfigToml};
use montecarlo_types::Model;
use std::fs;
use std::path::PathBuf;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Monte Carlo Simulator
///
/// Distributes a Monte Carlo run across worker threads through an
/// in-process message broker.
#[derive(Parser, Debug)]
#[command(name = "montecarlo-sim")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Model definition file (overrides config)
    #[arg(short, long)]
    model: Option<PathBuf>,

    /// Number of scenarios (overrides config)
    #[arg(short = 'n', long)]
    scenarios: Option<u64>,

    /// Number of workers (overrides config)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Random seed for reproducible sampling. When omitted, a random seed is used.
    #[arg(long)]
    seed: Option<u64>,

    /// Model delivery mode: broadcast or shared-queue (overrides config)
    #[arg(long)]
    model_delivery: Option<ModelDelivery>,

    /// Replace repeated results for a scenario instead of counting them twice
    #[arg(long)]
    dedup: bool,

    /// Seconds to wait for the run to drain (overrides config)
    #[arg(long)]
    timeout: Option<u64>,

    /// Log level filter (overrides RUST_LOG)
    #[arg(long)]
    log_level: Option<String>,

    /// Path to log file (redirects all logs to this file)
    #[arg(long)]
    logfile: Option<PathBuf>,

    /// Print Prometheus metrics at exit
    #[arg(long)]
    prometheus: bool,
}

/// Apply CLI overrides to the configuration.
fn apply_overrides(config: &mut SimulatorConfig, cli: &Cli) {
    if let Some(ref model) = cli.model {
        config.run.model_file = Some(model.clone());
    }

    if let Some(scenarios) = cli.scenarios {
        config.run.scenarios = scenarios;
    }

    if let Some(workers) = cli.workers {
        config.workers.count = workers;
    }

    if let Some(seed) = cli.seed {
        config.run.seed = Some(seed);
    }

    if let Some(mode) = cli.model_delivery {
        config.workers.model_delivery = mode;
    }

    if cli.dedup {
        config.aggregator.dedup = true;
    }

    if let Some(timeout) = cli.timeout {
        config.run.timeout_secs = timeout;
    }

    if let Some(ref level) = cli.log_level {
        config.telemetry.log_level = level.clone();
    }

    if let Some(ref logfile) = cli.logfile {
        config.telemetry.log_file = Some(logfile.clone());
    }

    if cli.prometheus {
        config.telemetry.prometheus = true;
    }
}

/// Install the global subscriber. The returned guard flushes the log file
/// when dropped.
fn init_logging(
    telemetry: &TelemetryConfigToml,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&telemetry.log_level))
    };
    let builder = tracing_subscriber::fmt();

    if let Some(log_file) = &telemetry.log_file {
        if let Some(parent) = log_file.parent() {
            fs::create_dir_all(parent)?;
        }
        let file_name = log_file
            .file_name()
            .ok_or_else(|| anyhow::anyhow!("Invalid log file name"))?
            .to_string_lossy()
            .to_string();
        let directory = log_file
            .parent()
            .unwrap_or(std::path::Path::new("."))
            .to_path_buf();

        let file_appender = tracing_appender::rolling::never(directory, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        builder
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .with_thread_names(true)
            .with_env_filter(filter())
            .init();
        Ok(Some(guard))
    } else {
        builder.with_env_filter(filter()).init();
        Ok(None)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => SimulatorConfig::load(path)?,
        None => SimulatorConfig::default(),
    };
    apply_overrides(&mut config, &cli);

    let _log_guard = init_logging(&config.telemetry)?;

    let Some(model_file) = config.run.model_file.clone() else {
        bail!("No model file given: pass --model or set run.model_file");
    };
    let model = Model::load(&model_file)
        .with_context(|| format!("Failed to load model file: {}", model_file.display()))?;
    info!(
        file = %model_file.display(),
        variables = model.distributions.len(),
        "Model loaded"
    );

    if config.telemetry.prometheus {
        montecarlo_metrics_prometheus::install().map_err(anyhow::Error::msg)?;
    }

    let timeout_secs = config.run.timeout_secs;
    let prometheus = config.telemetry.prometheus;
    let simulator = Simulator::new(config, model).context("Failed to create simulator")?;

    // Interrupts end the run abruptly: workers close their channels without
    // draining and in-flight scenarios stay on the broker.
    let (interrupt_tx, interrupt_rx) = crossbeam::channel::bounded(1);
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                warn!(error = %e, "Failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to install signal handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C"),
            _ = terminate => info!("Received SIGTERM"),
        }
        let _ = interrupt_tx.send(());
    });

    let report = tokio::task::spawn_blocking(move || {
        simulator.run_with(LogRenderer::default(), &interrupt_rx)
    })
    .await
    .context("Simulation task failed")?
    .context("Simulation failed")?;

    report.print_summary();

    if prometheus {
        let (_, body) = montecarlo_metrics_prometheus::encode_metrics().map_err(anyhow::Error::msg)?;
        println!("\n=== Metrics ===");
        print!("{}", String::from_utf8_lossy(&body));
    }

    if report.completion == Completion::TimedOut {
        bail!("Run did not drain within {timeout_secs}s");
    }
    Ok(())
}
