//! End-of-run report.

use montecarlo_aggregator::ResultSnapshot;
use montecarlo_broker_memory::BrokerStats;
use montecarlo_publisher::PublishSummary;
use montecarlo_types::SCENARIO_QUEUE;
use montecarlo_worker::WorkerReport;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// How the wait for results ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Every scenario was consumed and every result aggregated.
    Drained,
    TimedOut,
    Interrupted,
}

impl fmt::Display for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Completion::Drained => write!(f, "drained"),
            Completion::TimedOut => write!(f, "timed out"),
            Completion::Interrupted => write!(f, "interrupted"),
        }
    }
}

/// Outcome of [`Simulator::run`](crate::Simulator::run).
#[derive(Debug, Clone)]
pub struct SimulationReport {
    pub seed: u64,
    pub completion: Completion,
    pub elapsed: Duration,
    pub published: PublishSummary,
    /// Aggregator state at shutdown.
    pub snapshot: Arc<ResultSnapshot>,
    pub workers: Vec<WorkerReport>,
    pub broker: BrokerStats,
}

impl SimulationReport {
    pub fn is_complete(&self) -> bool {
        self.completion == Completion::Drained
    }

    /// Difference in scenarios delivered to the busiest and idlest worker.
    pub fn scenario_skew(&self) -> Option<u64> {
        self.broker.delivery_skew(SCENARIO_QUEUE)
    }

    pub fn results_published(&self) -> u64 {
        self.workers.iter().map(|w| w.stats.results_published).sum()
    }

    pub fn evaluation_failures(&self) -> u64 {
        self.workers
            .iter()
            .map(|w| w.stats.evaluation_failures + w.stats.malformed)
            .sum()
    }

    pub fn workers_with_model(&self) -> usize {
        self.workers.iter().filter(|w| w.model_loaded).count()
    }

    pub fn print_summary(&self) {
        println!("{self}");
    }
}

fn opt(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.6}"))
}

impl fmt::Display for SimulationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\n=== Simulation Report ===")?;
        writeln!(f, "Seed:                {}", self.seed)?;
        writeln!(f, "Completion:          {}", self.completion)?;
        writeln!(f, "Elapsed:             {:.2?}", self.elapsed)?;
        writeln!(f, "Scenarios published: {}", self.published.published)?;
        if self.published.absent_values > 0 {
            writeln!(f, "Absent values:       {}", self.published.absent_values)?;
        }
        writeln!(f, "Results published:   {}", self.results_published())?;
        writeln!(f, "Scenarios dropped:   {}", self.evaluation_failures())?;

        let s = &self.snapshot;
        writeln!(f, "\n=== Results ===")?;
        writeln!(f, "Stored:     {} ({} with a value)", s.total, s.count)?;
        writeln!(f, "Duplicates: {}", s.duplicates)?;
        writeln!(f, "Mean:       {}", opt(s.mean))?;
        writeln!(f, "Std dev:    {}", opt(s.std_dev))?;
        writeln!(f, "Min:        {}", opt(s.min))?;
        writeln!(f, "Max:        {}", opt(s.max))?;

        if let Some(histogram) = &s.histogram {
            let peak = histogram.counts.iter().copied().max().unwrap_or(0).max(1);
            writeln!(f, "\n=== Histogram ===")?;
            for (edge, count) in histogram.bins() {
                let bar = "#".repeat((count * 40 / peak) as usize);
                writeln!(f, "{edge:>14.4} | {count:>7} {bar}")?;
            }
        }

        writeln!(f, "\n=== Workers ===")?;
        for worker in &self.workers {
            writeln!(
                f,
                "{:<24} model={:<5} processed={:<7} failed={:<5} redelivered={}",
                worker.worker_id.as_str(),
                worker.model_loaded,
                worker.stats.processed,
                worker.stats.evaluation_failures + worker.stats.malformed,
                worker.stats.redelivered
            )?;
        }
        if let Some(skew) = self.scenario_skew() {
            writeln!(f, "Scenario delivery skew: {skew}")?;
        }

        writeln!(f, "\n=== Broker ===")?;
        write!(f, "{}", self.broker)
    }
}
