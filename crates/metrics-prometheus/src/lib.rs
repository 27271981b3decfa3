//! Prometheus metrics backend for Monte Carlo runs.
//!
//! Implements [`montecarlo_metrics::MetricsRecorder`] using native Prometheus
//! counters, gauges, and histograms.
//!
//! # Usage
//!
//! Call [`install()`] once at startup before any metrics are recorded:
//! ```ignore
//! montecarlo_metrics_prometheus::install()?;
//! ```

use montecarlo_metrics::MetricsRecorder;
use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_gauge_vec,
    register_histogram, Counter, CounterVec, Gauge, GaugeVec, Histogram,
};
use std::sync::OnceLock;

/// Domain-specific Prometheus metrics.
pub struct Metrics {
    // === Publisher ===
    pub models_published: Counter,
    pub scenarios_published: Counter,
    pub sampling_failures: Counter,

    // === Worker ===
    pub model_polls: CounterVec,
    pub models_loaded: Counter,
    pub evaluation_latency: Histogram,
    pub evaluation_failures: CounterVec,
    pub results_published: Counter,
    pub redeliveries: Counter,
    pub malformed_messages: CounterVec,

    // === Aggregator ===
    pub results_aggregated: Counter,
    pub duplicate_results: Counter,
    pub store_size: Gauge,

    // === Broker ===
    pub queue_depth: GaugeVec,
    pub queue_unacked: GaugeVec,
}

impl Metrics {
    fn new() -> prometheus::Result<Self> {
        let latency_buckets = vec![
            0.000_001, 0.000_005, 0.000_01, 0.000_05, 0.000_1, 0.000_5, 0.001, 0.005, 0.01, 0.05,
            0.1, 0.5, 1.0,
        ];

        Ok(Self {
            // Publisher
            models_published: register_counter!(
                "montecarlo_models_published_total",
                "Total number of models published"
            )?,
            scenarios_published: register_counter!(
                "montecarlo_scenarios_published_total",
                "Total number of scenarios published"
            )?,
            sampling_failures: register_counter!(
                "montecarlo_sampling_failures_total",
                "Variables recorded as absent because sampling failed"
            )?,

            // Worker
            model_polls: register_counter_vec!(
                "montecarlo_model_polls_total",
                "Model pull attempts by outcome",
                &["outcome"]
            )?,
            models_loaded: register_counter!(
                "montecarlo_models_loaded_total",
                "Models loaded by workers"
            )?,
            evaluation_latency: register_histogram!(
                "montecarlo_evaluation_latency_seconds",
                "Formula evaluation latency",
                latency_buckets
            )?,
            evaluation_failures: register_counter_vec!(
                "montecarlo_evaluation_failures_total",
                "Scenarios dropped because evaluation failed",
                &["reason"]
            )?,
            results_published: register_counter!(
                "montecarlo_results_published_total",
                "Results published by workers"
            )?,
            redeliveries: register_counter!(
                "montecarlo_redeliveries_total",
                "Deliveries flagged as redelivered"
            )?,
            malformed_messages: register_counter_vec!(
                "montecarlo_malformed_messages_total",
                "Message bodies that failed to decode",
                &["message_type"]
            )?,

            // Aggregator
            results_aggregated: register_counter!(
                "montecarlo_results_aggregated_total",
                "Results appended to the store"
            )?,
            duplicate_results: register_counter!(
                "montecarlo_duplicate_results_total",
                "Results for a scenario already in the store"
            )?,
            store_size: register_gauge!("montecarlo_store_size", "Results held by the store")?,

            // Broker
            queue_depth: register_gauge_vec!(
                "montecarlo_queue_depth",
                "Ready messages per queue",
                &["queue"]
            )?,
            queue_unacked: register_gauge_vec!(
                "montecarlo_queue_unacked",
                "Unacknowledged messages per queue",
                &["queue"]
            )?,
        })
    }
}

/// Prometheus-backed recorder.
pub struct PrometheusRecorder {
    metrics: Metrics,
}

impl PrometheusRecorder {
    pub fn new() -> prometheus::Result<Self> {
        Ok(Self {
            metrics: Metrics::new()?,
        })
    }
}

impl MetricsRecorder for PrometheusRecorder {
    // ── Publisher ────────────────────────────────────────────────────

    fn record_model_published(&self) {
        self.metrics.models_published.inc();
    }

    fn record_scenario_published(&self) {
        self.metrics.scenarios_published.inc();
    }

    fn record_sampling_failure(&self) {
        self.metrics.sampling_failures.inc();
    }

    // ── Worker ───────────────────────────────────────────────────────

    fn record_model_poll(&self, found: bool) {
        let outcome = if found { "found" } else { "empty" };
        self.metrics.model_polls.with_label_values(&[outcome]).inc();
    }

    fn record_model_loaded(&self) {
        self.metrics.models_loaded.inc();
    }

    fn record_evaluation_latency(&self, latency_secs: f64) {
        self.metrics.evaluation_latency.observe(latency_secs);
    }

    fn record_evaluation_failure(&self, reason: &str) {
        self.metrics
            .evaluation_failures
            .with_label_values(&[reason])
            .inc();
    }

    fn record_result_published(&self) {
        self.metrics.results_published.inc();
    }

    fn record_redelivery(&self) {
        self.metrics.redeliveries.inc();
    }

    fn record_malformed_message(&self, message_type: &str) {
        self.metrics
            .malformed_messages
            .with_label_values(&[message_type])
            .inc();
    }

    // ── Aggregator ───────────────────────────────────────────────────

    fn record_result_aggregated(&self) {
        self.metrics.results_aggregated.inc();
    }

    fn record_duplicate_result(&self) {
        self.metrics.duplicate_results.inc();
    }

    fn set_store_size(&self, size: usize) {
        self.metrics.store_size.set(size as f64);
    }

    // ── Broker ───────────────────────────────────────────────────────

    fn set_queue_depth(&self, queue: &str, depth: usize) {
        self.metrics
            .queue_depth
            .with_label_values(&[queue])
            .set(depth as f64);
    }

    fn set_queue_unacked(&self, queue: &str, unacked: usize) {
        self.metrics
            .queue_unacked
            .with_label_values(&[queue])
            .set(unacked as f64);
    }
}

/// Install the Prometheus recorder as the global metrics backend.
///
/// Registration happens once; later calls return the first outcome.
pub fn install() -> Result<(), String> {
    static INSTALLED: OnceLock<Result<(), String>> = OnceLock::new();
    INSTALLED
        .get_or_init(|| {
            let recorder = PrometheusRecorder::new().map_err(|e| format!("{e}"))?;
            montecarlo_metrics::set_global_recorder(Box::new(recorder));
            Ok(())
        })
        .clone()
}

/// Gather and encode all registered Prometheus metrics as text format.
///
/// Returns `(content_type, encoded_body)`.
pub fn encode_metrics() -> Result<(String, Vec<u8>), String> {
    use prometheus::{Encoder, TextEncoder};
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let content_type = encoder.format_type().to_string();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| format!("{e}"))?;
    Ok((content_type, buffer))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_then_encode() {
        install().unwrap();
        // Idempotent.
        install().unwrap();

        montecarlo_metrics::record_scenario_published();
        montecarlo_metrics::record_evaluation_failure("domain");
        montecarlo_metrics::set_queue_depth("scenarioQueue", 3);

        let (content_type, body) = encode_metrics().unwrap();
        assert!(content_type.starts_with("text/plain"));
        let text = String::from_utf8(body).unwrap();
        assert!(text.contains("montecarlo_scenarios_published_total"));
        assert!(text.contains("montecarlo_evaluation_failures_total{reason=\"domain\"}"));
        assert!(text.contains("montecarlo_queue_depth{queue=\"scenarioQueue\"} 3"));
    }
}
