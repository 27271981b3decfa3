//! Metrics facade for distributed Monte Carlo runs.
//!
//! Provides a [`MetricsRecorder`] trait with domain-specific methods and default
//! no-op implementations. A global singleton recorder backs the convenience free
//! functions, which delegate to it.
//!
//! # Usage
//!
//! Callers record metrics via free functions:
//! ```ignore
//! montecarlo_metrics::record_scenario_published();
//! montecarlo_metrics::record_evaluation_latency(latency_secs);
//! ```
//!
//! At startup, install a backend:
//! ```ignore
//! montecarlo_metrics_prometheus::install()?;
//! ```
//!
//! Without an installed backend every call is a no-op.

use std::sync::OnceLock;

// ═══════════════════════════════════════════════════════════════════════
// Trait
// ═══════════════════════════════════════════════════════════════════════

/// Domain-specific metrics recording trait.
///
/// All methods have default no-op implementations so backends only need
/// to override the metrics they care about.
#[allow(unused_variables)]
pub trait MetricsRecorder: Send + Sync + 'static {
    // ── Publisher ────────────────────────────────────────────────────

    /// Record a model published.
    fn record_model_published(&self) {}

    /// Record a scenario published.
    fn record_scenario_published(&self) {}

    /// Record a variable whose sample could not be drawn.
    fn record_sampling_failure(&self) {}

    // ── Worker ───────────────────────────────────────────────────────

    /// Record one attempt to pull the model.
    fn record_model_poll(&self, found: bool) {}

    /// Record a model loaded by a worker.
    fn record_model_loaded(&self) {}

    /// Record formula evaluation latency.
    fn record_evaluation_latency(&self, latency_secs: f64) {}

    /// Record a scenario dropped because evaluation failed.
    fn record_evaluation_failure(&self, reason: &str) {}

    /// Record a result published.
    fn record_result_published(&self) {}

    /// Record a delivery flagged as redelivered by the broker.
    fn record_redelivery(&self) {}

    /// Record a message body that could not be decoded.
    fn record_malformed_message(&self, message_type: &str) {}

    // ── Aggregator ───────────────────────────────────────────────────

    /// Record a result appended to the store.
    fn record_result_aggregated(&self) {}

    /// Record a result whose scenario was already in the store.
    fn record_duplicate_result(&self) {}

    /// Set the result store size gauge.
    fn set_store_size(&self, size: usize) {}

    // ── Broker ───────────────────────────────────────────────────────

    /// Set a queue's ready-message depth gauge.
    fn set_queue_depth(&self, queue: &str, depth: usize) {}

    /// Set a queue's unacknowledged-message gauge.
    fn set_queue_unacked(&self, queue: &str, unacked: usize) {}
}

// ═══════════════════════════════════════════════════════════════════════
// Global singleton
// ═══════════════════════════════════════════════════════════════════════

struct NoopRecorder;
impl MetricsRecorder for NoopRecorder {}

static RECORDER: OnceLock<Box<dyn MetricsRecorder>> = OnceLock::new();

/// Install a global metrics recorder.
///
/// Can only be called once. Subsequent calls are silently ignored.
pub fn set_global_recorder(recorder: Box<dyn MetricsRecorder>) {
    let _ = RECORDER.set(recorder);
}

/// Get the global metrics recorder.
///
/// Returns a no-op recorder if none has been installed.
#[inline]
fn recorder() -> &'static dyn MetricsRecorder {
    RECORDER.get().map(|r| r.as_ref()).unwrap_or(&NoopRecorder)
}

// ═══════════════════════════════════════════════════════════════════════
// Convenience free functions
// ═══════════════════════════════════════════════════════════════════════

// ── Publisher ────────────────────────────────────────────────────────

/// Record a model published.
#[inline]
pub fn record_model_published() {
    recorder().record_model_published();
}

/// Record a scenario published.
#[inline]
pub fn record_scenario_published() {
    recorder().record_scenario_published();
}

/// Record a variable whose sample could not be drawn.
#[inline]
pub fn record_sampling_failure() {
    recorder().record_sampling_failure();
}

// ── Worker ───────────────────────────────────────────────────────────

/// Record one attempt to pull the model.
#[inline]
pub fn record_model_poll(found: bool) {
    recorder().record_model_poll(found);
}

/// Record a model loaded by a worker.
#[inline]
pub fn record_model_loaded() {
    recorder().record_model_loaded();
}

/// Record formula evaluation latency.
#[inline]
pub fn record_evaluation_latency(latency_secs: f64) {
    recorder().record_evaluation_latency(latency_secs);
}

/// Record a scenario dropped because evaluation failed.
#[inline]
pub fn record_evaluation_failure(reason: &str) {
    recorder().record_evaluation_failure(reason);
}

/// Record a result published.
#[inline]
pub fn record_result_published() {
    recorder().record_result_published();
}

/// Record a delivery flagged as redelivered by the broker.
#[inline]
pub fn record_redelivery() {
    recorder().record_redelivery();
}

/// Record a message body that could not be decoded.
#[inline]
pub fn record_malformed_message(message_type: &str) {
    recorder().record_malformed_message(message_type);
}

// ── Aggregator ───────────────────────────────────────────────────────

/// Record a result appended to the store.
#[inline]
pub fn record_result_aggregated() {
    recorder().record_result_aggregated();
}

/// Record a result whose scenario was already in the store.
#[inline]
pub fn record_duplicate_result() {
    recorder().record_duplicate_result();
}

/// Set the result store size gauge.
#[inline]
pub fn set_store_size(size: usize) {
    recorder().set_store_size(size);
}

// ── Broker ───────────────────────────────────────────────────────────

/// Set a queue's ready-message depth gauge.
#[inline]
pub fn set_queue_depth(queue: &str, depth: usize) {
    recorder().set_queue_depth(queue, depth);
}

/// Set a queue's unacknowledged-message gauge.
#[inline]
pub fn set_queue_unacked(queue: &str, unacked: usize) {
    recorder().set_queue_unacked(queue, unacked);
}
