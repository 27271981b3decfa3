use std::time::Duration;

/// Configuration for [`ResultAggregator`](crate::ResultAggregator).
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Cadence at which snapshots are sent to the renderer.
    pub snapshot_interval: Duration,

    /// Replace an earlier result for the same scenario instead of appending.
    /// Off by default: redelivered scenarios then count twice.
    pub dedup: bool,

    pub histogram_bins: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            snapshot_interval: Duration::from_secs(1),
            dedup: false,
            histogram_bins: 50,
        }
    }
}
