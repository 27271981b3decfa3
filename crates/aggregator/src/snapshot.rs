//! Point-in-time statistics over the result store.

use montecarlo_types::{ResultRecord, WorkerId};
use std::collections::HashMap;

/// Equal-width histogram of result values.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    /// Lower edge of the first bin.
    pub low: f64,
    /// Upper edge of the last bin, which is closed.
    pub high: f64,
    pub counts: Vec<u64>,
}

impl Histogram {
    /// Bin `values` into `bins` equal-width bins spanning their range.
    ///
    /// When all values are equal the range is widened by half a unit on each
    /// side. Returns `None` for no values or zero bins.
    pub fn build(values: &[f64], bins: usize) -> Option<Self> {
        if values.is_empty() || bins == 0 {
            return None;
        }
        let (mut low, mut high) = values
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        if low == high {
            low -= 0.5;
            high += 0.5;
        }

        let width = (high - low) / bins as f64;
        let mut counts = vec![0u64; bins];
        for &value in values {
            let index = (((value - low) / width) as usize).min(bins - 1);
            counts[index] += 1;
        }
        Some(Self { low, high, counts })
    }

    pub fn bin_width(&self) -> f64 {
        (self.high - self.low) / self.counts.len() as f64
    }

    /// `(lower_edge, count)` per bin.
    pub fn bins(&self) -> impl Iterator<Item = (f64, u64)> + '_ {
        let width = self.bin_width();
        self.counts
            .iter()
            .enumerate()
            .map(move |(i, &count)| (self.low + width * i as f64, count))
    }
}

/// Immutable view handed to the renderer.
///
/// Records without a value are counted in `total` and in the per-worker
/// counts but excluded from every value statistic.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResultSnapshot {
    /// Records in the store.
    pub total: usize,
    /// Records with a value.
    pub count: usize,
    pub mean: Option<f64>,
    /// Sample standard deviation (n - 1 denominator).
    pub std_dev: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub histogram: Option<Histogram>,
    /// Records per worker, busiest first.
    pub per_worker: Vec<(WorkerId, u64)>,
    pub duplicates: u64,
}

impl ResultSnapshot {
    pub fn from_records(records: &[ResultRecord], duplicates: u64, histogram_bins: usize) -> Self {
        let values: Vec<f64> = records.iter().filter_map(|r| r.value).collect();
        let count = values.len();

        let mean = (count > 0).then(|| values.iter().sum::<f64>() / count as f64);
        let std_dev = match mean {
            Some(mean) if count > 1 => {
                let sum_sq: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
                Some((sum_sq / (count - 1) as f64).sqrt())
            }
            _ => None,
        };
        let min = values.iter().copied().reduce(f64::min);
        let max = values.iter().copied().reduce(f64::max);

        let mut by_worker: HashMap<&WorkerId, u64> = HashMap::new();
        for record in records {
            *by_worker.entry(&record.worker_id).or_default() += 1;
        }
        let mut per_worker: Vec<(WorkerId, u64)> = by_worker
            .into_iter()
            .map(|(id, n)| (id.clone(), n))
            .collect();
        per_worker.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        Self {
            total: records.len(),
            count,
            mean,
            std_dev,
            min,
            max,
            histogram: Histogram::build(&values, histogram_bins),
            per_worker,
            duplicates,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}
