//! Delivery statistics.

use montecarlo_broker::ConsumerTag;
use std::collections::BTreeMap;
use std::fmt;

/// Counters for one queue over the broker's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Messages routed into the queue.
    pub published: u64,
    /// Deliveries handed out, by push or pull.
    pub delivered: u64,
    pub acked: u64,
    pub rejected: u64,
    /// Deliveries carrying the redelivered flag.
    pub redelivered: u64,
    /// Messages discarded after their expiration passed.
    pub expired: u64,
}

/// Counters for one consumer subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerStats {
    pub tag: ConsumerTag,
    pub queue: String,
    pub delivered: u64,
    /// Highest number of unacknowledged deliveries its channel held right
    /// after a push to this consumer.
    pub peak_unacked: usize,
}

/// Snapshot of broker statistics.
#[derive(Debug, Clone, Default)]
pub struct BrokerStats {
    pub queues: BTreeMap<String, QueueStats>,
    /// In subscription order.
    pub consumers: Vec<ConsumerStats>,
    /// Messages that matched no queue.
    pub unroutable: u64,
    pub restarts: u64,
}

impl BrokerStats {
    pub fn queue(&self, name: &str) -> QueueStats {
        self.queues.get(name).copied().unwrap_or_default()
    }

    pub fn consumers_of<'a>(&'a self, queue: &'a str) -> impl Iterator<Item = &'a ConsumerStats> {
        self.consumers.iter().filter(move |c| c.queue == queue)
    }

    /// Difference between the busiest and idlest consumer of a queue.
    pub fn delivery_skew(&self, queue: &str) -> Option<u64> {
        let counts: Vec<u64> = self.consumers_of(queue).map(|c| c.delivered).collect();
        let max = counts.iter().max()?;
        let min = counts.iter().min()?;
        Some(max - min)
    }
}

impl fmt::Display for BrokerStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:<32} {:>10} {:>10} {:>10} {:>8} {:>11} {:>8}",
            "Queue", "Published", "Delivered", "Acked", "Rejected", "Redelivered", "Expired"
        )?;
        for (name, q) in &self.queues {
            writeln!(
                f,
                "{:<32} {:>10} {:>10} {:>10} {:>8} {:>11} {:>8}",
                name, q.published, q.delivered, q.acked, q.rejected, q.redelivered, q.expired
            )?;
        }
        if !self.consumers.is_empty() {
            writeln!(f)?;
            writeln!(
                f,
                "{:<20} {:<32} {:>10} {:>12}",
                "Consumer", "Queue", "Delivered", "Peak unacked"
            )?;
            for c in &self.consumers {
                writeln!(
                    f,
                    "{:<20} {:<32} {:>10} {:>12}",
                    c.tag.0, c.queue, c.delivered, c.peak_unacked
                )?;
            }
        }
        if self.unroutable > 0 {
            writeln!(f, "\nUnroutable messages: {}", self.unroutable)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn consumer(tag: &str, queue: &str, delivered: u64) -> ConsumerStats {
        ConsumerStats {
            tag: ConsumerTag(tag.into()),
            queue: queue.into(),
            delivered,
            peak_unacked: 1,
        }
    }

    #[test]
    fn test_delivery_skew_per_queue() {
        let stats = BrokerStats {
            consumers: vec![
                consumer("a", "scenarioQueue", 34),
                consumer("b", "scenarioQueue", 33),
                consumer("c", "scenarioQueue", 33),
                consumer("d", "resultQueue", 100),
            ],
            ..Default::default()
        };
        assert_eq!(stats.delivery_skew("scenarioQueue"), Some(1));
        assert_eq!(stats.delivery_skew("resultQueue"), Some(0));
        assert_eq!(stats.delivery_skew("modelQueue"), None);
    }

    #[test]
    fn test_report_lists_queues() {
        let mut stats = BrokerStats::default();
        stats.queues.insert(
            "scenarioQueue".into(),
            QueueStats {
                published: 10,
                delivered: 10,
                acked: 10,
                ..Default::default()
            },
        );
        let report = stats.to_string();
        assert!(report.contains("scenarioQueue"));
        assert!(report.lines().count() >= 2);
    }
}
