//! Result storage.

use crate::snapshot::ResultSnapshot;
use montecarlo_types::{ResultRecord, ScenarioId};
use std::collections::HashMap;

/// What [`ResultStore::insert`] did with a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Appended,
    /// Appended although its scenario was already stored.
    AppendedDuplicate,
    /// Replaced the earlier record for the same scenario.
    Replaced,
}

/// Ordered result collection, owned by the aggregator's consuming loop.
///
/// Grows for the life of the aggregator; nothing is evicted.
#[derive(Debug, Default)]
pub struct ResultStore {
    records: Vec<ResultRecord>,
    /// Position of the latest record per scenario.
    by_scenario: HashMap<ScenarioId, usize>,
    dedup: bool,
    duplicates: u64,
}

impl ResultStore {
    pub fn new(dedup: bool) -> Self {
        Self {
            dedup,
            ..Self::default()
        }
    }

    pub fn insert(&mut self, record: ResultRecord) -> InsertOutcome {
        let scenario = record.scenario_id;
        match self.by_scenario.get(&scenario).copied() {
            Some(index) if self.dedup => {
                self.duplicates += 1;
                self.records[index] = record;
                InsertOutcome::Replaced
            }
            previous => {
                if previous.is_some() {
                    self.duplicates += 1;
                }
                self.by_scenario.insert(scenario, self.records.len());
                self.records.push(record);
                if previous.is_some() {
                    InsertOutcome::AppendedDuplicate
                } else {
                    InsertOutcome::Appended
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in arrival order.
    pub fn records(&self) -> &[ResultRecord] {
        &self.records
    }

    /// Results received for an already stored scenario.
    pub fn duplicates(&self) -> u64 {
        self.duplicates
    }

    pub fn snapshot(&self, histogram_bins: usize) -> ResultSnapshot {
        ResultSnapshot::from_records(&self.records, self.duplicates, histogram_bins)
    }
}
