//! Identifier newtypes.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Scenario identifier.
///
/// Assigned by a single generation pass as the contiguous sequence `1..=N`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScenarioId(pub u64);

impl ScenarioId {
    /// The first id of a generation pass.
    pub const FIRST: ScenarioId = ScenarioId(1);

    /// Get the raw value.
    pub fn get(self) -> u64 {
        self.0
    }

    /// The id following this one.
    pub fn next(self) -> ScenarioId {
        ScenarioId(self.0 + 1)
    }
}

impl fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identity of a worker process.
///
/// Serialized as a plain string. Numeric ids (process ids emitted by other
/// producers) are accepted on decode and stored in their decimal form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct WorkerId(String);

impl WorkerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Default id for the `index`-th worker started by this process.
    pub fn for_process(index: usize) -> Self {
        Self(format!("worker-{}-{}", std::process::id(), index))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for WorkerId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(u64),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(s) => WorkerId(s),
            Raw::Number(n) => WorkerId(n.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scenario_id_sequence() {
        let first = ScenarioId::FIRST;
        assert_eq!(first.get(), 1);
        assert_eq!(first.next(), ScenarioId(2));
        assert_eq!(first.to_string(), "#1");
    }

    #[test]
    fn test_worker_id_accepts_numeric_pid() {
        let id: WorkerId = serde_json::from_str("4242").unwrap();
        assert_eq!(id.as_str(), "4242");

        let id: WorkerId = serde_json::from_str("\"w-1\"").unwrap();
        assert_eq!(id, WorkerId::new("w-1"));
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"w-1\"");
    }

    #[test]
    fn test_worker_id_for_process_is_unique_per_index() {
        assert_ne!(WorkerId::for_process(0), WorkerId::for_process(1));
    }
}
