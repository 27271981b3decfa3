//! Sampled scenarios.

use crate::identifiers::ScenarioId;
use crate::message::ScenarioMessage;
use indexmap::IndexMap;

/// One sampled assignment of values to the model's variables.
///
/// A `None` value marks a variable whose sample could not be drawn; the
/// scenario is still published so the run is not aborted.
#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    pub id: ScenarioId,
    pub variables: IndexMap<String, Option<f64>>,
}

impl Scenario {
    pub fn new(id: ScenarioId) -> Self {
        Self {
            id,
            variables: IndexMap::new(),
        }
    }

    pub fn with_value(mut self, name: impl Into<String>, value: Option<f64>) -> Self {
        self.variables.insert(name.into(), value);
        self
    }

    /// Variables that carry a value.
    pub fn bindings(&self) -> impl Iterator<Item = (&str, f64)> {
        self.variables
            .iter()
            .filter_map(|(name, value)| value.map(|v| (name.as_str(), v)))
    }

    /// Names of variables whose sample is absent.
    pub fn absent(&self) -> impl Iterator<Item = &str> {
        self.variables
            .iter()
            .filter(|(_, value)| value.is_none())
            .map(|(name, _)| name.as_str())
    }

    pub fn to_message(&self) -> ScenarioMessage {
        ScenarioMessage {
            variables: self.variables.clone(),
            id: self.id,
        }
    }
}

impl From<ScenarioMessage> for Scenario {
    fn from(message: ScenarioMessage) -> Self {
        Self {
            id: message.id,
            variables: message.variables,
        }
    }
}
