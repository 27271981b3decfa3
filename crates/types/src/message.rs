//! Wire messages carried by the three queues.
//!
//! Bodies are JSON with fixed field names so that any producer or consumer
//! speaking the same format can join a run.

use crate::identifiers::{ScenarioId, WorkerId};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Queue holding the model in shared-queue delivery mode.
pub const MODEL_QUEUE: &str = "modelQueue";

/// Fan-out exchange carrying the model in broadcast delivery mode.
pub const MODEL_EXCHANGE: &str = "modelExchange";

/// Queue of scenarios awaiting evaluation (competing consumers).
pub const SCENARIO_QUEUE: &str = "scenarioQueue";

/// Queue of results awaiting aggregation.
pub const RESULT_QUEUE: &str = "resultQueue";

/// Retention window of a published model.
pub const MODEL_TTL: Duration = Duration::from_millis(600_000);

/// Marker trait for queue messages.
///
/// All bodies published to or consumed from the broker implement this trait.
pub trait QueueMessage: Serialize + DeserializeOwned + Send + Sync {
    /// Unique message type identifier, used in logs and metrics.
    fn message_type_id() -> &'static str
    where
        Self: Sized;
}

/// Model message: `{"FUNCTION": "...", "DISTRIBUTIONS": {"x": "uniform(min=0,max=1)"}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMessage {
    #[serde(rename = "FUNCTION")]
    pub function: String,
    #[serde(rename = "DISTRIBUTIONS")]
    pub distributions: IndexMap<String, String>,
}

impl QueueMessage for ModelMessage {
    fn message_type_id() -> &'static str {
        "model"
    }
}

/// Scenario message: variable values flattened next to the `id` key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioMessage {
    #[serde(flatten)]
    pub variables: IndexMap<String, Option<f64>>,
    pub id: ScenarioId,
}

impl QueueMessage for ScenarioMessage {
    fn message_type_id() -> &'static str {
        "scenario"
    }
}

/// Result message: `{"worker_id": "...", "scenario_id": 1, "result": 0.42}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultMessage {
    pub worker_id: WorkerId,
    pub scenario_id: ScenarioId,
    pub result: Option<f64>,
}

impl QueueMessage for ResultMessage {
    fn message_type_id() -> &'static str {
        "result"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_model_message_field_names() {
        let mut distributions = IndexMap::new();
        distributions.insert("x".to_string(), "uniform(min=0,max=1)".to_string());
        let message = ModelMessage {
            function: "x + 1".into(),
            distributions,
        };
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(
            value,
            json!({"FUNCTION": "x + 1", "DISTRIBUTIONS": {"x": "uniform(min=0,max=1)"}})
        );
    }

    #[test]
    fn test_scenario_message_is_flat() {
        let body = r#"{"x": 0.25, "k": 3, "y": null, "id": 12}"#;
        let message: ScenarioMessage = serde_json::from_str(body).unwrap();
        assert_eq!(message.id, ScenarioId(12));
        assert_eq!(message.variables.len(), 3);
        assert_eq!(message.variables["x"], Some(0.25));
        assert_eq!(message.variables["k"], Some(3.0));
        assert_eq!(message.variables["y"], None);

        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["id"], json!(12));
        assert_eq!(value["y"], json!(null));
    }

    #[test]
    fn test_result_message_field_names() {
        let message = ResultMessage {
            worker_id: WorkerId::new("w1"),
            scenario_id: ScenarioId(3),
            result: Some(1.5),
        };
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(
            value,
            json!({"worker_id": "w1", "scenario_id": 3, "result": 1.5})
        );

        let decoded: ResultMessage =
            serde_json::from_str(r#"{"worker_id": 991, "scenario_id": 4, "result": null}"#)
                .unwrap();
        assert_eq!(decoded.worker_id.as_str(), "991");
        assert_eq!(decoded.result, None);
    }
}
