//! Message body encoding.
//!
//! Bodies are UTF-8 JSON. The message type is known from the queue a body
//! arrives on, so it is not carried in the body.

use montecarlo_types::QueueMessage;
use thiserror::Error;

/// Errors that can occur during message encoding/decoding.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Failed to encode {message_type} message: {reason}")]
    Encode {
        message_type: &'static str,
        reason: String,
    },

    #[error("Failed to decode {message_type} message: {reason}")]
    Decode {
        message_type: &'static str,
        reason: String,
    },
}

impl CodecError {
    /// The message type the failing body was meant to carry.
    pub fn message_type(&self) -> &'static str {
        match self {
            Self::Encode { message_type, .. } | Self::Decode { message_type, .. } => message_type,
        }
    }
}

/// Encode a queue message to its JSON body.
pub fn encode_message<M: QueueMessage>(message: &M) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(message).map_err(|e| CodecError::Encode {
        message_type: M::message_type_id(),
        reason: e.to_string(),
    })
}

/// Decode a JSON body into a queue message.
pub fn decode_message<M: QueueMessage>(body: &[u8]) -> Result<M, CodecError> {
    serde_json::from_slice(body).map_err(|e| CodecError::Decode {
        message_type: M::message_type_id(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use montecarlo_types::{ResultMessage, ScenarioId, ScenarioMessage, WorkerId};

    #[test]
    fn test_scenario_body_is_flat_json() {
        let mut message = ScenarioMessage {
            variables: Default::default(),
            id: ScenarioId(7),
        };
        message.variables.insert("x".into(), Some(0.5));
        message.variables.insert("y".into(), None);

        let body = encode_message(&message).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json, serde_json::json!({"x": 0.5, "y": null, "id": 7}));
    }

    #[test]
    fn test_decode_result_from_foreign_producer() {
        let body = br#"{"worker_id": "w-1", "scenario_id": 3, "result": 1.25}"#;
        let message: ResultMessage = decode_message(body).unwrap();
        assert_eq!(message.worker_id, WorkerId::new("w-1"));
        assert_eq!(message.scenario_id, ScenarioId(3));
        assert_eq!(message.result, Some(1.25));
    }

    #[test]
    fn test_decode_garbage_names_message_type() {
        let err = decode_message::<ResultMessage>(b"not json").unwrap_err();
        assert_eq!(err.message_type(), "result");
        assert!(err.to_string().starts_with("Failed to decode result message"));
    }
}
