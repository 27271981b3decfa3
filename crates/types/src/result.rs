//! Formula results.

use crate::identifiers::{ScenarioId, WorkerId};
use crate::message::ResultMessage;

/// The formula output for one scenario, tagged with the producing worker.
///
/// `(worker_id, scenario_id)` identifies a result. Under crash redelivery the
/// same scenario may be evaluated twice, possibly by different workers.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRecord {
    pub worker_id: WorkerId,
    pub scenario_id: ScenarioId,
    pub value: Option<f64>,
}

impl ResultRecord {
    pub fn new(worker_id: WorkerId, scenario_id: ScenarioId, value: Option<f64>) -> Self {
        Self {
            worker_id,
            scenario_id,
            value,
        }
    }

    pub fn key(&self) -> (&WorkerId, ScenarioId) {
        (&self.worker_id, self.scenario_id)
    }

    pub fn to_message(&self) -> ResultMessage {
        ResultMessage {
            worker_id: self.worker_id.clone(),
            scenario_id: self.scenario_id,
            result: self.value,
        }
    }
}

impl From<ResultMessage> for ResultRecord {
    fn from(message: ResultMessage) -> Self {
        Self {
            worker_id: message.worker_id,
            scenario_id: message.scenario_id,
            value: message.result,
        }
    }
}
