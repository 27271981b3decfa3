//! Worker state machine.

use crate::config::WorkerConfig;
use crate::error::{EvaluationError, WorkerError};
use crossbeam::channel::{Receiver, RecvTimeoutError};
use montecarlo_broker::{
    decode_message, declare_model_exchange, declare_work_queues, worker_model_queue, Broker,
    BrokerError, Channel, Delivery, MessageProperties, ModelDelivery, QueueOptions,
    DEFAULT_EXCHANGE,
};
use montecarlo_expr::{ExprError, Formula};
use montecarlo_metrics as metrics;
use montecarlo_types::{
    Model, ModelMessage, ResultRecord, Scenario, ScenarioMessage, WorkerId, MODEL_EXCHANGE,
    MODEL_QUEUE, RESULT_QUEUE, SCENARIO_QUEUE,
};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Lifecycle of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Bootstrapping,
    AwaitingModel,
    Ready,
    Consuming,
    Stopped,
}

/// Why a worker left its loop without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Shutdown was signalled.
    Shutdown,
    /// `max_scenarios` deliveries were processed.
    ScenarioLimit,
}

/// Counters for one worker's run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Deliveries handled and acknowledged.
    pub processed: u64,
    pub results_published: u64,
    pub evaluation_failures: u64,
    pub malformed: u64,
    pub redelivered: u64,
    pub model_polls: u64,
}

/// Summary returned by [`WorkerRuntime::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerReport {
    pub worker_id: WorkerId,
    pub stop_reason: StopReason,
    /// False when shutdown arrived before a model did.
    pub model_loaded: bool,
    pub stats: WorkerStats,
}

/// The model as loaded by a worker.
///
/// The formula is parsed once at load. A formula that does not parse still
/// counts as a loaded model; every scenario then fails to evaluate.
struct LoadedModel {
    model: Model,
    formula: Result<Formula, ExprError>,
}

/// Per-process worker pipeline over one broker channel.
pub struct WorkerRuntime<B: Broker> {
    broker: B,
    config: WorkerConfig,
    state: WorkerState,
    channel: Option<B::Channel>,
    model: Option<LoadedModel>,
    stats: WorkerStats,
}

impl<B: Broker> WorkerRuntime<B> {
    pub fn new(broker: B, config: WorkerConfig) -> Self {
        Self {
            broker,
            config,
            state: WorkerState::Bootstrapping,
            channel: None,
            model: None,
            stats: WorkerStats::default(),
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn worker_id(&self) -> &WorkerId {
        &self.config.worker_id
    }

    pub fn model(&self) -> Option<&Model> {
        self.model.as_ref().map(|m| &m.model)
    }

    pub fn stats(&self) -> WorkerStats {
        self.stats
    }

    fn expect_state(&self, expected: WorkerState) -> Result<(), WorkerError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(WorkerError::InvalidState {
                expected,
                actual: self.state,
            })
        }
    }

    fn channel(&self) -> Result<&B::Channel, WorkerError> {
        self.channel
            .as_ref()
            .ok_or(WorkerError::Broker(BrokerError::ChannelClosed))
    }

    fn model_queue(&self) -> String {
        match self.config.model_delivery {
            ModelDelivery::Broadcast => worker_model_queue(&self.config.worker_id),
            ModelDelivery::SharedQueue => MODEL_QUEUE.to_string(),
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Run
    // ═══════════════════════════════════════════════════════════════════

    /// Drive the worker from bootstrap to stop.
    ///
    /// Blocks the calling thread. A message on (or disconnection of)
    /// `shutdown` stops the worker abruptly. The channel is closed on every
    /// exit path.
    pub fn run(&mut self, shutdown: &Receiver<()>) -> Result<WorkerReport, WorkerError> {
        let outcome = self.run_inner(shutdown);
        self.stop();
        match outcome {
            Ok(stop_reason) => Ok(WorkerReport {
                worker_id: self.config.worker_id.clone(),
                stop_reason,
                model_loaded: self.model.is_some(),
                stats: self.stats,
            }),
            Err(e) => {
                error!(worker = %self.config.worker_id, error = %e, "Worker failed");
                Err(e)
            }
        }
    }

    fn run_inner(&mut self, shutdown: &Receiver<()>) -> Result<StopReason, WorkerError> {
        self.bootstrap()?;
        if !self.await_model(shutdown)? {
            return Ok(StopReason::Shutdown);
        }
        self.consume(shutdown)
    }

    /// Close the channel without draining. Unacknowledged deliveries go back
    /// to the broker for redelivery.
    pub fn stop(&mut self) {
        if let Some(channel) = self.channel.take() {
            if let Err(e) = channel.close() {
                debug!(worker = %self.config.worker_id, error = %e, "Channel close failed");
            }
        }
        if self.state != WorkerState::Stopped {
            info!(
                worker = %self.config.worker_id,
                processed = self.stats.processed,
                "Worker stopped"
            );
        }
        self.state = WorkerState::Stopped;
    }

    // ═══════════════════════════════════════════════════════════════════
    // Bootstrapping
    // ═══════════════════════════════════════════════════════════════════

    /// Open the channel, declare the durable queues and set the prefetch
    /// window. In broadcast mode also bind the worker's private model queue
    /// to the model exchange.
    pub fn bootstrap(&mut self) -> Result<(), WorkerError> {
        self.expect_state(WorkerState::Bootstrapping)?;

        let channel = self.broker.open_channel()?;
        declare_work_queues(&channel)?;
        channel.set_prefetch(self.config.prefetch)?;

        if self.config.model_delivery == ModelDelivery::Broadcast {
            let queue = worker_model_queue(&self.config.worker_id);
            declare_model_exchange(&channel)?;
            channel.declare_queue(&queue, QueueOptions::exclusive())?;
            channel.bind_queue(&queue, MODEL_EXCHANGE)?;
        }

        self.channel = Some(channel);
        self.state = WorkerState::AwaitingModel;
        info!(
            worker = %self.config.worker_id,
            prefetch = self.config.prefetch,
            delivery = %self.config.model_delivery,
            "Worker connected"
        );
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════
    // Model acquisition
    // ═══════════════════════════════════════════════════════════════════

    /// Make one non-blocking attempt to pull the model.
    ///
    /// Returns whether a model was loaded. A body that does not decode is
    /// acknowledged and discarded.
    pub fn acquire_model(&mut self) -> Result<bool, WorkerError> {
        self.expect_state(WorkerState::AwaitingModel)?;
        self.stats.model_polls += 1;
        let queue = self.model_queue();

        let delivery = match self.channel()?.get(&queue) {
            Ok(delivery) => delivery,
            // The publisher deletes and redeclares the shared queue when it
            // replaces the model.
            Err(BrokerError::QueueNotFound(_)) => None,
            Err(e) => return Err(e.into()),
        };

        let Some(delivery) = delivery else {
            metrics::record_model_poll(false);
            debug!(worker = %self.config.worker_id, queue = %queue, "No model yet");
            return Ok(false);
        };
        metrics::record_model_poll(true);

        let decoded = decode_message::<ModelMessage>(&delivery.body);
        self.channel()?.ack(delivery.tag)?;

        match decoded {
            Ok(message) => {
                self.load_model(Model::from_message(message));
                Ok(true)
            }
            Err(e) => {
                warn!(worker = %self.config.worker_id, error = %e, "Discarding malformed model");
                metrics::record_malformed_message(e.message_type());
                self.stats.malformed += 1;
                Ok(false)
            }
        }
    }

    /// Poll for the model until one arrives or shutdown is signalled.
    ///
    /// Returns `false` on shutdown.
    pub fn await_model(&mut self, shutdown: &Receiver<()>) -> Result<bool, WorkerError> {
        info!(worker = %self.config.worker_id, "Awaiting model");
        loop {
            if self.acquire_model()? {
                return Ok(true);
            }
            match shutdown.recv_timeout(self.config.model_poll_interval) {
                Err(RecvTimeoutError::Timeout) => continue,
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    info!(worker = %self.config.worker_id, "Shutdown while awaiting model");
                    return Ok(false);
                }
            }
        }
    }

    fn load_model(&mut self, model: Model) {
        let formula = Formula::parse(&model.function);
        match &formula {
            Ok(formula) => {
                let undefined = formula.undefined_variables(model.variables());
                if !undefined.is_empty() {
                    warn!(
                        worker = %self.config.worker_id,
                        variables = ?undefined,
                        "Formula references variables the model does not define"
                    );
                }
            }
            Err(e) => {
                error!(
                    worker = %self.config.worker_id,
                    function = %model.function,
                    error = %e,
                    "Model formula does not parse; every scenario will be dropped"
                );
            }
        }

        metrics::record_model_loaded();
        info!(
            worker = %self.config.worker_id,
            function = %model.function,
            variables = model.distributions.len(),
            "Model loaded"
        );
        self.model = Some(LoadedModel { model, formula });
        self.state = WorkerState::Ready;
    }

    // ═══════════════════════════════════════════════════════════════════
    // Consumption
    // ═══════════════════════════════════════════════════════════════════

    /// Consume scenarios until shutdown, the scenario limit, or a broker
    /// failure.
    pub fn consume(&mut self, shutdown: &Receiver<()>) -> Result<StopReason, WorkerError> {
        self.expect_state(WorkerState::Ready)?;
        let consumer = self.channel()?.consume(SCENARIO_QUEUE)?;
        self.state = WorkerState::Consuming;
        info!(worker = %self.config.worker_id, queue = SCENARIO_QUEUE, "Consuming scenarios");

        loop {
            if let Some(max) = self.config.max_scenarios {
                if self.stats.processed >= max {
                    info!(worker = %self.config.worker_id, max, "Scenario limit reached");
                    return Ok(StopReason::ScenarioLimit);
                }
            }

            crossbeam::channel::select! {
                recv(shutdown) -> _ => {
                    info!(worker = %self.config.worker_id, "Shutdown while consuming");
                    return Ok(StopReason::Shutdown);
                }
                recv(consumer.receiver()) -> delivery => match delivery {
                    Ok(delivery) => self.handle_delivery(delivery)?,
                    Err(_) => {
                        return Err(BrokerError::ConsumerCancelled(consumer.tag().clone()).into());
                    }
                },
            }
        }
    }

    /// Evaluate one scenario, publish its result, and acknowledge it.
    ///
    /// Evaluation failures and undecodable bodies are logged and
    /// acknowledged without a result. Only broker failures are returned.
    pub fn handle_delivery(&mut self, delivery: Delivery) -> Result<(), WorkerError> {
        if delivery.redelivered {
            metrics::record_redelivery();
            self.stats.redelivered += 1;
        }

        match decode_message::<ScenarioMessage>(&delivery.body) {
            Ok(message) => {
                let scenario = Scenario::from(message);
                debug!(
                    worker = %self.config.worker_id,
                    scenario = scenario.id.get(),
                    redelivered = delivery.redelivered,
                    "Scenario received"
                );
                self.process_scenario(&scenario)?;
            }
            Err(e) => {
                warn!(worker = %self.config.worker_id, error = %e, "Dropping malformed scenario");
                metrics::record_malformed_message(e.message_type());
                self.stats.malformed += 1;
            }
        }

        self.channel()?.ack(delivery.tag)?;
        self.stats.processed += 1;
        Ok(())
    }

    fn process_scenario(&mut self, scenario: &Scenario) -> Result<(), WorkerError> {
        let started = Instant::now();
        let outcome = self.evaluate(scenario);
        metrics::record_evaluation_latency(started.elapsed().as_secs_f64());

        match outcome {
            Ok(value) => {
                let record = ResultRecord::new(self.config.worker_id.clone(), scenario.id, Some(value));
                self.channel()?.publish_message(
                    DEFAULT_EXCHANGE,
                    RESULT_QUEUE,
                    &record.to_message(),
                    MessageProperties::persistent(),
                )?;
                metrics::record_result_published();
                self.stats.results_published += 1;
                debug!(
                    worker = %self.config.worker_id,
                    scenario = scenario.id.get(),
                    value,
                    "Result published"
                );
            }
            Err(e) => {
                warn!(
                    worker = %self.config.worker_id,
                    scenario = scenario.id.get(),
                    error = %e,
                    "Evaluation failed, dropping scenario"
                );
                metrics::record_evaluation_failure(e.reason());
                self.stats.evaluation_failures += 1;
            }
        }
        Ok(())
    }

    /// Evaluate the model formula against a scenario's bindings.
    pub fn evaluate(&self, scenario: &Scenario) -> Result<f64, EvaluationError> {
        let loaded = self.model.as_ref().ok_or(EvaluationError::NoModel)?;
        let formula = loaded.formula.as_ref().map_err(|e| e.clone())?;
        Ok(formula.eval(scenario)?)
    }
}

impl<B: Broker> Drop for WorkerRuntime<B> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel::{bounded, never};
    use montecarlo_broker_memory::MemoryBroker;
    use montecarlo_test_helpers::{fixtures, TestBroker};
    use montecarlo_types::{ResultMessage, ScenarioId};
    use std::time::Duration;
    use tracing_test::traced_test;

    fn config(id: &str) -> WorkerConfig {
        WorkerConfig {
            worker_id: WorkerId::new(id),
            model_poll_interval: Duration::from_millis(10),
            ..WorkerConfig::default()
        }
    }

    fn ready_worker(broker: &TestBroker, model: Model) -> WorkerRuntime<MemoryBroker> {
        let mut worker = WorkerRuntime::new(broker.handle(), config("w"));
        worker.bootstrap().unwrap();
        worker.load_model(model);
        worker
    }

    fn scenario(id: u64, x: Option<f64>, y: Option<f64>) -> ScenarioMessage {
        Scenario::new(ScenarioId(id))
            .with_value("x", x)
            .with_value("y", y)
            .to_message()
    }

    #[test]
    fn test_operations_check_state() {
        let broker = TestBroker::new();
        let mut worker = WorkerRuntime::new(broker.handle(), config("w"));
        assert_eq!(worker.state(), WorkerState::Bootstrapping);

        let err = worker.acquire_model().unwrap_err();
        assert!(matches!(
            err,
            WorkerError::InvalidState {
                expected: WorkerState::AwaitingModel,
                actual: WorkerState::Bootstrapping
            }
        ));

        worker.bootstrap().unwrap();
        assert_eq!(worker.state(), WorkerState::AwaitingModel);
        assert!(worker.bootstrap().is_err());
    }

    #[test]
    fn test_acquire_model_empty_then_loaded() {
        let broker = TestBroker::new();
        let mut worker = WorkerRuntime::new(broker.handle(), config("w"));
        worker.bootstrap().unwrap();

        assert!(!worker.acquire_model().unwrap());
        assert_eq!(worker.state(), WorkerState::AwaitingModel);

        let model = fixtures::sum_model();
        broker
            .control()
            .publish_message(
                MODEL_EXCHANGE,
                "",
                &model.to_message(),
                MessageProperties::persistent(),
            )
            .unwrap();

        assert!(worker.acquire_model().unwrap());
        assert_eq!(worker.state(), WorkerState::Ready);
        assert_eq!(worker.model(), Some(&model));
        assert_eq!(worker.stats().model_polls, 2);
    }

    #[test]
    #[traced_test]
    fn test_malformed_model_is_discarded() {
        let broker = TestBroker::new();
        let mut worker = WorkerRuntime::new(
            broker.handle(),
            WorkerConfig {
                model_delivery: ModelDelivery::SharedQueue,
                ..config("w")
            },
        );
        worker.bootstrap().unwrap();
        broker.publish_raw(MODEL_QUEUE, b"{\"FUNCTION\": 3}");

        assert!(!worker.acquire_model().unwrap());
        assert_eq!(worker.stats().malformed, 1);
        assert_eq!(broker.depth(MODEL_QUEUE), 0);
        assert!(logs_contain("Discarding malformed model"));
    }

    #[test]
    fn test_await_model_stops_on_shutdown() {
        let broker = TestBroker::new();
        let mut worker = WorkerRuntime::new(broker.handle(), config("w"));
        worker.bootstrap().unwrap();

        let (tx, rx) = bounded(1);
        tx.send(()).unwrap();
        assert!(!worker.await_model(&rx).unwrap());
        assert!(worker.stats().model_polls >= 1);
    }

    #[test]
    fn test_await_model_stops_when_shutdown_sender_dropped() {
        let broker = TestBroker::new();
        let mut worker = WorkerRuntime::new(broker.handle(), config("w"));
        worker.bootstrap().unwrap();

        let (tx, rx) = bounded::<()>(1);
        drop(tx);
        assert!(!worker.await_model(&rx).unwrap());
    }

    #[test]
    fn test_evaluation_publishes_result_and_acks() {
        let broker = TestBroker::new();
        let mut worker = ready_worker(&broker, fixtures::sum_model());

        broker.publish(SCENARIO_QUEUE, &scenario(1, Some(0.25), Some(0.5)));
        let delivery = worker
            .channel()
            .unwrap()
            .get(SCENARIO_QUEUE)
            .unwrap()
            .unwrap();
        worker.handle_delivery(delivery).unwrap();

        let results: Vec<ResultMessage> = broker.drain(RESULT_QUEUE);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].worker_id, WorkerId::new("w"));
        assert_eq!(results[0].scenario_id, ScenarioId(1));
        assert_eq!(results[0].result, Some(0.75));
        assert_eq!(broker.broker().unacked_count(SCENARIO_QUEUE), 0);
        assert_eq!(worker.stats().processed, 1);
    }

    #[test]
    #[traced_test]
    fn test_absent_variable_drops_scenario() {
        let broker = TestBroker::new();
        let mut worker = ready_worker(&broker, fixtures::sum_model());

        broker.publish(SCENARIO_QUEUE, &scenario(4, Some(0.25), None));
        let delivery = worker
            .channel()
            .unwrap()
            .get(SCENARIO_QUEUE)
            .unwrap()
            .unwrap();
        worker.handle_delivery(delivery).unwrap();

        assert_eq!(broker.depth(RESULT_QUEUE), 0);
        assert_eq!(broker.broker().unacked_count(SCENARIO_QUEUE), 0);
        assert_eq!(worker.stats().evaluation_failures, 1);
        assert!(logs_contain("Evaluation failed, dropping scenario"));
    }

    #[test]
    fn test_domain_error_is_reported_by_reason() {
        let broker = TestBroker::new();
        let worker = ready_worker(&broker, Model::new("sqrt(x - 2)"));
        let scenario = Scenario::new(ScenarioId(1)).with_value("x", Some(1.0));
        let err = worker.evaluate(&scenario).unwrap_err();
        assert_eq!(err.reason(), "domain");
    }

    #[test]
    fn test_malformed_formula_drops_every_scenario() {
        let broker = TestBroker::new();
        let worker = ready_worker(&broker, Model::new("x +* y"));
        let scenario = Scenario::new(ScenarioId(1))
            .with_value("x", Some(1.0))
            .with_value("y", Some(2.0));
        let err = worker.evaluate(&scenario).unwrap_err();
        assert!(matches!(err, EvaluationError::Malformed(_)));
    }

    #[test]
    fn test_malformed_scenario_is_acked_without_result() {
        let broker = TestBroker::new();
        let mut worker = ready_worker(&broker, fixtures::sum_model());

        broker.publish_raw(SCENARIO_QUEUE, b"[1, 2, 3]");
        let delivery = worker
            .channel()
            .unwrap()
            .get(SCENARIO_QUEUE)
            .unwrap()
            .unwrap();
        worker.handle_delivery(delivery).unwrap();

        assert_eq!(worker.stats().malformed, 1);
        assert_eq!(broker.depth(RESULT_QUEUE), 0);
        assert_eq!(broker.depth(SCENARIO_QUEUE), 0);
    }

    #[test]
    fn test_scenario_limit_leaves_next_delivery_unacked() {
        let broker = TestBroker::new();
        let mut worker = WorkerRuntime::new(
            broker.handle(),
            WorkerConfig {
                max_scenarios: Some(1),
                ..config("w")
            },
        );
        worker.bootstrap().unwrap();
        worker.load_model(fixtures::sum_model());

        for id in 1..=3 {
            broker.publish(SCENARIO_QUEUE, &scenario(id, Some(0.0), Some(1.0)));
        }
        let reason = worker.consume(&never()).unwrap();
        assert_eq!(reason, StopReason::ScenarioLimit);
        assert_eq!(worker.stats().processed, 1);
        // Prefetch of one: the second scenario is held by the worker.
        assert_eq!(broker.broker().unacked_count(SCENARIO_QUEUE), 1);

        worker.stop();
        assert_eq!(broker.broker().unacked_count(SCENARIO_QUEUE), 0);
        assert_eq!(broker.depth(SCENARIO_QUEUE), 2);
    }

    #[test]
    fn test_broker_restart_fails_consumption() {
        let broker = TestBroker::new();
        let mut worker = ready_worker(&broker, fixtures::sum_model());
        broker.broker().restart();
        let err = worker.consume(&never()).unwrap_err();
        assert!(matches!(
            err,
            WorkerError::Broker(BrokerError::ChannelClosed)
        ));
    }

    #[test]
    fn test_run_without_model_stops_on_shutdown() {
        let broker = TestBroker::new();
        let mut worker = WorkerRuntime::new(broker.handle(), config("idle"));
        let (tx, rx) = bounded(1);
        tx.send(()).unwrap();

        let report = worker.run(&rx).unwrap();
        assert_eq!(report.stop_reason, StopReason::Shutdown);
        assert!(!report.model_loaded);
        assert_eq!(worker.state(), WorkerState::Stopped);
        // The private model queue goes away with the channel.
        assert!(!broker
            .broker()
            .queue_exists(&worker_model_queue(&WorkerId::new("idle"))));
    }
}
