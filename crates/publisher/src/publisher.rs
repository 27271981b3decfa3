//! Model and scenario publishing.
//!
//! [`TaskPublisher`] declares the run topology, publishes the model the
//! workers evaluate, then streams sampled scenarios to the scenario queue.

use crate::config::PublisherConfig;
use montecarlo_broker::{
    declare_model_exchange, declare_work_queues, Broker, BrokerError, Channel, MessageProperties,
    ModelDelivery, QueueOptions, DEFAULT_EXCHANGE,
};
use montecarlo_metrics as metrics;
use montecarlo_sampling::ScenarioGenerator;
use montecarlo_types::{
    Model, Scenario, ScenarioId, MODEL_EXCHANGE, MODEL_QUEUE, SCENARIO_QUEUE,
};
use rand::Rng;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),
}

/// Outcome of one scenario stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PublishSummary {
    pub published: u64,
    pub first_id: Option<ScenarioId>,
    pub last_id: Option<ScenarioId>,
    /// Variable values recorded as absent because sampling failed.
    pub absent_values: u64,
}

/// Publishes a model and its scenarios.
pub struct TaskPublisher<C: Channel> {
    channel: C,
    config: PublisherConfig,
}

impl<C: Channel> TaskPublisher<C> {
    /// Wrap an open channel and declare the run topology on it.
    pub fn new(channel: C, config: PublisherConfig) -> Result<Self, PublishError> {
        declare_work_queues(&channel)?;
        declare_model_exchange(&channel)?;
        info!(delivery = %config.model_delivery, "Publisher connected");
        Ok(Self { channel, config })
    }

    /// Open a channel on `broker` and wrap it.
    pub fn connect<B>(broker: &B, config: PublisherConfig) -> Result<Self, PublishError>
    where
        B: Broker<Channel = C>,
    {
        Self::new(broker.open_channel()?, config)
    }

    pub fn config(&self) -> &PublisherConfig {
        &self.config
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Publish the model, replacing any previously published one.
    ///
    /// In broadcast mode the model goes to the retaining fan-out exchange, so
    /// it reaches both the worker queues bound now and those bound later. In
    /// shared-queue mode `modelQueue` is deleted and redeclared first so that
    /// no stale model is left behind.
    pub fn publish_model(&self, model: &Model) -> Result<(), PublishError> {
        let properties = MessageProperties::persistent().with_expiration(self.config.model_ttl);
        let message = model.to_message();

        match self.config.model_delivery {
            ModelDelivery::Broadcast => {
                self.channel
                    .publish_message(MODEL_EXCHANGE, "", &message, properties)?;
            }
            ModelDelivery::SharedQueue => {
                let dropped = self.channel.delete_queue(MODEL_QUEUE)?;
                if dropped > 0 {
                    debug!(dropped, "Discarded stale model");
                }
                self.channel
                    .declare_queue(MODEL_QUEUE, QueueOptions::durable())?;
                self.channel
                    .publish_message(DEFAULT_EXCHANGE, MODEL_QUEUE, &message, properties)?;
            }
        }

        metrics::record_model_published();
        info!(
            function = %model.function,
            variables = model.distributions.len(),
            ttl_ms = self.config.model_ttl.as_millis() as u64,
            "Model published"
        );
        Ok(())
    }

    /// Publish one scenario as a persistent message.
    pub fn publish_scenario(&self, scenario: &Scenario) -> Result<(), PublishError> {
        self.channel.publish_message(
            DEFAULT_EXCHANGE,
            SCENARIO_QUEUE,
            &scenario.to_message(),
            MessageProperties::persistent(),
        )?;
        metrics::record_scenario_published();
        debug!(scenario = scenario.id.get(), "Scenario published");
        Ok(())
    }

    /// Sample and publish `count` scenarios with ids `1..=count`.
    ///
    /// Sampling failures do not stop the stream: the variable is sent as
    /// `null`. Only a broker failure aborts.
    pub fn publish_scenarios<R: Rng>(
        &self,
        model: &Model,
        count: u64,
        rng: R,
    ) -> Result<PublishSummary, PublishError> {
        let mut summary = PublishSummary::default();

        let mut generator = ScenarioGenerator::new(model, rng);
        while generator.next_id().get() <= count {
            let scenario = generator.next_scenario();
            self.publish_scenario(&scenario)?;
            summary.absent_values += scenario.absent().count() as u64;
            summary.first_id.get_or_insert(scenario.id);
            summary.last_id = Some(scenario.id);
            summary.published += 1;
        }

        info!(
            published = summary.published,
            absent_values = summary.absent_values,
            "Scenarios published"
        );
        Ok(summary)
    }

    /// Close the publisher's channel.
    pub fn close(self) -> Result<(), PublishError> {
        self.channel.close()?;
        Ok(())
    }
}
