//! Result consumer.

use crate::config::AggregatorConfig;
use crate::snapshot::ResultSnapshot;
use crate::store::{InsertOutcome, ResultStore};
use crossbeam::channel::{Receiver, Sender};
use montecarlo_broker::{decode_message, Broker, BrokerError, Channel, Delivery, QueueOptions};
use montecarlo_metrics as metrics;
use montecarlo_types::{ResultMessage, ResultRecord, RESULT_QUEUE};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum AggregatorError {
    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),
}

/// Consumes `resultQueue` into a [`ResultStore`] it owns.
pub struct ResultAggregator<B: Broker> {
    broker: B,
    config: AggregatorConfig,
    store: ResultStore,
    channel: Option<B::Channel>,
}

impl<B: Broker> ResultAggregator<B> {
    pub fn new(broker: B, config: AggregatorConfig) -> Self {
        let store = ResultStore::new(config.dedup);
        Self {
            broker,
            config,
            store,
            channel: None,
        }
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    pub fn snapshot(&self) -> ResultSnapshot {
        self.store.snapshot(self.config.histogram_bins)
    }

    fn channel(&self) -> Result<&B::Channel, AggregatorError> {
        self.channel
            .as_ref()
            .ok_or(AggregatorError::Broker(BrokerError::ChannelClosed))
    }

    /// Open the channel and declare the result queue.
    pub fn connect(&mut self) -> Result<(), AggregatorError> {
        let channel = self.broker.open_channel()?;
        channel.declare_queue(RESULT_QUEUE, QueueOptions::durable())?;
        self.channel = Some(channel);
        info!(dedup = self.config.dedup, "Aggregator connected");
        Ok(())
    }

    /// Consume results until shutdown, sending a snapshot every
    /// `snapshot_interval` and once more on exit.
    ///
    /// Returns the final snapshot. A renderer that has gone away does not
    /// stop consumption.
    pub fn run(
        &mut self,
        snapshots: &Sender<Arc<ResultSnapshot>>,
        shutdown: &Receiver<()>,
    ) -> Result<Arc<ResultSnapshot>, AggregatorError> {
        if self.channel.is_none() {
            self.connect()?;
        }
        let consumer = self.channel()?.consume(RESULT_QUEUE)?;
        let ticker = crossbeam::channel::tick(self.config.snapshot_interval);
        info!(queue = RESULT_QUEUE, "Aggregating results");

        let outcome = loop {
            crossbeam::channel::select! {
                recv(shutdown) -> _ => break Ok(()),
                recv(ticker) -> _ => {
                    self.publish_snapshot(snapshots);
                }
                recv(consumer.receiver()) -> delivery => match delivery {
                    Ok(delivery) => {
                        if let Err(e) = self.handle_delivery(delivery) {
                            break Err(e);
                        }
                    }
                    Err(_) => {
                        break Err(BrokerError::ConsumerCancelled(consumer.tag().clone()).into());
                    }
                },
            }
        };

        let last = self.publish_snapshot(snapshots);
        if let Some(channel) = self.channel.take() {
            if let Err(e) = channel.close() {
                debug!(error = %e, "Channel close failed");
            }
        }
        info!(
            total = last.total,
            duplicates = last.duplicates,
            "Aggregator stopped"
        );
        outcome.map(|()| last)
    }

    fn publish_snapshot(&self, snapshots: &Sender<Arc<ResultSnapshot>>) -> Arc<ResultSnapshot> {
        let snapshot = Arc::new(self.snapshot());
        if snapshots.send(Arc::clone(&snapshot)).is_err() {
            debug!("Renderer gone, snapshot dropped");
        }
        snapshot
    }

    /// Store one result and acknowledge it. Undecodable bodies are logged and
    /// acknowledged.
    pub fn handle_delivery(&mut self, delivery: Delivery) -> Result<(), AggregatorError> {
        match decode_message::<ResultMessage>(&delivery.body) {
            Ok(message) => {
                let record = ResultRecord::from(message);
                debug!(
                    worker = %record.worker_id,
                    scenario = record.scenario_id.get(),
                    value = ?record.value,
                    "Result received"
                );
                self.insert(record);
            }
            Err(e) => {
                warn!(error = %e, "Dropping malformed result");
                metrics::record_malformed_message(e.message_type());
            }
        }
        self.channel()?.ack(delivery.tag)?;
        Ok(())
    }

    fn insert(&mut self, record: ResultRecord) {
        let scenario = record.scenario_id;
        match self.store.insert(record) {
            InsertOutcome::Appended => {}
            InsertOutcome::AppendedDuplicate | InsertOutcome::Replaced => {
                metrics::record_duplicate_result();
                debug!(scenario = scenario.get(), "Duplicate result");
            }
        }
        metrics::record_result_aggregated();
        metrics::set_store_size(self.store.len());
    }
}
