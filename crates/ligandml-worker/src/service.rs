//! Connect to the broker and run the worker plus response listener.

use std::sync::Arc;

use tokio::sync::{watch, OnceCell};
use tracing::{error, info};

use ligandml_broker::{connect_with_retry, BrokerConnector, MessageConsumer, MessageProducer, RetryPolicy};
use ligandml_common::{TOPIC_INFERENCE_REQUEST, TOPIC_INFERENCE_RESPONSE, TOPIC_TRAIN_REQUEST, TOPIC_TRAIN_RESPONSE};
use ligandml_model::WeightStore;

use crate::error::Result;
use crate::ledger::{ExperimentLedger, ResponseListener};
use crate::status::{StatusHandle, WorkerState};
use crate::worker::{ModelWorker, WorkerConfig};

const REQUEST_TOPICS: [&str; 2] = [TOPIC_TRAIN_REQUEST, TOPIC_INFERENCE_REQUEST];
const RESPONSE_TOPICS: [&str; 2] = [TOPIC_TRAIN_RESPONSE, TOPIC_INFERENCE_RESPONSE];

/// Filled once the producer connects; empty until then.
pub type ProducerSlot = Arc<OnceCell<Arc<dyn MessageProducer>>>;

#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub group_id: String,
    pub retry: RetryPolicy,
    pub worker: WorkerConfig,
}

pub struct WorkerService {
    pub connector: Arc<dyn BrokerConnector>,
    pub settings: ServiceSettings,
    pub store: Arc<WeightStore>,
    pub status: StatusHandle,
    pub ledger: Arc<ExperimentLedger>,
    pub producer: ProducerSlot,
}

impl WorkerService {
    /// Runs until shutdown. Connection exhaustion is returned as an error
    /// and leaves the worker `stopped`. A shutdown while still connecting
    /// abandons the retries and returns `Ok`.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<()> {
        self.status.set_state(WorkerState::Connecting);
        let mut stop = shutdown.clone();
        // A dropped sender counts as shutdown, as in the poll loops.
        let connected = tokio::select! {
            connected = self.connect() => connected,
            _ = stop.wait_for(|stop| *stop) => {
                info!("Shutdown requested before the broker connected");
                self.status.set_state(WorkerState::Stopped);
                return Ok(());
            }
        };
        let (requests, responses, producer) = match connected {
            Ok(parts) => parts,
            Err(e) => {
                error!(error = %e, "Broker connection failed");
                self.status.record_error(e.to_string());
                self.status.set_state(WorkerState::Stopped);
                return Err(e);
            }
        };

        // A producer set by an earlier run stays in place
        let _ = self.producer.set(Arc::clone(&producer));
        info!(group_id = %self.settings.group_id, "✅ Broker connected");

        let listener = ResponseListener::new(Arc::clone(&self.ledger), self.settings.worker.poll_timeout);
        let listener_shutdown = shutdown.clone();
        let listener_task = tokio::spawn(async move { listener.run(responses, listener_shutdown).await });

        let worker = ModelWorker::new(self.store, producer, self.status, self.settings.worker);
        worker.run(requests, shutdown).await;

        if let Err(e) = listener_task.await {
            error!(error = %e, "Response listener task failed");
        }
        Ok(())
    }

    async fn connect(&self) -> Result<(Box<dyn MessageConsumer>, Box<dyn MessageConsumer>, Arc<dyn MessageProducer>)> {
        let connector = self.connector.as_ref();
        let policy = &self.settings.retry;
        let group_id = self.settings.group_id.as_str();
        let response_group = format!("{group_id}-responses");
        let response_group = response_group.as_str();

        let requests = connect_with_retry(policy, "Kafka consumer", move || {
            connector.consumer(group_id, &REQUEST_TOPICS)
        })
        .await?;
        let producer = connect_with_retry(policy, "Kafka producer", move || connector.producer()).await?;
        let responses = connect_with_retry(policy, "response consumer", move || {
            connector.consumer(response_group, &RESPONSE_TOPICS)
        })
        .await?;

        Ok((requests, responses, producer))
    }
}
