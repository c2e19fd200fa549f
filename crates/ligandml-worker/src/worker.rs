//! The train/inference dispatch loop.
//!
//! One loop, one message at a time. Each request is answered on its kind's
//! response topic; malformed messages are dropped without a reply since they
//! may not carry an experiment id to answer with.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use ligandml_broker::{BrokerMessage, MessageConsumer, MessageProducer};
use ligandml_common::{JobKind, JobRequest, ModelResponse};
use ligandml_model::{WeightStore, DEFAULT_LEARNING_RATE};

use crate::error::{Result, WorkerError};
use crate::poll::{next_message, Polled};
use crate::status::{StatusHandle, WorkerState};

#[derive(Debug, Clone, Copy)]
pub struct WorkerConfig {
    pub learning_rate: f64,
    pub poll_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            learning_rate: DEFAULT_LEARNING_RATE,
            poll_timeout: Duration::from_secs(1),
        }
    }
}

pub struct ModelWorker {
    store: Arc<WeightStore>,
    producer: Arc<dyn MessageProducer>,
    status: StatusHandle,
    config: WorkerConfig,
}

impl std::fmt::Debug for ModelWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelWorker")
            .field("store", &self.store)
            .field("config", &self.config)
            .finish()
    }
}

impl ModelWorker {
    pub fn new(
        store: Arc<WeightStore>,
        producer: Arc<dyn MessageProducer>,
        status: StatusHandle,
        config: WorkerConfig,
    ) -> Self {
        Self { store, producer, status, config }
    }

    pub fn status(&self) -> &StatusHandle {
        &self.status
    }

    /// Consume requests until `shutdown` flips to `true` or its sender is dropped.
    pub async fn run(&self, mut consumer: Box<dyn MessageConsumer>, mut shutdown: watch::Receiver<bool>) {
        self.status.set_state(WorkerState::Idle);
        info!("🧪 Model worker listening for requests");

        loop {
            match next_message(consumer.as_mut(), self.config.poll_timeout, &mut shutdown).await {
                Polled::Message(msg) => {
                    self.handle(msg).await;
                }
                Polled::Empty => {}
                Polled::Failed(e) => {
                    warn!(error = %e, "Consumer error");
                    self.status.record_error(e.to_string());
                }
                Polled::Shutdown => break,
            }
        }

        self.status.set_state(WorkerState::Stopped);
        info!("Model worker stopped");
    }

    /// Process one message and publish its response.
    /// Returns the response, or `None` when the message was dropped.
    pub async fn handle(&self, msg: BrokerMessage) -> Option<ModelResponse> {
        let request = match JobRequest::parse(&msg.topic, &msg.payload) {
            Ok(request) => request,
            Err(e) => {
                warn!(topic = %msg.topic, error = %e, "Dropping malformed message");
                self.status.record_malformed(e.to_string());
                return None;
            }
        };

        let kind = request.kind();
        let job_id = request.job_id();
        let experiment_id = request.experiment_id();
        info!(job_id, experiment_id, kind = %kind, "Processing request");
        self.status.begin_job(job_id);

        let response = match self.process(request).await {
            Ok(result) => {
                debug!(job_id, experiment_id, result, "Request processed");
                ModelResponse::ok(experiment_id, f64::from(result))
            }
            Err(e) => {
                error!(job_id, experiment_id, kind = %kind, error = %e, "Request failed");
                ModelResponse::failed(experiment_id, e.to_string())
            }
        };

        self.status.finish_job(kind, response.error.clone());
        self.respond(kind, &response).await;
        Some(response)
    }

    async fn process(&self, request: JobRequest) -> Result<f32> {
        let store = Arc::clone(&self.store);
        let learning_rate = self.config.learning_rate;

        let outcome = tokio::task::spawn_blocking(move || match request {
            JobRequest::Train { job_id, features, target_value, .. } => {
                store.update(job_id, |model| model.train_step(&features, target_value, learning_rate))
            }
            JobRequest::Inference { job_id, features, .. } => {
                let (model, origin) = store.load_or_init(job_id)?;
                debug!(job_id, ?origin, "Weights loaded");
                model.predict(&features)
            }
        })
        .await
        .map_err(|e| WorkerError::Task(e.to_string()))?;

        Ok(outcome?)
    }

    async fn respond(&self, kind: JobKind, response: &ModelResponse) {
        let topic = kind.response_topic();
        let payload = match response.to_payload() {
            Ok(payload) => payload,
            Err(e) => {
                error!(topic, error = %e, "Failed to encode response");
                return;
            }
        };
        if let Err(e) = self.producer.publish(topic, &payload).await {
            error!(topic, experiment_id = response.experiment_id, error = %e, "Failed to publish response");
            self.status.record_error(e.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ligandml_broker::{BrokerError, MemoryBroker};
    use ligandml_common::{TOPIC_INFERENCE_REQUEST, TOPIC_TRAIN_REQUEST, TOPIC_TRAIN_RESPONSE};
    use ligandml_model::WeightCache;
    use tempfile::TempDir;

    struct FailingProducer;

    #[async_trait]
    impl MessageProducer for FailingProducer {
        async fn publish(&self, topic: &str, _payload: &[u8]) -> ligandml_broker::Result<()> {
            Err(BrokerError::Publish { topic: topic.to_string(), reason: "down".into() })
        }
    }

    fn worker(dir: &TempDir, producer: Arc<dyn MessageProducer>) -> ModelWorker {
        let store = WeightStore::open(dir.path(), 2, WeightCache::new(4)).unwrap();
        store.ensure_base().unwrap();
        ModelWorker::new(Arc::new(store), producer, StatusHandle::new(), WorkerConfig::default())
    }

    fn train(job_id: i64, features: [f32; 2], target: f32) -> BrokerMessage {
        let req = JobRequest::Train { job_id, experiment_id: job_id * 10, features: features.to_vec(), target_value: target };
        BrokerMessage::new(TOPIC_TRAIN_REQUEST, req.to_payload().unwrap())
    }

    #[tokio::test]
    async fn test_train_publishes_pre_update_output() {
        let dir = TempDir::new().unwrap();
        let broker = MemoryBroker::new();
        let worker = worker(&dir, Arc::new(broker.clone()));

        let first = worker.handle(train(1, [1.0, 0.5], 100.0)).await.unwrap();
        let second = worker.handle(train(1, [1.0, 0.5], 100.0)).await.unwrap();
        assert!(first.success && second.success);
        assert_eq!(first.experiment_id, 10);
        // The persisted step moves the next prediction toward the target
        assert!(second.result.unwrap() > first.result.unwrap());

        let mut responses = broker.subscribe(&[TOPIC_TRAIN_RESPONSE]);
        let msg = responses.poll(Duration::from_millis(10)).await.unwrap().unwrap();
        assert_eq!(ModelResponse::from_payload(&msg.payload).unwrap(), first);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_reports_failure() {
        let dir = TempDir::new().unwrap();
        let worker = worker(&dir, Arc::new(MemoryBroker::new()));

        let req = JobRequest::Inference { job_id: 2, experiment_id: 5, features: vec![1.0; 3] };
        let msg = BrokerMessage::new(TOPIC_INFERENCE_REQUEST, req.to_payload().unwrap());
        let response = worker.handle(msg).await.unwrap();

        assert!(!response.success);
        assert_eq!(response.result, None);
        assert!(response.error.is_some());
        assert_eq!(worker.status().snapshot().failed, 1);
    }

    #[tokio::test]
    async fn test_malformed_message_dropped() {
        let dir = TempDir::new().unwrap();
        let broker = MemoryBroker::new();
        let worker = worker(&dir, Arc::new(broker.clone()));

        let dropped = worker.handle(BrokerMessage::new(TOPIC_TRAIN_REQUEST, b"{not json".to_vec())).await;
        assert!(dropped.is_none());
        assert_eq!(broker.pending(), 0);
        assert_eq!(worker.status().snapshot().malformed, 1);
    }

    #[tokio::test]
    async fn test_publish_failure_is_not_fatal() {
        let dir = TempDir::new().unwrap();
        let worker = worker(&dir, Arc::new(FailingProducer));

        let response = worker.handle(train(3, [0.0, 1.0], 1.0)).await.unwrap();
        assert!(response.success);
        let status = worker.status().snapshot();
        assert_eq!(status.trained, 1);
        assert!(status.last_error.unwrap().contains("down"));
    }
}
