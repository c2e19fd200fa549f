//! Experiment bookkeeping driven by response messages.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use ligandml_broker::{BrokerMessage, MessageConsumer};
use ligandml_common::{JobKind, ModelResponse};

use crate::poll::{next_message, Polled};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingStatus {
    Pending,
    Completed,
    Failed,
}

impl TrainingStatus {
    /// Numeric code stored by the web tier.
    pub fn code(self) -> u8 {
        match self {
            TrainingStatus::Pending => 1,
            TrainingStatus::Completed => 2,
            TrainingStatus::Failed => 3,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExperimentRecord {
    pub experiment_id: i64,
    pub job_id: Option<i64>,
    pub kind: JobKind,
    pub status: TrainingStatus,
    pub status_code: u8,
    pub predicted_value: Option<f64>,
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl ExperimentRecord {
    fn new(experiment_id: i64, job_id: Option<i64>, kind: JobKind, status: TrainingStatus) -> Self {
        Self {
            experiment_id,
            job_id,
            kind,
            status,
            status_code: status.code(),
            predicted_value: None,
            error: None,
            updated_at: Utc::now(),
        }
    }

    fn set_status(&mut self, status: TrainingStatus) {
        self.status = status;
        self.status_code = status.code();
        self.updated_at = Utc::now();
    }
}

/// Records kept before the oldest entries are evicted.
pub const DEFAULT_LEDGER_CAPACITY: usize = 10_000;

/// Bounded map of experiment records. Past capacity, the least recently
/// updated finished record is evicted first, then the least recently updated
/// pending one.
#[derive(Debug)]
pub struct ExperimentLedger {
    records: RwLock<HashMap<i64, ExperimentRecord>>,
    capacity: usize,
}

impl Default for ExperimentLedger {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_LEDGER_CAPACITY)
    }
}

impl ExperimentLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Mark an experiment pending for a new job.
    ///
    /// A response can land before the submission is recorded; such a record
    /// has no job id yet and already carries the outcome, so it is adopted
    /// instead of being reset.
    pub fn record_submitted(&self, experiment_id: i64, job_id: i64, kind: JobKind) -> ExperimentRecord {
        let mut records = self.write();
        if let Some(existing) = records.get_mut(&experiment_id) {
            if existing.job_id.is_none() && existing.status != TrainingStatus::Pending {
                existing.job_id = Some(job_id);
                return existing.clone();
            }
        }
        let record = ExperimentRecord::new(experiment_id, Some(job_id), kind, TrainingStatus::Pending);
        self.insert(&mut records, record.clone());
        record
    }

    /// Mark a submitted experiment failed without a response, e.g. when its
    /// request never reached the broker.
    pub fn record_failure(&self, experiment_id: i64, kind: JobKind, error: impl Into<String>) -> ExperimentRecord {
        let mut records = self.write();
        let mut record = records
            .remove(&experiment_id)
            .unwrap_or_else(|| ExperimentRecord::new(experiment_id, None, kind, TrainingStatus::Pending));
        record.set_status(TrainingStatus::Failed);
        record.error = Some(error.into());
        self.insert(&mut records, record.clone());
        record
    }

    /// Apply a response. Experiments not submitted through this ledger are
    /// created on the fly without a job id.
    pub fn record_response(&self, kind: JobKind, response: &ModelResponse) -> ExperimentRecord {
        let mut records = self.write();
        let mut record = records
            .remove(&response.experiment_id)
            .unwrap_or_else(|| ExperimentRecord::new(response.experiment_id, None, kind, TrainingStatus::Pending));

        record.kind = kind;
        if response.success {
            record.set_status(TrainingStatus::Completed);
            record.error = None;
            if kind == JobKind::Inference {
                record.predicted_value = response.result;
            }
        } else {
            record.set_status(TrainingStatus::Failed);
            record.error = response.error.clone();
        }
        self.insert(&mut records, record.clone());
        record
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn get(&self, experiment_id: i64) -> Option<ExperimentRecord> {
        self.read().get(&experiment_id).cloned()
    }

    /// Every record, ordered by experiment id.
    pub fn all(&self) -> Vec<ExperimentRecord> {
        let mut records: Vec<_> = self.read().values().cloned().collect();
        records.sort_by_key(|r| r.experiment_id);
        records
    }

    fn insert(&self, records: &mut HashMap<i64, ExperimentRecord>, record: ExperimentRecord) {
        if !records.contains_key(&record.experiment_id) && records.len() >= self.capacity {
            let victim = records
                .values()
                .min_by_key(|r| (r.status == TrainingStatus::Pending, r.updated_at))
                .map(|r| r.experiment_id);
            if let Some(id) = victim {
                records.remove(&id);
                debug!(experiment_id = id, "Ledger full, evicted record");
            }
        }
        records.insert(record.experiment_id, record);
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<i64, ExperimentRecord>> {
        self.records.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<i64, ExperimentRecord>> {
        self.records.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Feeds the ledger from both response topics.
#[derive(Debug, Clone)]
pub struct ResponseListener {
    ledger: Arc<ExperimentLedger>,
    poll_timeout: Duration,
}

impl ResponseListener {
    pub fn new(ledger: Arc<ExperimentLedger>, poll_timeout: Duration) -> Self {
        Self { ledger, poll_timeout }
    }

    pub async fn run(&self, mut consumer: Box<dyn MessageConsumer>, mut shutdown: watch::Receiver<bool>) {
        info!("Response listener started");
        loop {
            match next_message(consumer.as_mut(), self.poll_timeout, &mut shutdown).await {
                Polled::Message(msg) => {
                    self.handle(&msg);
                }
                Polled::Empty => {}
                Polled::Failed(e) => warn!(error = %e, "Response consumer error"),
                Polled::Shutdown => break,
            }
        }
        info!("Response listener stopped");
    }

    pub fn handle(&self, msg: &BrokerMessage) -> Option<ExperimentRecord> {
        let Some(kind) = JobKind::from_response_topic(&msg.topic) else {
            warn!(topic = %msg.topic, "Response on unexpected topic");
            return None;
        };
        let response = match ModelResponse::from_payload(&msg.payload) {
            Ok(response) => response,
            Err(e) => {
                warn!(topic = %msg.topic, error = %e, "Dropping undecodable response");
                return None;
            }
        };
        let record = self.ledger.record_response(kind, &response);
        info!(
            experiment_id = record.experiment_id,
            status = record.status_code,
            "Experiment updated"
        );
        Some(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ligandml_common::{TOPIC_INFERENCE_RESPONSE, TOPIC_TRAIN_RESPONSE};

    #[test]
    fn test_submitted_then_completed() {
        let ledger = ExperimentLedger::new();
        let pending = ledger.record_submitted(8, 2, JobKind::Inference);
        assert_eq!(pending.status_code, 1);

        ledger.record_response(JobKind::Inference, &ModelResponse::ok(8, 0.75));
        let done = ledger.get(8).unwrap();
        assert_eq!(done.status, TrainingStatus::Completed);
        assert_eq!(done.status_code, 2);
        assert_eq!(done.job_id, Some(2));
        assert_eq!(done.predicted_value, Some(0.75));
    }

    #[test]
    fn test_train_response_does_not_set_prediction() {
        let ledger = ExperimentLedger::new();
        let record = ledger.record_response(JobKind::Train, &ModelResponse::ok(3, 1.5));
        assert_eq!(record.status, TrainingStatus::Completed);
        assert_eq!(record.predicted_value, None);
        assert_eq!(record.job_id, None);
    }

    #[test]
    fn test_failure_keeps_error() {
        let ledger = ExperimentLedger::new();
        ledger.record_submitted(4, 1, JobKind::Train);
        let record = ledger.record_response(JobKind::Train, &ModelResponse::failed(4, "no base weights"));
        assert_eq!(record.status, TrainingStatus::Failed);
        assert_eq!(record.error.as_deref(), Some("no base weights"));
    }

    #[test]
    fn test_all_sorted() {
        let ledger = ExperimentLedger::new();
        for id in [9, 1, 5] {
            ledger.record_submitted(id, id, JobKind::Train);
        }
        let ids: Vec<_> = ledger.all().iter().map(|r| r.experiment_id).collect();
        assert_eq!(ids, vec![1, 5, 9]);
    }

    #[test]
    fn test_early_response_survives_late_submission() {
        let ledger = ExperimentLedger::new();
        ledger.record_response(JobKind::Inference, &ModelResponse::ok(6, 0.5));

        let record = ledger.record_submitted(6, 11, JobKind::Inference);
        assert_eq!(record.status, TrainingStatus::Completed);
        assert_eq!(record.job_id, Some(11));
        assert_eq!(record.predicted_value, Some(0.5));
        assert_eq!(ledger.get(6).unwrap().status_code, 2);
    }

    #[test]
    fn test_resubmission_resets_to_pending() {
        let ledger = ExperimentLedger::new();
        ledger.record_submitted(6, 11, JobKind::Train);
        ledger.record_response(JobKind::Train, &ModelResponse::ok(6, 1.0));

        let record = ledger.record_submitted(6, 12, JobKind::Train);
        assert_eq!(record.status, TrainingStatus::Pending);
        assert_eq!(record.job_id, Some(12));
    }

    #[test]
    fn test_record_failure_marks_failed() {
        let ledger = ExperimentLedger::new();
        ledger.record_submitted(2, 7, JobKind::Train);
        let record = ledger.record_failure(2, JobKind::Train, "broker down");
        assert_eq!(record.status, TrainingStatus::Failed);
        assert_eq!(record.status_code, 3);
        assert_eq!(record.job_id, Some(7));
        assert_eq!(record.error.as_deref(), Some("broker down"));
    }

    #[test]
    fn test_capacity_evicts_finished_before_pending() {
        let ledger = ExperimentLedger::with_capacity(2);
        ledger.record_submitted(1, 1, JobKind::Train);
        ledger.record_submitted(2, 2, JobKind::Train);
        ledger.record_response(JobKind::Train, &ModelResponse::ok(2, 1.0));

        ledger.record_submitted(3, 3, JobKind::Train);
        assert_eq!(ledger.len(), 2);
        assert!(ledger.get(2).is_none());
        assert!(ledger.get(1).is_some());

        // Only pending records left: the oldest goes.
        ledger.record_submitted(4, 4, JobKind::Train);
        assert_eq!(ledger.len(), 2);
        assert!(ledger.get(1).is_none());
        let ids: Vec<_> = ledger.all().iter().map(|r| r.experiment_id).collect();
        assert_eq!(ids, vec![3, 4]);
    }

    #[test]
    fn test_updating_existing_record_never_evicts() {
        let ledger = ExperimentLedger::with_capacity(2);
        ledger.record_submitted(1, 1, JobKind::Train);
        ledger.record_submitted(2, 2, JobKind::Train);
        ledger.record_response(JobKind::Train, &ModelResponse::ok(1, 1.0));
        ledger.record_failure(2, JobKind::Train, "boom");
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn test_listener_drops_bad_messages() {
        let listener = ResponseListener::new(Arc::new(ExperimentLedger::new()), Duration::from_millis(10));
        assert!(listener.handle(&BrokerMessage::new("Other", b"{}".to_vec())).is_none());
        assert!(listener.handle(&BrokerMessage::new(TOPIC_TRAIN_RESPONSE, b"nope".to_vec())).is_none());

        let payload = ModelResponse::ok(1, 2.0).to_payload().unwrap();
        let record = listener.handle(&BrokerMessage::new(TOPIC_INFERENCE_RESPONSE, payload)).unwrap();
        assert_eq!(record.predicted_value, Some(2.0));
    }
}
