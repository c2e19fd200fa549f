//! Shared application state for the HTTP surface.

use std::sync::Arc;
use std::time::Instant;

use ligandml_broker::MessageProducer;
use ligandml_model::WeightStore;
use ligandml_worker::{ExperimentLedger, ProducerSlot, StatusHandle};

/// Shared state injected into every Axum handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<WeightStore>,
    pub status: StatusHandle,
    pub ledger: Arc<ExperimentLedger>,
    /// Empty until the broker connects
    pub producer: ProducerSlot,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        store: Arc<WeightStore>,
        status: StatusHandle,
        ledger: Arc<ExperimentLedger>,
        producer: ProducerSlot,
    ) -> Self {
        Self { store, status, ledger, producer, started_at: Instant::now() }
    }

    pub fn producer(&self) -> Option<Arc<dyn MessageProducer>> {
        self.producer.get().cloned()
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

pub type SharedState = Arc<AppState>;
