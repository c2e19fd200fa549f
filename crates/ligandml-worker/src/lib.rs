//! ligandml-worker — Broker-driven model worker.
//!
//! [`ModelWorker`] consumes `ModelTrainRequest` / `ModelInferenceRequest`,
//! runs the job's regressor and publishes the outcome on the matching
//! response topic. [`ResponseListener`] folds those responses into the
//! [`ExperimentLedger`]. [`WorkerService`] wires both to a broker.

pub mod error;
pub mod ledger;
mod poll;
pub mod service;
pub mod status;
pub mod worker;

pub use error::{Result, WorkerError};
pub use ledger::{ExperimentLedger, ExperimentRecord, ResponseListener, TrainingStatus, DEFAULT_LEDGER_CAPACITY};
pub use service::{ProducerSlot, ServiceSettings, WorkerService};
pub use status::{StatusHandle, WorkerState, WorkerStatus};
pub use worker::{ModelWorker, WorkerConfig};
