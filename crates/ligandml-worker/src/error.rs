use thiserror::Error;

use ligandml_broker::BrokerError;
use ligandml_model::ModelError;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error("Model task failed: {0}")]
    Task(String),
}

pub type Result<T> = std::result::Result<T, WorkerError>;
