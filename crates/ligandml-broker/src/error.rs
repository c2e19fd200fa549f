//! Broker error types.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BrokerError>;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Publish to {topic} failed: {reason}")]
    Publish { topic: String, reason: String },

    #[error("Consume error: {0}")]
    Consume(String),

    #[error("{what} failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        what: String,
        attempts: u32,
        last_error: String,
    },
}

#[cfg(feature = "kafka")]
impl From<rdkafka::error::KafkaError> for BrokerError {
    fn from(err: rdkafka::error::KafkaError) -> Self {
        BrokerError::Connection(err.to_string())
    }
}
