//! ligandml-broker — Message broker plumbing.
//!
//! The worker only sees the three traits below; backends are chosen at startup:
//! - [`memory::MemoryBroker`]: in-process queue for standalone runs and tests
//! - `kafka::KafkaConnector` (feature `kafka`): Kafka via librdkafka
//!
//! Connections are established through [`retry::connect_with_retry`], which
//! gives up after a fixed number of attempts.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

pub mod error;
pub mod memory;
pub mod retry;

#[cfg(feature = "kafka")]
pub mod kafka;

pub use error::{BrokerError, Result};
pub use memory::MemoryBroker;
pub use retry::{connect_with_retry, RetryPolicy};

/// A message taken off a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl BrokerMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self { topic: topic.into(), payload: payload.into() }
    }
}

#[async_trait]
pub trait MessageConsumer: Send {
    /// Wait up to `timeout` for the next message on any subscribed topic.
    async fn poll(&mut self, timeout: Duration) -> Result<Option<BrokerMessage>>;
}

#[async_trait]
pub trait MessageProducer: Send + Sync {
    /// Publish and wait for delivery.
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<()>;
}

#[async_trait]
pub trait BrokerConnector: Send + Sync {
    async fn consumer(&self, group_id: &str, topics: &[&str]) -> Result<Box<dyn MessageConsumer>>;

    async fn producer(&self) -> Result<Arc<dyn MessageProducer>>;
}
