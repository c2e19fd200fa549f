//! Kafka backend via librdkafka.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message as _;
use rdkafka::producer::{FutureProducer, FutureRecord};
use tracing::debug;

use crate::{BrokerConnector, BrokerError, BrokerMessage, MessageConsumer, MessageProducer, Result};

const DELIVERY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct KafkaConnector {
    servers: String,
    metadata_timeout: Duration,
}

impl KafkaConnector {
    pub fn new(servers: impl Into<String>) -> Self {
        Self {
            servers: servers.into(),
            metadata_timeout: Duration::from_secs(5),
        }
    }
}

#[async_trait]
impl BrokerConnector for KafkaConnector {
    async fn consumer(&self, group_id: &str, topics: &[&str]) -> Result<Box<dyn MessageConsumer>> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.servers)
            .set("group.id", group_id)
            .set("auto.offset.reset", "earliest")
            .create()?;

        // Client creation is lazy; a metadata round-trip proves the cluster is reachable
        let timeout = self.metadata_timeout;
        let consumer = tokio::task::spawn_blocking(move || {
            consumer.fetch_metadata(None, timeout).map(|_| consumer)
        })
        .await
        .map_err(|e| BrokerError::Connection(e.to_string()))??;

        consumer.subscribe(topics)?;
        debug!(group_id, ?topics, "Kafka consumer subscribed");
        Ok(Box::new(KafkaConsumer { consumer }))
    }

    async fn producer(&self) -> Result<Arc<dyn MessageProducer>> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &self.servers)
            .set("message.timeout.ms", "5000")
            .create()?;
        Ok(Arc::new(KafkaProducer { producer }))
    }
}

pub struct KafkaConsumer {
    consumer: StreamConsumer,
}

#[async_trait]
impl MessageConsumer for KafkaConsumer {
    async fn poll(&mut self, timeout: Duration) -> Result<Option<BrokerMessage>> {
        match tokio::time::timeout(timeout, self.consumer.recv()).await {
            Err(_) => Ok(None),
            Ok(Err(e)) => Err(BrokerError::Consume(e.to_string())),
            Ok(Ok(msg)) => Ok(Some(BrokerMessage::new(
                msg.topic(),
                msg.payload().unwrap_or_default(),
            ))),
        }
    }
}

pub struct KafkaProducer {
    producer: FutureProducer,
}

#[async_trait]
impl MessageProducer for KafkaProducer {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<()> {
        let record: FutureRecord<'_, (), [u8]> = FutureRecord::to(topic).payload(payload);
        self.producer
            .send(record, DELIVERY_TIMEOUT)
            .await
            .map(|_| ())
            .map_err(|(e, _)| BrokerError::Publish {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }
}
