//! ligandml-server — configuration and broker selection shared by the binaries.

pub mod config;

use std::sync::Arc;

use ligandml_broker::{BrokerConnector, MemoryBroker};

use crate::config::{BrokerKind, Config};

/// Build the connector named by `broker.kind`.
pub fn build_connector(config: &Config) -> anyhow::Result<Arc<dyn BrokerConnector>> {
    match config.broker.kind {
        BrokerKind::Memory => {
            tracing::warn!("Using the in-memory broker; requests arrive only through the HTTP API");
            Ok(Arc::new(MemoryBroker::new()))
        }
        #[cfg(feature = "kafka")]
        BrokerKind::Kafka => Ok(Arc::new(ligandml_broker::kafka::KafkaConnector::new(
            config.broker.servers.clone(),
        ))),
        #[cfg(not(feature = "kafka"))]
        BrokerKind::Kafka => anyhow::bail!(
            "broker.kind is \"kafka\" but ligandml was built without the `kafka` feature"
        ),
    }
}
