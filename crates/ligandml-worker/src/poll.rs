use std::time::Duration;

use tokio::sync::watch;

use ligandml_broker::{BrokerError, BrokerMessage, MessageConsumer};

pub(crate) enum Polled {
    Message(BrokerMessage),
    Empty,
    Failed(BrokerError),
    Shutdown,
}

/// Wait for the next message or the shutdown signal, whichever comes first.
/// A dropped shutdown sender counts as shutdown.
pub(crate) async fn next_message(
    consumer: &mut dyn MessageConsumer,
    timeout: Duration,
    shutdown: &mut watch::Receiver<bool>,
) -> Polled {
    if *shutdown.borrow() {
        return Polled::Shutdown;
    }
    tokio::select! {
        changed = shutdown.changed() => {
            if changed.is_err() || *shutdown.borrow() {
                Polled::Shutdown
            } else {
                Polled::Empty
            }
        }
        polled = consumer.poll(timeout) => match polled {
            Ok(Some(msg)) => Polled::Message(msg),
            Ok(None) => Polled::Empty,
            Err(e) => Polled::Failed(e),
        },
    }
}
