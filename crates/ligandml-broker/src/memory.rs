//! In-process broker.
//!
//! One FIFO queue shared by every handle. A consumer takes the oldest message
//! whose topic it subscribed to, so each message is delivered exactly once
//! regardless of consumer group.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

use crate::{BrokerConnector, BrokerError, BrokerMessage, MessageConsumer, MessageProducer, Result};

#[derive(Default)]
struct Inner {
    queue: Mutex<VecDeque<BrokerMessage>>,
    notify: Notify,
    failing_connects: AtomicU32,
}

impl Inner {
    fn queue(&self) -> MutexGuard<'_, VecDeque<BrokerMessage>> {
        self.queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[derive(Clone, Default)]
pub struct MemoryBroker {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for MemoryBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBroker")
            .field("pending", &self.pending())
            .finish()
    }
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a message and wake waiting consumers.
    pub fn send(&self, topic: &str, payload: &[u8]) {
        self.inner.queue().push_back(BrokerMessage::new(topic, payload));
        self.inner.notify.notify_waiters();
    }

    /// Messages not yet consumed.
    pub fn pending(&self) -> usize {
        self.inner.queue().len()
    }

    /// Make the next `n` connection attempts fail.
    pub fn fail_connects(&self, n: u32) {
        self.inner.failing_connects.store(n, Ordering::SeqCst);
    }

    pub fn subscribe(&self, topics: &[&str]) -> MemoryConsumer {
        MemoryConsumer {
            inner: Arc::clone(&self.inner),
            topics: topics.iter().map(|t| t.to_string()).collect(),
        }
    }

    fn check_connect(&self) -> Result<()> {
        let failing = self
            .inner
            .failing_connects
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match failing {
            Ok(_) => Err(BrokerError::Connection("broker unavailable".to_string())),
            Err(_) => Ok(()),
        }
    }
}

pub struct MemoryConsumer {
    inner: Arc<Inner>,
    topics: HashSet<String>,
}

impl MemoryConsumer {
    fn take(&self) -> Option<BrokerMessage> {
        let mut queue = self.inner.queue();
        let idx = queue.iter().position(|m| self.topics.contains(&m.topic))?;
        queue.remove(idx)
    }
}

#[async_trait]
impl MessageConsumer for MemoryConsumer {
    async fn poll(&mut self, timeout: Duration) -> Result<Option<BrokerMessage>> {
        let deadline = Instant::now() + timeout;
        loop {
            // Register interest before checking the queue so a send between
            // the check and the wait is not missed
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(msg) = self.take() {
                return Ok(Some(msg));
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }
}

#[async_trait]
impl MessageProducer for MemoryBroker {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<()> {
        self.send(topic, payload);
        debug!(topic, bytes = payload.len(), "Published message");
        Ok(())
    }
}

#[async_trait]
impl BrokerConnector for MemoryBroker {
    async fn consumer(&self, _group_id: &str, topics: &[&str]) -> Result<Box<dyn MessageConsumer>> {
        self.check_connect()?;
        Ok(Box::new(self.subscribe(topics)))
    }

    async fn producer(&self) -> Result<Arc<dyn MessageProducer>> {
        self.check_connect()?;
        Ok(Arc::new(self.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_delivers_only_subscribed_topics_in_order() {
        let broker = MemoryBroker::new();
        broker.send("a", b"1");
        broker.send("b", b"2");
        broker.send("a", b"3");

        let mut consumer = broker.subscribe(&["a"]);
        let timeout = Duration::from_millis(10);
        assert_eq!(consumer.poll(timeout).await.unwrap().unwrap().payload, b"1");
        assert_eq!(consumer.poll(timeout).await.unwrap().unwrap().payload, b"3");
        assert!(consumer.poll(timeout).await.unwrap().is_none());
        assert_eq!(broker.pending(), 1);
    }

    #[tokio::test]
    async fn test_poll_wakes_on_publish() {
        let broker = MemoryBroker::new();
        let mut consumer = broker.subscribe(&["jobs"]);

        let producer = broker.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            producer.publish("jobs", b"hello").await.unwrap();
        });

        let msg = consumer.poll(Duration::from_secs(5)).await.unwrap();
        assert_eq!(msg, Some(BrokerMessage::new("jobs", b"hello".to_vec())));
    }

    #[tokio::test]
    async fn test_each_message_delivered_once() {
        let broker = MemoryBroker::new();
        let mut first = broker.subscribe(&["t"]);
        let mut second = broker.subscribe(&["t"]);
        broker.send("t", b"only");

        let timeout = Duration::from_millis(10);
        let a = first.poll(timeout).await.unwrap();
        let b = second.poll(timeout).await.unwrap();
        assert_eq!(a.is_some() as u8 + b.is_some() as u8, 1);
    }

    #[tokio::test]
    async fn test_fail_connects_counts_down() {
        let broker = MemoryBroker::new();
        broker.fail_connects(2);
        assert!(broker.producer().await.is_err());
        assert!(broker.consumer("g", &["t"]).await.is_err());
        assert!(broker.producer().await.is_ok());
    }
}
