//! In-memory bus for tests and single-process runs.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;

use super::{BusError, MessageBus, Subscription};

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast-channel bus. Every published message is also kept in a log so
/// tests can assert on exactly what was emitted.
#[derive(Debug, Default)]
pub struct InMemoryBus {
    topics: Mutex<HashMap<String, broadcast::Sender<serde_json::Value>>>,
    log: Mutex<Vec<(String, serde_json::Value)>>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn sender_for(&self, topic: &str) -> broadcast::Sender<serde_json::Value> {
        let mut topics = self.topics.lock().expect("bus topic map poisoned");
        topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    /// All messages published to a topic, in order.
    pub fn published(&self, topic: &str) -> Vec<serde_json::Value> {
        self.log
            .lock()
            .expect("bus log poisoned")
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, payload)| payload.clone())
            .collect()
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn publish(&self, topic: &str, payload: serde_json::Value) -> Result<(), BusError> {
        self.log
            .lock()
            .expect("bus log poisoned")
            .push((topic.to_string(), payload.clone()));
        // No receiver yet is fine; the log still records the publish.
        let _ = self.sender_for(topic).send(payload);
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<Box<dyn Subscription>, BusError> {
        Ok(Box::new(InMemorySubscription {
            rx: self.sender_for(topic).subscribe(),
        }))
    }
}

struct InMemorySubscription {
    rx: broadcast::Receiver<serde_json::Value>,
}

#[async_trait]
impl Subscription for InMemorySubscription {
    async fn next(&mut self) -> Result<serde_json::Value, BusError> {
        loop {
            match self.rx.recv().await {
                Ok(payload) => return Ok(payload),
                // Fell behind; skip to the oldest retained message.
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return Err(BusError::Closed),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let bus = InMemoryBus::new();
        let mut sub = bus.subscribe("prices").await.unwrap();

        bus.publish("prices", serde_json::json!({"tick": 1}))
            .await
            .unwrap();

        let msg = sub.next().await.unwrap();
        assert_eq!(msg["tick"], 1);
    }

    #[tokio::test]
    async fn test_publish_without_subscriber_is_logged() {
        let bus = InMemoryBus::new();
        bus.publish("events", serde_json::json!({"eventType": "application"}))
            .await
            .unwrap();

        let log = bus.published("events");
        assert_eq!(log.len(), 1);
        assert_eq!(log[0]["eventType"], "application");
        assert!(bus.published("other").is_empty());
    }

    #[tokio::test]
    async fn test_topics_are_isolated() {
        let bus = InMemoryBus::new();
        let mut prices = bus.subscribe("prices").await.unwrap();

        bus.publish("events", serde_json::json!({"n": 1})).await.unwrap();
        bus.publish("prices", serde_json::json!({"n": 2})).await.unwrap();

        let msg = prices.next().await.unwrap();
        assert_eq!(msg["n"], 2);
    }
}
