//! HTTP bridge client for the message broker.
//!
//! The broker exposes a small REST bridge: publishes POST to a topic, and
//! subscribers long-poll a per-subscription endpoint that hands back batches
//! of messages.

use async_trait::async_trait;
use reqwest::Client;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::debug;

use super::{BusError, MessageBus, Subscription};

const POLL_WAIT_SECONDS: u32 = 20;

/// Bus client over the broker's HTTP bridge.
#[derive(Debug, Clone)]
pub struct HttpBus {
    client: Client,
    endpoint: String,
}

impl HttpBus {
    /// Create a client against the given bridge endpoint.
    pub fn new(endpoint: String) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            // Long-poll responses may legitimately hang for POLL_WAIT_SECONDS.
            .timeout(Duration::from_secs(POLL_WAIT_SECONDS as u64 + 10))
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl MessageBus for HttpBus {
    async fn publish(&self, topic: &str, payload: serde_json::Value) -> Result<(), BusError> {
        let url = format!("{}/topics/{}/messages", self.endpoint, topic);
        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| BusError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BusError::Publish(format!(
                "broker returned {} for topic {}",
                status, topic
            )));
        }

        debug!(topic, "Published message to bus");
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<Box<dyn Subscription>, BusError> {
        Ok(Box::new(HttpSubscription {
            client: self.client.clone(),
            url: format!(
                "{}/topics/{}/poll?wait={}",
                self.endpoint, topic, POLL_WAIT_SECONDS
            ),
            buffered: VecDeque::new(),
        }))
    }
}

struct HttpSubscription {
    client: Client,
    url: String,
    buffered: VecDeque<serde_json::Value>,
}

#[async_trait]
impl Subscription for HttpSubscription {
    async fn next(&mut self) -> Result<serde_json::Value, BusError> {
        loop {
            if let Some(message) = self.buffered.pop_front() {
                return Ok(message);
            }

            let response = self
                .client
                .get(&self.url)
                .send()
                .await
                .map_err(|e| BusError::Network(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                return Err(BusError::Subscribe(format!("broker returned {}", status)));
            }

            let batch: Vec<serde_json::Value> = response
                .json()
                .await
                .map_err(|e| BusError::Parse(e.to_string()))?;
            self.buffered.extend(batch);
            // An empty batch just means the long-poll timed out; poll again.
        }
    }
}
