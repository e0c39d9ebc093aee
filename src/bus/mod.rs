//! Message bus abstraction.
//!
//! The broker itself is an opaque peer; the core only needs publish and
//! subscribe. Production uses the HTTP bridge client, tests use the
//! in-memory bus.

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

pub mod http;
pub mod memory;
pub mod publisher;

pub use http::HttpBus;
pub use memory::InMemoryBus;
pub use publisher::EventPublisher;

/// Error type for bus operations.
#[derive(Debug, Clone, Error)]
pub enum BusError {
    #[error("publish failed: {0}")]
    Publish(String),
    #[error("subscribe failed: {0}")]
    Subscribe(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("subscription closed")]
    Closed,
}

/// A live subscription yielding messages from one topic.
#[async_trait]
pub trait Subscription: Send {
    /// Wait for the next message. `BusError::Closed` means the subscription
    /// is gone for good and the caller should resubscribe.
    async fn next(&mut self) -> Result<serde_json::Value, BusError>;
}

/// Publish/subscribe seam over the message broker.
///
/// Delivery is at-least-once in both directions; consumers de-duplicate on
/// event ids.
#[async_trait]
pub trait MessageBus: Send + Sync + fmt::Debug {
    /// Publish a message; returns only once the broker acknowledged it.
    async fn publish(&self, topic: &str, payload: serde_json::Value) -> Result<(), BusError>;

    /// Open a subscription to a topic.
    async fn subscribe(&self, topic: &str) -> Result<Box<dyn Subscription>, BusError>;
}
