//! Outbound lifecycle event publisher.
//!
//! At-least-once: publishes are retried with backoff until the broker
//! acknowledges or the retry budget runs out. Every retry of one transition
//! carries the same deterministic event id, so consumers can collapse
//! duplicates.

use backoff::future::retry;
use backoff::ExponentialBackoff;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::{BusError, MessageBus};
use crate::domain::LoanEvent;

/// Publisher for the loan-events topic.
#[derive(Debug, Clone)]
pub struct EventPublisher {
    bus: Arc<dyn MessageBus>,
    topic: String,
    max_elapsed: Duration,
}

impl EventPublisher {
    pub fn new(bus: Arc<dyn MessageBus>, topic: String) -> Self {
        Self {
            bus,
            topic,
            max_elapsed: Duration::from_secs(30),
        }
    }

    /// Cap the total retry time (shortened in tests).
    pub fn with_max_elapsed(mut self, max_elapsed: Duration) -> Self {
        self.max_elapsed = max_elapsed;
        self
    }

    /// Publish a lifecycle event, retrying transient failures.
    ///
    /// An `Err` means delivery is uncertain: the caller must record that in
    /// the audit log and carry on, because the state transition has already
    /// committed.
    pub async fn publish(&self, event: &LoanEvent) -> Result<(), BusError> {
        let payload = event.to_payload();
        let event_id = event.event_id();

        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(self.max_elapsed),
            ..Default::default()
        };

        let result = retry(backoff, || async {
            self.bus
                .publish(&self.topic, payload.clone())
                .await
                .map_err(|e| {
                    warn!(
                        event_id = %event_id,
                        loan_id = %event.loan_id(),
                        error = %e,
                        "Bus publish attempt failed, will retry"
                    );
                    backoff::Error::transient(e)
                })
        })
        .await;

        match &result {
            Ok(()) => info!(
                event_id = %event_id,
                loan_id = %event.loan_id(),
                event_type = event.event_type(),
                "Published lifecycle event"
            ),
            Err(e) => warn!(
                event_id = %event_id,
                loan_id = %event.loan_id(),
                error = %e,
                "Giving up on bus publish; emission is uncertain"
            ),
        }

        result
    }
}
