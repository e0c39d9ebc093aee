//! Scripted venue for tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use super::{SellOrder, VenueClient, VenueError, VenueFill};
use crate::domain::{Decimal, Venue};

/// One scripted response.
#[derive(Debug, Clone)]
pub enum MockOutcome {
    /// Fill at the given per-unit price.
    FillAt(Decimal),
    /// Logical rejection, the way the simulated venues fail.
    Reject(String),
    /// Transport-level failure.
    NetworkError,
}

/// Venue double that replays a script of outcomes, then falls back to
/// filling at a default price. Records every order it saw.
#[derive(Debug)]
pub struct MockVenue {
    venue: Venue,
    default_price: Decimal,
    script: Mutex<VecDeque<MockOutcome>>,
    orders: Mutex<Vec<SellOrder>>,
}

impl MockVenue {
    pub fn new(venue: Venue, default_price: Decimal) -> Self {
        Self {
            venue,
            default_price,
            script: Mutex::new(VecDeque::new()),
            orders: Mutex::new(Vec::new()),
        }
    }

    /// Queue an outcome for the next unseen order.
    pub fn push_outcome(&self, outcome: MockOutcome) {
        self.script
            .lock()
            .expect("mock venue script poisoned")
            .push_back(outcome);
    }

    /// Every order received, in arrival order.
    pub fn orders(&self) -> Vec<SellOrder> {
        self.orders
            .lock()
            .expect("mock venue orders poisoned")
            .clone()
    }

    /// Quantities of filled and rejected orders alike.
    pub fn order_count(&self) -> usize {
        self.orders
            .lock()
            .expect("mock venue orders poisoned")
            .len()
    }
}

#[async_trait]
impl VenueClient for MockVenue {
    fn venue(&self) -> Venue {
        self.venue
    }

    async fn sell(&self, order: &SellOrder) -> Result<VenueFill, VenueError> {
        self.orders
            .lock()
            .expect("mock venue orders poisoned")
            .push(order.clone());

        let outcome = self
            .script
            .lock()
            .expect("mock venue script poisoned")
            .pop_front()
            .unwrap_or(MockOutcome::FillAt(self.default_price));

        match outcome {
            MockOutcome::FillAt(unit_price) => Ok(VenueFill {
                order_id: format!("{}-{}", self.venue.as_str(), self.order_count()),
                quantity: order.quantity,
                proceeds_gc: order.quantity * unit_price,
            }),
            MockOutcome::Reject(reason) => Err(VenueError::Rejected { reason }),
            MockOutcome::NetworkError => {
                Err(VenueError::Network("connection reset".to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    #[tokio::test]
    async fn test_script_then_default() {
        let venue = MockVenue::new(Venue::MosEspa, dec("50"));
        venue.push_outcome(MockOutcome::Reject("no buyers".to_string()));

        let order = SellOrder {
            client_order_id: "c-1".to_string(),
            quantity: dec("10"),
        };

        assert!(matches!(
            venue.sell(&order).await,
            Err(VenueError::Rejected { .. })
        ));

        let fill = venue.sell(&order).await.unwrap();
        assert_eq!(fill.proceeds_gc, dec("500"));
        assert_eq!(venue.order_count(), 2);
    }
}
