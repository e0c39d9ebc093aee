//! Black Spire Outpost order client.
//!
//! `POST /market/orders` trading the `STEEL:MANDALORIAN` SKU (the outpost's
//! name for beskar steel). Amounts are JSON numbers and a fill reports the
//! total price directly.

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::prelude::ToPrimitive;
use std::time::Duration;
use tracing::debug;

use super::{SellOrder, VenueClient, VenueError, VenueFill};
use crate::domain::{Decimal, Venue};

const ITEM: &str = "STEEL:MANDALORIAN";

#[derive(Debug, Clone)]
pub struct BlackSpireClient {
    client: Client,
    base_url: String,
}

impl BlackSpireClient {
    pub fn new(base_url: String, timeout_ms: u64) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl VenueClient for BlackSpireClient {
    fn venue(&self) -> Venue {
        Venue::BlackSpire
    }

    async fn sell(&self, order: &SellOrder) -> Result<VenueFill, VenueError> {
        let url = format!("{}/market/orders", self.base_url);
        let amount = order
            .quantity
            .inner()
            .to_f64()
            .ok_or_else(|| VenueError::Parse(format!("unrepresentable amount {}", order.quantity)))?;
        let payload = serde_json::json!({
            "requestId": order.client_order_id,
            "side": "SELL",
            "item": ITEM,
            "amount": amount,
        });

        debug!(request_id = %order.client_order_id, quantity = %order.quantity, "Posting Black Spire sell order");

        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| VenueError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(VenueError::Http {
                status: status.as_u16(),
            });
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| VenueError::Parse(e.to_string()))?;

        parse_fill(&body, order.quantity)
    }
}

/// HTTP 200 bodies carry either a fill or an `error` field.
fn parse_fill(body: &serde_json::Value, quantity: Decimal) -> Result<VenueFill, VenueError> {
    if let Some(error) = body.get("error").and_then(|v| v.as_str()) {
        return Err(VenueError::Rejected {
            reason: error.to_string(),
        });
    }

    let order_id = body
        .get("id")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .or_else(|| body.get("id").and_then(|v| v.as_i64()).map(|n| n.to_string()))
        .ok_or_else(|| VenueError::Parse("missing id field".to_string()))?;

    let total_price = body
        .get("totalPrice")
        .ok_or_else(|| VenueError::Parse("missing totalPrice field".to_string()))?;
    let proceeds_gc = match total_price {
        serde_json::Value::String(s) => Decimal::from_str_canonical(s),
        serde_json::Value::Number(n) => Decimal::from_str_canonical(&n.to_string()),
        other => {
            return Err(VenueError::Parse(format!(
                "unexpected totalPrice: {}",
                other
            )))
        }
    }
    .map_err(|e| VenueError::Parse(format!("invalid totalPrice: {}", e)))?;

    Ok(VenueFill {
        order_id,
        quantity,
        proceeds_gc,
    })
}
