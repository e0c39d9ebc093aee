//! Mos Espa order client.
//!
//! `POST /orders` with string-typed fields; a fill reports the per-unit
//! price, so proceeds are quantity x price.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use super::{SellOrder, VenueClient, VenueError, VenueFill};
use crate::domain::{Decimal, Venue};

const ASSET: &str = "BESKAR";
const CURRENCY: &str = "GC";

#[derive(Debug, Clone)]
pub struct MosEspaClient {
    client: Client,
    base_url: String,
}

impl MosEspaClient {
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
impl VenueClient for MosEspaClient {
    fn venue(&self) -> Venue {
        Venue::MosEspa
    }

    async fn sell(&self, order: &SellOrder) -> Result<VenueFill, VenueError> {
        let url = format!("{}/orders", self.base_url);
        let payload = serde_json::json!({
            "requestId": order.client_order_id,
            "type": "market",
            "side": "sell",
            "asset": ASSET,
            "currency": CURRENCY,
            "quantity": order.quantity.to_canonical_string(),
        });

        debug!(request_id = %order.client_order_id, quantity = %order.quantity, "Posting Mos Espa sell order");

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

/// HTTP 200 bodies carry either a fill or a logical failure.
fn parse_fill(body: &serde_json::Value, quantity: Decimal) -> Result<VenueFill, VenueError> {
    let success = body
        .get("success")
        .and_then(|v| v.as_bool())
        .ok_or_else(|| VenueError::Parse("missing success field".to_string()))?;

    if !success {
        let reason = body
            .get("reason")
            .and_then(|v| v.as_str())
            .unwrap_or("unspecified")
            .to_string();
        return Err(VenueError::Rejected { reason });
    }

    let order_id = body
        .get("orderId")
        .and_then(|v| v.as_str())
        .ok_or_else(|| VenueError::Parse("missing orderId field".to_string()))?
        .to_string();

    let price_str = body
        .get("price")
        .and_then(|v| v.as_str())
        .ok_or_else(|| VenueError::Parse("missing price field".to_string()))?;
    let unit_price = Decimal::from_str_canonical(price_str)
        .map_err(|e| VenueError::Parse(format!("invalid price: {}", e)))?;

    Ok(VenueFill {
        order_id,
        quantity,
        proceeds_gc: quantity * unit_price,
    })
}
