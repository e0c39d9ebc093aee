//! Trading venue adapters.
//!
//! Each venue speaks its own dialect over HTTP; the adapters translate a
//! uniform sell order into the venue payload and the venue response into a
//! uniform fill. Venues fail "successfully" a large fraction of the time
//! (HTTP 200 with a failure body), so logical rejections are first-class
//! outcomes here, not parse errors.

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

pub mod black_spire;
pub mod mock;
pub mod mos_espa;

pub use black_spire::BlackSpireClient;
pub use mock::{MockOutcome, MockVenue};
pub use mos_espa::MosEspaClient;

use crate::domain::{Decimal, Venue};

/// A market sell order for BSK against GC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SellOrder {
    /// Correlation id, fresh on every attempt so the venue does not
    /// de-duplicate a retry of a failed attempt.
    pub client_order_id: String,
    /// BSK quantity to sell.
    pub quantity: Decimal,
}

/// A completed sale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VenueFill {
    /// Venue-assigned order id.
    pub order_id: String,
    /// BSK quantity sold.
    pub quantity: Decimal,
    /// Total GC realized.
    pub proceeds_gc: Decimal,
}

/// Error type for venue order calls.
///
/// The liquidation worker treats every variant as retryable: a logical
/// rejection from the simulated counterparty carries no more signal than a
/// timeout.
#[derive(Debug, Clone, Error)]
pub enum VenueError {
    #[error("venue rejected order: {reason}")]
    Rejected { reason: String },
    #[error("venue returned HTTP {status}")]
    Http { status: u16 },
    #[error("network error: {0}")]
    Network(String),
    #[error("parse error: {0}")]
    Parse(String),
}

/// Order execution seam for one venue.
#[async_trait]
pub trait VenueClient: Send + Sync + fmt::Debug {
    /// Which venue this client trades on.
    fn venue(&self) -> Venue;

    /// Place a market sell order and wait for the fill.
    async fn sell(&self, order: &SellOrder) -> Result<VenueFill, VenueError>;
}
