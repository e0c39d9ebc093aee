//! Price ticks: per-venue tier ladders of buy/sell quotes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::{Decimal, TimeMs, Venue};

/// The fixed quantity tiers every venue quotes.
pub const TIERS: [u32; 4] = [1, 10, 50, 100];

/// A buy/sell quote pair at one quantity tier, in GC per BSK.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierQuote {
    pub buy: Decimal,
    pub sell: Decimal,
}

/// A normalized per-venue price snapshot.
///
/// The ladder always contains exactly the four tiers of [`TIERS`]; feeds
/// omitting a tier never produce a tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceTick {
    pub venue: Venue,
    /// When the service received the message.
    pub received_at: TimeMs,
    /// The timestamp the venue stamped on the message.
    pub source_timestamp: TimeMs,
    /// Tier quantity -> quote, keyed by the quantities in [`TIERS`].
    pub tiers: BTreeMap<u32, TierQuote>,
}

impl PriceTick {
    /// Build a tick, verifying the ladder covers all four tiers.
    pub fn new(
        venue: Venue,
        received_at: TimeMs,
        source_timestamp: TimeMs,
        tiers: BTreeMap<u32, TierQuote>,
    ) -> Option<Self> {
        if TIERS.iter().any(|t| !tiers.contains_key(t)) {
            return None;
        }
        Some(PriceTick {
            venue,
            received_at,
            source_timestamp,
            tiers,
        })
    }

    /// Quote at exactly the given tier.
    pub fn quote_at(&self, tier: u32) -> Option<&TierQuote> {
        self.tiers.get(&tier)
    }

    /// Sell price for the smallest tier covering `qty`; quantities beyond the
    /// largest tier fall back to the 100 tier as the worst-case approximation.
    pub fn sell_price_for_qty(&self, qty: u32) -> Option<Decimal> {
        let tier = TIERS.iter().find(|&&t| t >= qty).copied().unwrap_or(100);
        self.tiers.get(&tier).map(|q| q.sell)
    }

    /// The venue's own mid at quantity 1: (sell_1 + buy_1) / 2.
    pub fn best_mid(&self) -> Option<Decimal> {
        let q = self.tiers.get(&1)?;
        Some((q.sell + q.buy) / (Decimal::one() + Decimal::one()))
    }
}
