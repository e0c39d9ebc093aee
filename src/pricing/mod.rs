//! Price aggregator: fuses the two venue feeds into a queryable view.
//!
//! This module provides:
//! - Wire-shape normalization into the uniform tier ladder
//! - The `PriceBoard` holding the last valid tick per venue
//! - Mid-price and per-quantity effective sell price queries
//! - The per-venue bus ingest loops

pub mod ingest;
pub mod normalize;

pub use ingest::{run_price_ingest, BLACK_SPIRE_PRICES_TOPIC, MOS_ESPA_PRICES_TOPIC};
pub use normalize::{normalize_black_spire, normalize_mos_espa, NormalizeError};

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::watch;

use crate::clock::Clock;
use crate::domain::{Decimal, PriceTick, TimeMs, Venue};

/// Sequence number broadcast on every accepted tick, tagged with its venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickSignal {
    pub seq: u64,
    pub venue: Option<Venue>,
}

/// Shared view of the freshest tick per venue.
///
/// Writers are the ingest loops; readers are the LTV evaluator and the
/// liquidation workers. Staleness is judged against the injected clock at
/// query time, so a venue going quiet degrades to `None` without any
/// background sweeper.
#[derive(Debug)]
pub struct PriceBoard {
    clock: Arc<dyn Clock>,
    max_tick_age_ms: i64,
    ticks: RwLock<HashMap<Venue, PriceTick>>,
    malformed: AtomicU64,
    signal_tx: watch::Sender<TickSignal>,
}

impl PriceBoard {
    pub fn new(clock: Arc<dyn Clock>, max_tick_age_seconds: u64) -> Self {
        let (signal_tx, _) = watch::channel(TickSignal {
            seq: 0,
            venue: None,
        });
        Self {
            clock,
            max_tick_age_ms: (max_tick_age_seconds as i64) * 1_000,
            ticks: RwLock::new(HashMap::new()),
            malformed: AtomicU64::new(0),
            signal_tx,
        }
    }

    /// Store an accepted tick and wake subscribers.
    pub fn apply(&self, tick: PriceTick) {
        let venue = tick.venue;
        {
            let mut ticks = self.ticks.write().expect("price board poisoned");
            ticks.insert(venue, tick);
        }
        self.signal_tx.send_modify(|signal| {
            signal.seq += 1;
            signal.venue = Some(venue);
        });
    }

    /// Watch for accepted ticks. Rapid updates coalesce; subscribers re-read
    /// the board rather than the signal payload.
    pub fn subscribe(&self) -> watch::Receiver<TickSignal> {
        self.signal_tx.subscribe()
    }

    /// Last tick for the venue if it is still fresh, `None` when stale or
    /// never seen.
    pub fn latest(&self, venue: Venue) -> Option<PriceTick> {
        let now = self.clock.now();
        let ticks = self.ticks.read().expect("price board poisoned");
        ticks
            .get(&venue)
            .filter(|tick| self.is_fresh(tick, now))
            .cloned()
    }

    /// Mean of the venue best mids across all fresh venues; `None` when no
    /// venue is fresh.
    pub fn mid_price(&self) -> Option<Decimal> {
        let now = self.clock.now();
        let ticks = self.ticks.read().expect("price board poisoned");

        let mut sum = Decimal::zero();
        let mut count = 0u32;
        for venue in Venue::ALL {
            if let Some(tick) = ticks.get(&venue).filter(|t| self.is_fresh(t, now)) {
                if let Some(mid) = tick.best_mid() {
                    sum = sum + mid;
                    count += 1;
                }
            }
        }

        if count == 0 {
            None
        } else {
            Some(sum / Decimal::from_units(count))
        }
    }

    /// Sell price at `venue` for a lot of `qty`, using the smallest covering
    /// tier; `None` when the venue is stale.
    pub fn effective_sell_price(&self, venue: Venue, qty: u32) -> Option<Decimal> {
        self.latest(venue).and_then(|tick| tick.sell_price_for_qty(qty))
    }

    /// Count a dropped malformed feed message.
    pub fn record_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }

    /// Total malformed feed messages dropped since startup.
    pub fn malformed_count(&self) -> u64 {
        self.malformed.load(Ordering::Relaxed)
    }

    fn is_fresh(&self, tick: &PriceTick, now: TimeMs) -> bool {
        now.since(tick.received_at) <= self.max_tick_age_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::collections::BTreeMap;

    use crate::domain::{TierQuote, TIERS};

    fn dec(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    fn tick(venue: Venue, received_at: i64, sell_1: &str, buy_1: &str) -> PriceTick {
        let mut tiers = BTreeMap::new();
        for &t in &TIERS {
            tiers.insert(
                t,
                TierQuote {
                    buy: dec(buy_1),
                    sell: dec(sell_1),
                },
            );
        }
        PriceTick::new(venue, TimeMs::new(received_at), TimeMs::new(received_at), tiers).unwrap()
    }

    fn board_with_clock(start_ms: i64) -> (PriceBoard, ManualClock) {
        let clock = ManualClock::new(start_ms);
        let board = PriceBoard::new(Arc::new(clock.clone()), 30);
        (board, clock)
    }

    #[test]
    fn test_latest_returns_fresh_tick() {
        let (board, _clock) = board_with_clock(1_000);
        board.apply(tick(Venue::MosEspa, 1_000, "51", "49"));
        assert!(board.latest(Venue::MosEspa).is_some());
        assert!(board.latest(Venue::BlackSpire).is_none());
    }

    #[test]
    fn test_latest_expires_after_max_age() {
        let (board, clock) = board_with_clock(1_000);
        board.apply(tick(Venue::MosEspa, 1_000, "51", "49"));

        clock.advance_ms(30_000);
        assert!(board.latest(Venue::MosEspa).is_some());

        clock.advance_ms(1);
        assert!(board.latest(Venue::MosEspa).is_none());
    }

    #[test]
    fn test_mid_price_single_venue() {
        let (board, _clock) = board_with_clock(1_000);
        board.apply(tick(Venue::MosEspa, 1_000, "51", "49"));
        assert_eq!(board.mid_price().unwrap(), dec("50"));
    }

    #[test]
    fn test_mid_price_averages_fresh_venues() {
        let (board, _clock) = board_with_clock(1_000);
        board.apply(tick(Venue::MosEspa, 1_000, "51", "49"));
        board.apply(tick(Venue::BlackSpire, 1_000, "61", "59"));
        // (50 + 60) / 2
        assert_eq!(board.mid_price().unwrap(), dec("55"));
    }

    #[test]
    fn test_mid_price_ignores_stale_venue() {
        let (board, clock) = board_with_clock(1_000);
        board.apply(tick(Venue::MosEspa, 1_000, "51", "49"));
        clock.advance_ms(31_000);
        board.apply(tick(Venue::BlackSpire, 32_000, "61", "59"));

        assert_eq!(board.mid_price().unwrap(), dec("60"));
    }

    #[test]
    fn test_mid_price_unknown_when_all_stale() {
        let (board, clock) = board_with_clock(1_000);
        board.apply(tick(Venue::MosEspa, 1_000, "51", "49"));
        clock.advance_ms(120_000);
        assert!(board.mid_price().is_none());
    }

    #[test]
    fn test_effective_sell_price_stale_is_none() {
        let (board, clock) = board_with_clock(1_000);
        board.apply(tick(Venue::MosEspa, 1_000, "51", "49"));
        assert_eq!(board.effective_sell_price(Venue::MosEspa, 10).unwrap(), dec("51"));

        clock.advance_ms(60_000);
        assert!(board.effective_sell_price(Venue::MosEspa, 10).is_none());
    }

    #[tokio::test]
    async fn test_subscribe_signals_applied_ticks() {
        let (board, _clock) = board_with_clock(1_000);
        let mut rx = board.subscribe();
        assert_eq!(rx.borrow().seq, 0);

        board.apply(tick(Venue::BlackSpire, 1_000, "51", "49"));
        rx.changed().await.unwrap();
        let signal = *rx.borrow_and_update();
        assert_eq!(signal.seq, 1);
        assert_eq!(signal.venue, Some(Venue::BlackSpire));
    }

    #[test]
    fn test_malformed_counter() {
        let (board, _clock) = board_with_clock(0);
        board.record_malformed();
        board.record_malformed();
        assert_eq!(board.malformed_count(), 2);
    }
}
