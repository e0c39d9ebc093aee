//! Per-venue price ingest loops.
//!
//! One task per venue topic: subscribe, normalize, apply. Subscription loss
//! is retried with backoff while the board keeps serving the last tick until
//! it ages out.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::normalize::{normalize_black_spire, normalize_mos_espa};
use super::PriceBoard;
use crate::bus::MessageBus;
use crate::clock::Clock;
use crate::domain::Venue;

/// Mos Espa publishes its ladder here.
pub const MOS_ESPA_PRICES_TOPIC: &str = "tatooine-mos-espa-prices";
/// Black Spire Outpost publishes its per-item quote stream here.
pub const BLACK_SPIRE_PRICES_TOPIC: &str = "batuu-black-spire-outpost-price-stream";

const RESUBSCRIBE_INITIAL: Duration = Duration::from_secs(1);
const RESUBSCRIBE_CAP: Duration = Duration::from_secs(30);

/// Topic for a venue's price stream.
pub fn topic_for(venue: Venue) -> &'static str {
    match venue {
        Venue::MosEspa => MOS_ESPA_PRICES_TOPIC,
        Venue::BlackSpire => BLACK_SPIRE_PRICES_TOPIC,
    }
}

/// Run the ingest loop for one venue until the process shuts down.
pub async fn run_price_ingest(
    bus: Arc<dyn MessageBus>,
    board: Arc<PriceBoard>,
    clock: Arc<dyn Clock>,
    venue: Venue,
) {
    let topic = topic_for(venue);
    let mut retry_delay = RESUBSCRIBE_INITIAL;

    loop {
        let mut subscription = match bus.subscribe(topic).await {
            Ok(sub) => {
                retry_delay = RESUBSCRIBE_INITIAL;
                sub
            }
            Err(e) => {
                warn!(venue = %venue, topic, error = %e, "Price subscription failed, retrying");
                tokio::time::sleep(retry_delay).await;
                retry_delay = (retry_delay * 2).min(RESUBSCRIBE_CAP);
                continue;
            }
        };

        loop {
            let message = match subscription.next().await {
                Ok(message) => message,
                Err(e) => {
                    warn!(venue = %venue, topic, error = %e, "Price subscription lost");
                    break;
                }
            };

            ingest_message(&board, clock.as_ref(), venue, &message);
        }
    }
}

/// Normalize and apply one feed message. Non-BSK Black Spire items are
/// skipped; anything else that fails to parse is counted and dropped.
pub fn ingest_message(
    board: &PriceBoard,
    clock: &dyn Clock,
    venue: Venue,
    message: &serde_json::Value,
) {
    let received_at = clock.now();

    let tick = match venue {
        Venue::MosEspa => match normalize_mos_espa(message, received_at) {
            Ok(tick) => Some(tick),
            Err(e) => {
                warn!(venue = %venue, error = %e, "Dropping malformed price message");
                board.record_malformed();
                None
            }
        },
        Venue::BlackSpire => match normalize_black_spire(message, received_at) {
            Ok(Some(tick)) => Some(tick),
            Ok(None) => {
                debug!(venue = %venue, "Skipping non-BSK item");
                None
            }
            Err(e) => {
                warn!(venue = %venue, error = %e, "Dropping malformed price message");
                board.record_malformed();
                None
            }
        },
    };

    if let Some(tick) = tick {
        debug!(venue = %venue, "Applied price tick");
        board.apply(tick);
    }
}
