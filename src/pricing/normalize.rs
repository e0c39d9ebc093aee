//! Feed normalization: two venue wire shapes into the uniform tier ladder.
//!
//! Any parse failure invalidates the whole message; a tick is only produced
//! when all four tiers carry valid prices.

use std::collections::BTreeMap;
use thiserror::Error;

use crate::domain::{Decimal, PriceTick, TierQuote, TimeMs, Venue, TIERS};

/// The only Black Spire stream item that maps to Beskar; other items are
/// dropped without being counted as malformed.
const BLACK_SPIRE_BSK_ITEM: &str = "BSK";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error("missing field: {0}")]
    MissingField(String),
    #[error("invalid price: {0}")]
    BadPrice(String),
    #[error("invalid timestamp: {0}")]
    BadTimestamp(String),
    #[error("ladder is missing tier {0}")]
    MissingTier(u32),
}

/// Normalize a Mos Espa price message.
///
/// Wire shape: `{timestamp: RFC 3339, ladder: [{quantity, buy, sell}, ...]}`
/// with prices as decimal strings.
pub fn normalize_mos_espa(
    message: &serde_json::Value,
    received_at: TimeMs,
) -> Result<PriceTick, NormalizeError> {
    let timestamp_str = message
        .get("timestamp")
        .and_then(|v| v.as_str())
        .ok_or_else(|| NormalizeError::MissingField("timestamp".to_string()))?;
    let source_timestamp = chrono::DateTime::parse_from_rfc3339(timestamp_str)
        .map_err(|_| NormalizeError::BadTimestamp(timestamp_str.to_string()))?
        .timestamp_millis();

    let ladder = message
        .get("ladder")
        .and_then(|v| v.as_array())
        .ok_or_else(|| NormalizeError::MissingField("ladder".to_string()))?;

    let mut tiers = BTreeMap::new();
    for entry in ladder {
        let quantity = parse_quantity(entry.get("quantity"))?;
        let buy = parse_price(entry.get("buy"), "buy")?;
        let sell = parse_price(entry.get("sell"), "sell")?;
        tiers.insert(quantity, TierQuote { buy, sell });
    }

    build_tick(Venue::MosEspa, received_at, TimeMs::new(source_timestamp), tiers)
}

/// Normalize a Black Spire price message.
///
/// Wire shape: `{item, time (unix seconds), buy: [{amount, price}],
/// sell: [{amount, price}]}`. Returns `Ok(None)` for non-BSK items, which
/// are dropped silently rather than counted as malformed.
pub fn normalize_black_spire(
    message: &serde_json::Value,
    received_at: TimeMs,
) -> Result<Option<PriceTick>, NormalizeError> {
    let item = message
        .get("item")
        .and_then(|v| v.as_str())
        .ok_or_else(|| NormalizeError::MissingField("item".to_string()))?;
    if item != BLACK_SPIRE_BSK_ITEM {
        return Ok(None);
    }

    let time_secs = message
        .get("time")
        .and_then(|v| v.as_i64())
        .ok_or_else(|| NormalizeError::MissingField("time".to_string()))?;
    let source_timestamp = TimeMs::new(time_secs * 1_000);

    let buys = side_quotes(message, "buy")?;
    let sells = side_quotes(message, "sell")?;

    let mut tiers = BTreeMap::new();
    for &tier in &TIERS {
        let buy = *buys
            .get(&tier)
            .ok_or(NormalizeError::MissingTier(tier))?;
        let sell = *sells
            .get(&tier)
            .ok_or(NormalizeError::MissingTier(tier))?;
        tiers.insert(tier, TierQuote { buy, sell });
    }

    build_tick(Venue::BlackSpire, received_at, source_timestamp, tiers).map(Some)
}

fn side_quotes(
    message: &serde_json::Value,
    side: &str,
) -> Result<BTreeMap<u32, Decimal>, NormalizeError> {
    let entries = message
        .get(side)
        .and_then(|v| v.as_array())
        .ok_or_else(|| NormalizeError::MissingField(side.to_string()))?;

    let mut quotes = BTreeMap::new();
    for entry in entries {
        let amount = parse_quantity(entry.get("amount"))?;
        let price = parse_price(entry.get("price"), "price")?;
        quotes.insert(amount, price);
    }
    Ok(quotes)
}

fn build_tick(
    venue: Venue,
    received_at: TimeMs,
    source_timestamp: TimeMs,
    tiers: BTreeMap<u32, TierQuote>,
) -> Result<PriceTick, NormalizeError> {
    if let Some(&missing) = TIERS.iter().find(|t| !tiers.contains_key(t)) {
        return Err(NormalizeError::MissingTier(missing));
    }
    PriceTick::new(venue, received_at, source_timestamp, tiers)
        .ok_or(NormalizeError::MissingTier(0))
}

fn parse_quantity(value: Option<&serde_json::Value>) -> Result<u32, NormalizeError> {
    let value = value.ok_or_else(|| NormalizeError::MissingField("quantity".to_string()))?;
    match value {
        serde_json::Value::Number(n) => n
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| NormalizeError::BadPrice(value.to_string())),
        serde_json::Value::String(s) => s
            .parse::<u32>()
            .map_err(|_| NormalizeError::BadPrice(s.clone())),
        other => Err(NormalizeError::BadPrice(other.to_string())),
    }
}

fn parse_price(
    value: Option<&serde_json::Value>,
    field: &str,
) -> Result<Decimal, NormalizeError> {
    let value = value.ok_or_else(|| NormalizeError::MissingField(field.to_string()))?;
    let text = match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        other => return Err(NormalizeError::BadPrice(other.to_string())),
    };
    Decimal::from_str_canonical(&text).map_err(|_| NormalizeError::BadPrice(text))
}
