//! Domain primitives: TimeMs, LoanId, BorrowerId, RequestId, Venue.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Externally-supplied opaque identifiers are capped at this length.
pub const MAX_ID_LEN: usize = 128;

/// Time in milliseconds since Unix epoch.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct TimeMs(pub i64);

impl TimeMs {
    /// Create a TimeMs from milliseconds.
    pub fn new(ms: i64) -> Self {
        TimeMs(ms)
    }

    /// Get the underlying milliseconds value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }

    /// Alias for `as_i64`, to match `*_ms` conventions.
    pub fn as_ms(&self) -> i64 {
        self.0
    }

    /// Milliseconds elapsed since `earlier` (zero if `earlier` is later).
    pub fn since(&self, earlier: TimeMs) -> i64 {
        self.0.saturating_sub(earlier.0)
    }

    /// RFC 3339 rendering, for response timestamps.
    pub fn to_rfc3339(&self) -> String {
        chrono::DateTime::from_timestamp_millis(self.0)
            .unwrap_or_default()
            .to_rfc3339()
    }
}

/// Error for opaque identifier parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdParseError {
    /// Identifier is empty after trimming.
    Empty,
    /// Identifier exceeds [`MAX_ID_LEN`] characters.
    TooLong(usize),
}

impl fmt::Display for IdParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdParseError::Empty => write!(f, "identifier cannot be empty"),
            IdParseError::TooLong(len) => write!(
                f,
                "identifier must be at most {} characters, got {}",
                MAX_ID_LEN, len
            ),
        }
    }
}

impl std::error::Error for IdParseError {}

fn parse_opaque_id(s: &str) -> Result<String, IdParseError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(IdParseError::Empty);
    }
    if s.len() > MAX_ID_LEN {
        return Err(IdParseError::TooLong(s.len()));
    }
    Ok(s.to_string())
}

/// Externally-assigned loan identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LoanId(pub String);

impl LoanId {
    /// Wrap a raw string without validation.
    pub fn new(id: impl Into<String>) -> Self {
        LoanId(id.into())
    }

    /// Get the identifier as a string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LoanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for LoanId {
    type Err = IdParseError;

    /// Parse and validate: non-empty, at most [`MAX_ID_LEN`] characters.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_opaque_id(s).map(LoanId)
    }
}

/// Borrower identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BorrowerId(pub String);

impl BorrowerId {
    /// Wrap a raw string without validation.
    pub fn new(id: impl Into<String>) -> Self {
        BorrowerId(id.into())
    }

    /// Get the identifier as a string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BorrowerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for BorrowerId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_opaque_id(s).map(BorrowerId)
    }
}

/// Caller-supplied idempotency key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

impl RequestId {
    /// Wrap a raw string without validation.
    pub fn new(id: impl Into<String>) -> Self {
        RequestId(id.into())
    }

    /// Get the identifier as a string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RequestId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_opaque_id(s).map(RequestId)
    }
}

/// One of the two trading venues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Venue {
    MosEspa,
    BlackSpire,
}

impl Venue {
    /// All venues, in deterministic tie-break order (Mos Espa first).
    pub const ALL: [Venue; 2] = [Venue::MosEspa, Venue::BlackSpire];

    /// Canonical wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Venue::MosEspa => "MOS_ESPA",
            Venue::BlackSpire => "BLACK_SPIRE",
        }
    }
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Venue {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MOS_ESPA" => Ok(Venue::MosEspa),
            "BLACK_SPIRE" => Ok(Venue::BlackSpire),
            other => Err(format!("unknown venue: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opaque_id_rejects_empty() {
        assert_eq!(LoanId::from_str(""), Err(IdParseError::Empty));
        assert_eq!(LoanId::from_str("   "), Err(IdParseError::Empty));
    }

    #[test]
    fn test_opaque_id_rejects_too_long() {
        let long = "x".repeat(129);
        assert_eq!(BorrowerId::from_str(&long), Err(IdParseError::TooLong(129)));
    }

    #[test]
    fn test_opaque_id_accepts_max_len() {
        let max = "x".repeat(128);
        assert!(RequestId::from_str(&max).is_ok());
    }

    #[test]
    fn test_opaque_id_trims() {
        let id = LoanId::from_str("  L-1  ").unwrap();
        assert_eq!(id.as_str(), "L-1");
    }

    #[test]
    fn test_venue_roundtrip() {
        for venue in Venue::ALL {
            assert_eq!(Venue::from_str(venue.as_str()).unwrap(), venue);
        }
        assert!(Venue::from_str("CORUSCANT").is_err());
    }

    #[test]
    fn test_venue_tie_break_order() {
        assert_eq!(Venue::ALL[0], Venue::MosEspa);
    }

    #[test]
    fn test_timems_since() {
        let t1 = TimeMs::new(1000);
        let t2 = TimeMs::new(4000);
        assert_eq!(t2.since(t1), 3000);
        assert_eq!(t1.since(t2), 0);
    }
}
