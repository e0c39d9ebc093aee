//! Money-safe decimal arithmetic.
//!
//! Every GC amount, BSK quantity and price in the service flows through this
//! newtype over rust_decimal; binary floats never touch money. All wire
//! surfaces carry decimals as strings, so that is also the serde form.

use rust_decimal::Decimal as RustDecimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Slack for ratio-vs-threshold comparisons, so a loan sitting exactly on a
/// boundary does not flap between decisions as quotes wobble in the last
/// digit.
pub const LTV_EPSILON: &str = "0.000001";

/// Exact decimal amount. Wraps rust_decimal; serializes as a JSON string.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Decimal(#[serde(with = "rust_decimal::serde::str")] RustDecimal);

impl Decimal {
    /// Wrap an already-parsed rust_decimal value.
    pub fn new(value: RustDecimal) -> Self {
        Decimal(value)
    }

    /// Zero.
    pub fn zero() -> Self {
        Decimal(RustDecimal::ZERO)
    }

    /// One.
    pub fn one() -> Self {
        Decimal(RustDecimal::ONE)
    }

    /// One hundred, for percent-to-fraction conversions.
    pub fn hundred() -> Self {
        Decimal(RustDecimal::ONE_HUNDRED)
    }

    /// A whole-unit quantity from an integer count (tier sizes, lot counts).
    pub fn from_units(units: u32) -> Self {
        Decimal(RustDecimal::from(units))
    }

    /// Parse from a decimal string without precision loss.
    ///
    /// # Errors
    /// Fails when the input is not a decimal number.
    pub fn from_str_canonical(s: &str) -> Result<Self, rust_decimal::Error> {
        RustDecimal::from_str(s).map(Decimal)
    }

    /// Render for storage and the wire: plain notation, trailing zeros
    /// stripped, never an exponent.
    pub fn to_canonical_string(&self) -> String {
        format!("{}", self.0.normalize())
    }

    /// The wrapped rust_decimal value.
    pub fn inner(&self) -> RustDecimal {
        self.0
    }

    /// True for exactly zero.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// True for values strictly above zero.
    pub fn is_positive(&self) -> bool {
        !self.is_zero() && self.0.is_sign_positive()
    }

    /// True for values strictly below zero.
    pub fn is_negative(&self) -> bool {
        !self.is_zero() && self.0.is_sign_negative()
    }

    /// Magnitude without sign.
    pub fn abs(&self) -> Self {
        Decimal(self.0.abs())
    }

    /// Whichever of the two values is larger.
    pub fn max(self, other: Decimal) -> Decimal {
        if other > self {
            other
        } else {
            self
        }
    }

    /// Round up to whole units and return the count.
    ///
    /// Non-positive values count as zero; anything beyond `u32::MAX` units
    /// saturates.
    pub fn ceil_units(&self) -> u32 {
        if !self.is_positive() {
            return 0;
        }
        let whole = self.0.ceil();
        let units = whole.mantissa() / 10i128.pow(whole.scale());
        u32::try_from(units).unwrap_or(u32::MAX)
    }

    /// `self >= other`, give or take [`LTV_EPSILON`].
    pub fn gte_with_epsilon(&self, other: Decimal) -> bool {
        self.0 + epsilon() >= other.0
    }

    /// `self <= other`, give or take [`LTV_EPSILON`].
    pub fn lte_with_epsilon(&self, other: Decimal) -> bool {
        self.0 - epsilon() <= other.0
    }
}

fn epsilon() -> RustDecimal {
    RustDecimal::from_str(LTV_EPSILON).unwrap_or_default()
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_canonical_string())
    }
}

impl FromStr for Decimal {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str_canonical(s)
    }
}

impl From<RustDecimal> for Decimal {
    fn from(value: RustDecimal) -> Self {
        Decimal(value)
    }
}

impl From<Decimal> for RustDecimal {
    fn from(value: Decimal) -> Self {
        value.inner()
    }
}

impl std::ops::Add for Decimal {
    type Output = Decimal;

    fn add(self, other: Decimal) -> Decimal {
        Decimal(self.0 + other.0)
    }
}

impl std::ops::Sub for Decimal {
    type Output = Decimal;

    fn sub(self, other: Decimal) -> Decimal {
        Decimal(self.0 - other.0)
    }
}

impl std::ops::Mul for Decimal {
    type Output = Decimal;

    fn mul(self, other: Decimal) -> Decimal {
        Decimal(self.0 * other.0)
    }
}

impl std::ops::Div for Decimal {
    type Output = Decimal;

    fn div(self, other: Decimal) -> Decimal {
        Decimal(self.0 / other.0)
    }
}

impl std::ops::Neg for Decimal {
    type Output = Decimal;

    fn neg(self) -> Decimal {
        Decimal(-self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    #[test]
    fn test_parse_format_reparse_is_stable() {
        for s in ["0", "1000000", "40", "31.25", "0.00000001", "-987.654"] {
            let parsed = dec(s);
            let rendered = parsed.to_canonical_string();
            assert_eq!(dec(&rendered), parsed, "unstable for {}", s);
            assert!(!rendered.contains('e'), "exponent leaked for {}", s);
        }
    }

    #[test]
    fn test_canonical_string_drops_trailing_zeros() {
        assert_eq!(dec("50.500000").to_canonical_string(), "50.5");
        assert_eq!(dec("20.00").to_canonical_string(), "20");
        assert_eq!(dec("0.0").to_canonical_string(), "0");
    }

    #[test]
    fn test_serde_round_trips_through_strings() {
        let amount = dec("1250.75");
        let json = serde_json::to_value(amount).unwrap();
        assert_eq!(json, serde_json::json!("1250.75"));

        let back: Decimal = serde_json::from_value(json).unwrap();
        assert_eq!(back, amount);
    }

    #[test]
    fn test_money_arithmetic_is_exact() {
        // 20 BSK at 50 GC each, minus the principal, leaves nothing.
        let proceeds = dec("20") * dec("50");
        assert_eq!(proceeds, dec("1000"));
        assert_eq!((proceeds - dec("1000")).to_canonical_string(), "0");

        // 0.1 + 0.2 is exactly 0.3 here, unlike with floats.
        assert_eq!(dec("0.1") + dec("0.2"), dec("0.3"));
        assert_eq!(dec("1000") / dec("31.25"), dec("32"));
        assert_eq!(-dec("5"), dec("-5"));
    }

    #[test]
    fn test_sign_predicates() {
        assert!(dec("0").is_zero());
        assert!(dec("0.01").is_positive());
        assert!(dec("-0.01").is_negative());
        assert!(!dec("0").is_positive());
        assert!(!dec("0").is_negative());
        assert_eq!(dec("-7.5").abs(), dec("7.5"));
    }

    #[test]
    fn test_ceil_units() {
        assert_eq!(dec("20").ceil_units(), 20);
        assert_eq!(dec("19.2").ceil_units(), 20);
        assert_eq!(dec("0.1").ceil_units(), 1);
        assert_eq!(dec("0").ceil_units(), 0);
        assert_eq!(dec("-3").ceil_units(), 0);
        assert_eq!((dec("1000") / dec("31.25")).ceil_units(), 32);
    }

    #[test]
    fn test_max_clamps_shortfalls_at_zero() {
        // outstanding = max(0, principal - proceeds)
        assert_eq!((dec("1000") - dec("1200")).max(Decimal::zero()), dec("0"));
        assert_eq!((dec("1000") - dec("600")).max(Decimal::zero()), dec("400"));
    }

    #[test]
    fn test_threshold_comparisons_tolerate_epsilon() {
        let liquidation = dec("0.8");
        assert!(dec("0.8").gte_with_epsilon(liquidation));
        assert!(dec("0.7999999").gte_with_epsilon(liquidation));
        assert!(!dec("0.75").gte_with_epsilon(liquidation));

        let activation = dec("0.5");
        assert!(dec("0.5").lte_with_epsilon(activation));
        assert!(dec("0.5000001").lte_with_epsilon(activation));
        assert!(!dec("0.55").lte_with_epsilon(activation));
    }

    #[test]
    fn test_ordering_and_units() {
        assert!(dec("31.25") < dec("50"));
        assert_eq!(Decimal::from_units(10), dec("10"));
        assert_eq!(Decimal::one() + Decimal::one(), dec("2"));
        assert_eq!(Decimal::hundred(), dec("100"));
    }
}
