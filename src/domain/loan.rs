//! Loan entity and its forward-only status machine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::{BorrowerId, Decimal, LoanId, TimeMs};

/// Lifecycle status of a loan.
///
/// Progresses only forward: new -> active -> liquidating -> liquidated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    New,
    Active,
    Liquidating,
    Liquidated,
}

impl LoanStatus {
    /// Canonical wire/storage name.
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::New => "new",
            LoanStatus::Active => "active",
            LoanStatus::Liquidating => "liquidating",
            LoanStatus::Liquidated => "liquidated",
        }
    }

    /// Position in the lifecycle, used as the logical version of events
    /// emitted for the transition into this status.
    pub fn ordinal(&self) -> u8 {
        match self {
            LoanStatus::New => 0,
            LoanStatus::Active => 1,
            LoanStatus::Liquidating => 2,
            LoanStatus::Liquidated => 3,
        }
    }

    /// True if the status admits no further collateral top-ups.
    pub fn is_terminal_for_top_ups(&self) -> bool {
        matches!(self, LoanStatus::Liquidating | LoanStatus::Liquidated)
    }

    /// The legal transition table. Every other (from, to) pair is rejected.
    pub fn can_transition_to(&self, to: LoanStatus) -> bool {
        matches!(
            (self, to),
            (LoanStatus::New, LoanStatus::Active)
                | (LoanStatus::Active, LoanStatus::Liquidating)
                | (LoanStatus::Liquidating, LoanStatus::Liquidated)
        )
    }
}

impl fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for LoanStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(LoanStatus::New),
            "active" => Ok(LoanStatus::Active),
            "liquidating" => Ok(LoanStatus::Liquidating),
            "liquidated" => Ok(LoanStatus::Liquidated),
            other => Err(format!("unknown loan status: {}", other)),
        }
    }
}

/// The central entity: a Beskar-collateralized loan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Loan {
    pub loan_id: LoanId,
    pub borrower_id: BorrowerId,
    /// Disbursed amount in GC. Immutable after creation.
    pub principal: Decimal,
    /// Posted collateral in BSK units.
    pub collateral: Decimal,
    pub status: LoanStatus,
    pub created_at: TimeMs,
    pub updated_at: TimeMs,
    /// Number of liquidation trade attempts issued so far.
    pub liquidation_attempts: i64,
    /// BSK sold during liquidation.
    pub collateral_sold: Decimal,
    /// GC realized from liquidation sales.
    pub proceeds_gc: Decimal,
}

impl Loan {
    /// A freshly-registered loan: status `new`, zero collateral.
    pub fn new(loan_id: LoanId, borrower_id: BorrowerId, principal: Decimal, now: TimeMs) -> Self {
        Loan {
            loan_id,
            borrower_id,
            principal,
            collateral: Decimal::zero(),
            status: LoanStatus::New,
            created_at: now,
            updated_at: now,
            liquidation_attempts: 0,
            collateral_sold: Decimal::zero(),
            proceeds_gc: Decimal::zero(),
        }
    }

    /// Loan-to-value ratio at the given mid price, as a fraction.
    ///
    /// Returns None when collateral is zero (the ratio is unbounded) so the
    /// caller cannot mistake an uncollateralized loan for a healthy one.
    pub fn ltv(&self, mid_price: Decimal) -> Option<Decimal> {
        if self.collateral.is_zero() || mid_price.is_zero() {
            return None;
        }
        Some(self.principal / (self.collateral * mid_price))
    }

    /// Principal still uncovered by realized liquidation proceeds.
    pub fn outstanding_balance(&self) -> Decimal {
        (self.principal - self.proceeds_gc).max(Decimal::zero())
    }

    /// Collateral not yet sold.
    pub fn remaining_collateral(&self) -> Decimal {
        (self.collateral - self.collateral_sold).max(Decimal::zero())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    #[test]
    fn test_status_forward_only() {
        assert!(LoanStatus::New.can_transition_to(LoanStatus::Active));
        assert!(LoanStatus::Active.can_transition_to(LoanStatus::Liquidating));
        assert!(LoanStatus::Liquidating.can_transition_to(LoanStatus::Liquidated));

        assert!(!LoanStatus::Active.can_transition_to(LoanStatus::New));
        assert!(!LoanStatus::Liquidating.can_transition_to(LoanStatus::Active));
        assert!(!LoanStatus::New.can_transition_to(LoanStatus::Liquidating));
        assert!(!LoanStatus::New.can_transition_to(LoanStatus::Liquidated));
        assert!(!LoanStatus::Liquidated.can_transition_to(LoanStatus::Liquidating));
    }

    #[test]
    fn test_status_string_roundtrip() {
        for status in [
            LoanStatus::New,
            LoanStatus::Active,
            LoanStatus::Liquidating,
            LoanStatus::Liquidated,
        ] {
            assert_eq!(LoanStatus::from_str(status.as_str()).unwrap(), status);
        }
    }

    #[test]
    fn test_top_up_terminality() {
        assert!(!LoanStatus::New.is_terminal_for_top_ups());
        assert!(!LoanStatus::Active.is_terminal_for_top_ups());
        assert!(LoanStatus::Liquidating.is_terminal_for_top_ups());
        assert!(LoanStatus::Liquidated.is_terminal_for_top_ups());
    }

    #[test]
    fn test_ltv() {
        let mut loan = Loan::new(
            LoanId::new("L1"),
            BorrowerId::new("B1"),
            dec("1000"),
            TimeMs::new(0),
        );
        assert_eq!(loan.ltv(dec("50")), None);

        loan.collateral = dec("40");
        // 1000 / (40 * 50) = 0.5
        assert_eq!(loan.ltv(dec("50")).unwrap(), dec("0.5"));
        // 1000 / (40 * 31.25) = 0.8
        assert_eq!(loan.ltv(dec("31.25")).unwrap(), dec("0.8"));
        assert_eq!(loan.ltv(Decimal::zero()), None);
    }

    #[test]
    fn test_outstanding_and_remaining() {
        let mut loan = Loan::new(
            LoanId::new("L1"),
            BorrowerId::new("B1"),
            dec("1000"),
            TimeMs::new(0),
        );
        loan.collateral = dec("40");
        loan.collateral_sold = dec("20");
        loan.proceeds_gc = dec("1000");

        assert_eq!(loan.outstanding_balance(), Decimal::zero());
        assert_eq!(loan.remaining_collateral(), dec("20"));

        loan.proceeds_gc = dec("625");
        assert_eq!(loan.outstanding_balance(), dec("375"));
    }
}
