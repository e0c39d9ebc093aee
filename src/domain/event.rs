//! Lifecycle events published to the loan-events topic.

use serde::Serialize;

use crate::domain::{Decimal, LoanId, LoanStatus};

/// A loan lifecycle event, one per state transition.
///
/// The `event_id` is derived deterministically from the loan and the
/// transition, so retried publishes of the same transition carry the same id
/// and downstream consumers can de-duplicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoanEvent {
    /// A loan application was accepted (status `new`).
    Application { loan_id: LoanId, amount: Decimal },
    /// A loan crossed the activation threshold (status `active`).
    Activation {
        loan_id: LoanId,
        outstanding_balance: Decimal,
    },
    /// A loan finished liquidation (status `liquidated`).
    Liquidation {
        loan_id: LoanId,
        collateral_sold: Decimal,
        collateral_value: Decimal,
        remaining_collateral: Decimal,
        outstanding_balance: Decimal,
    },
}

impl LoanEvent {
    /// Wire name of the event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            LoanEvent::Application { .. } => "application",
            LoanEvent::Activation { .. } => "activation",
            LoanEvent::Liquidation { .. } => "liquidation",
        }
    }

    /// The loan status the event reports.
    pub fn status(&self) -> LoanStatus {
        match self {
            LoanEvent::Application { .. } => LoanStatus::New,
            LoanEvent::Activation { .. } => LoanStatus::Active,
            LoanEvent::Liquidation { .. } => LoanStatus::Liquidated,
        }
    }

    /// The loan the event belongs to.
    pub fn loan_id(&self) -> &LoanId {
        match self {
            LoanEvent::Application { loan_id, .. }
            | LoanEvent::Activation { loan_id, .. }
            | LoanEvent::Liquidation { loan_id, .. } => loan_id,
        }
    }

    /// Deterministic event id: every publish attempt for one transition of one
    /// loan produces the same value.
    ///
    /// Derived by truncating a SHA-256 over length-prefixed fields to 128
    /// bits, which keeps ids short while leaving collisions out of reach for
    /// any realistic loan count.
    pub fn event_id(&self) -> String {
        use sha2::{Digest, Sha256};

        fn hash_var(hasher: &mut Sha256, data: &str) {
            hasher.update((data.len() as u32).to_le_bytes());
            hasher.update(data.as_bytes());
        }

        let mut hasher = Sha256::new();
        hash_var(&mut hasher, self.loan_id().as_str());
        hash_var(&mut hasher, self.status().as_str());
        hasher.update([self.status().ordinal()]);

        let hash = hasher.finalize();
        format!("evt:{}", hex::encode(&hash[..16]))
    }

    /// The JSON payload published to the bus.
    pub fn to_payload(&self) -> serde_json::Value {
        match self {
            LoanEvent::Application { loan_id, amount } => serde_json::json!({
                "eventId": self.event_id(),
                "eventType": "application",
                "loanId": loan_id.as_str(),
                "amount": amount.to_canonical_string(),
                "status": "new",
            }),
            LoanEvent::Activation {
                loan_id,
                outstanding_balance,
            } => serde_json::json!({
                "eventId": self.event_id(),
                "eventType": "activation",
                "loanId": loan_id.as_str(),
                "status": "active",
                "outstandingBalance": outstanding_balance.to_canonical_string(),
            }),
            LoanEvent::Liquidation {
                loan_id,
                collateral_sold,
                collateral_value,
                remaining_collateral,
                outstanding_balance,
            } => serde_json::json!({
                "eventId": self.event_id(),
                "eventType": "liquidation",
                "loanId": loan_id.as_str(),
                "collateralSold": collateral_sold.to_canonical_string(),
                "collateralValue": collateral_value.to_canonical_string(),
                "remainingCollateral": remaining_collateral.to_canonical_string(),
                "outstandingBalance": outstanding_balance.to_canonical_string(),
                "status": "liquidated",
            }),
        }
    }
}

impl Serialize for LoanEvent {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_payload().serialize(serializer)
    }
}
