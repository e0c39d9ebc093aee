//! LTV evaluator: turns price movement into lifecycle decisions.
//!
//! On every accepted tick (debounced per venue) it sweeps the non-terminal
//! loans: new loans that are now well-collateralized activate, active loans
//! past the liquidation threshold transition and get a worker. Racing
//! evaluators are harmless because the store transition is a CAS; only the
//! winner enqueues.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::bus::EventPublisher;
use crate::clock::Clock;
use crate::db::{AuditEntry, AuditKind, KeyedLocks, Repository, StoreError};
use crate::domain::{Decimal, Loan, LoanEvent, LoanStatus, TimeMs, Venue};
use crate::liquidation::LiquidationQueue;
use crate::pricing::PriceBoard;

/// Minimum spacing between evaluations triggered by one venue.
const DEBOUNCE_MS: i64 = 250;

pub struct LtvEvaluator {
    repo: Arc<Repository>,
    locks: Arc<KeyedLocks>,
    board: Arc<PriceBoard>,
    publisher: EventPublisher,
    queue: LiquidationQueue,
    clock: Arc<dyn Clock>,
    /// LTV at or below which a new loan activates, as a fraction.
    activation_threshold: Decimal,
    /// LTV at or above which an active loan liquidates, as a fraction.
    liquidation_threshold: Decimal,
    last_eval: Mutex<HashMap<Venue, TimeMs>>,
}

impl LtvEvaluator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        repo: Arc<Repository>,
        locks: Arc<KeyedLocks>,
        board: Arc<PriceBoard>,
        publisher: EventPublisher,
        queue: LiquidationQueue,
        clock: Arc<dyn Clock>,
        activation_threshold_pct: u32,
        liquidation_threshold_pct: u32,
    ) -> Self {
        Self {
            repo,
            locks,
            board,
            publisher,
            queue,
            clock,
            activation_threshold: Decimal::from_units(activation_threshold_pct)
                / Decimal::hundred(),
            liquidation_threshold: Decimal::from_units(liquidation_threshold_pct)
                / Decimal::hundred(),
            last_eval: Mutex::new(HashMap::new()),
        }
    }

    /// Run the evaluation loop until the process shuts down.
    pub async fn run(self: Arc<Self>) {
        let mut signal = self.board.subscribe();

        loop {
            if signal.changed().await.is_err() {
                // Board dropped: shutting down.
                return;
            }
            let venue = signal.borrow_and_update().venue;

            if let Some(venue) = venue {
                if !self.debounce(venue) {
                    continue;
                }
            }

            if let Err(e) = self.evaluate_once().await {
                warn!(error = %e, "LTV evaluation pass failed");
            }
        }
    }

    /// True when enough time has passed since this venue last triggered an
    /// evaluation. Skipped ticks are safe: the next tick re-triggers.
    fn debounce(&self, venue: Venue) -> bool {
        let now = self.clock.now();
        let mut last_eval = self.last_eval.lock().expect("debounce map poisoned");
        match last_eval.get(&venue) {
            Some(&last) if now.since(last) < DEBOUNCE_MS => false,
            _ => {
                last_eval.insert(venue, now);
                true
            }
        }
    }

    /// One full sweep over non-terminal loans.
    ///
    /// With no usable mid price nothing happens at all: stale prices must
    /// never force a liquidation.
    pub async fn evaluate_once(&self) -> Result<(), StoreError> {
        let Some(mid) = self.board.mid_price() else {
            debug!("Mid price unknown, skipping LTV sweep");
            return Ok(());
        };

        for loan in self.repo.list_loans(Some(LoanStatus::New)).await? {
            if let Err(e) = self.maybe_activate(&loan, mid).await {
                warn!(loan_id = %loan.loan_id, error = %e, "Activation check failed");
            }
        }

        for loan in self.repo.list_loans(Some(LoanStatus::Active)).await? {
            if let Err(e) = self.maybe_liquidate(&loan, mid).await {
                warn!(loan_id = %loan.loan_id, error = %e, "Liquidation check failed");
            }
        }

        Ok(())
    }

    async fn maybe_activate(&self, loan: &Loan, mid: Decimal) -> Result<(), StoreError> {
        let Some(ltv) = loan.ltv(mid) else {
            // No collateral posted yet; stays new.
            return Ok(());
        };
        if !ltv.lte_with_epsilon(self.activation_threshold) {
            return Ok(());
        }

        let _guard = self.locks.lock(loan.loan_id.as_str()).await;
        let now = self.clock.now();

        let activated = match self
            .repo
            .transition(&loan.loan_id, LoanStatus::New, LoanStatus::Active, |_| {}, now)
            .await
        {
            Ok(loan) => loan,
            Err(StoreError::StateConflict { .. }) => return Ok(()),
            Err(e) => return Err(e),
        };

        self.repo
            .append_audit(&AuditEntry::new(
                &activated.loan_id,
                now,
                AuditKind::Activation,
                serde_json::json!({
                    "ltv": ltv.to_canonical_string(),
                    "midPrice": mid.to_canonical_string(),
                }),
            ))
            .await?;

        let event = LoanEvent::Activation {
            loan_id: activated.loan_id.clone(),
            outstanding_balance: activated.principal,
        };
        if let Err(e) = self.publisher.publish(&event).await {
            self.repo
                .append_audit(&AuditEntry::new(
                    &activated.loan_id,
                    self.clock.now(),
                    AuditKind::EventPublishUncertain,
                    serde_json::json!({
                        "eventId": event.event_id(),
                        "error": e.to_string(),
                    }),
                ))
                .await?;
        }

        info!(loan_id = %activated.loan_id, ltv = %ltv, "Loan activated");
        Ok(())
    }

    async fn maybe_liquidate(&self, loan: &Loan, mid: Decimal) -> Result<(), StoreError> {
        let Some(ltv) = loan.ltv(mid) else {
            return Ok(());
        };
        if !ltv.gte_with_epsilon(self.liquidation_threshold) {
            return Ok(());
        }

        let _guard = self.locks.lock(loan.loan_id.as_str()).await;
        let now = self.clock.now();

        match self
            .repo
            .transition(
                &loan.loan_id,
                LoanStatus::Active,
                LoanStatus::Liquidating,
                |_| {},
                now,
            )
            .await
        {
            Ok(_) => {}
            // A concurrent evaluator won; exactly one enqueue happens.
            Err(StoreError::StateConflict { .. }) => return Ok(()),
            Err(e) => return Err(e),
        }

        self.repo
            .append_audit(&AuditEntry::new(
                &loan.loan_id,
                now,
                AuditKind::LiquidationScheduled,
                serde_json::json!({
                    "ltv": ltv.to_canonical_string(),
                    "midPrice": mid.to_canonical_string(),
                }),
            ))
            .await?;

        // A full queue is fine: the loan is already liquidating, so the
        // restart scan will recover it.
        self.queue.try_enqueue(&loan.loan_id);

        info!(loan_id = %loan.loan_id, ltv = %ltv, "Liquidation scheduled");
        Ok(())
    }
}
