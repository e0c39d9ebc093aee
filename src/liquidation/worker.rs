//! The per-loan liquidation worker.
//!
//! Owns one loan from lease acquisition to finalization: size the next lot,
//! pick the better venue, execute against a counterparty that fails freely,
//! record durable progress, and finalize exactly once. There is no terminal
//! failure state; the worker backs off and keeps going until the loan clears.

use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::sizing;
use crate::bus::EventPublisher;
use crate::clock::Clock;
use crate::db::{AuditEntry, AuditKind, Repository, StoreError};
use crate::domain::{Decimal, Loan, LoanEvent, LoanId, LoanStatus, Venue};
use crate::pricing::PriceBoard;
use crate::venue::{SellOrder, VenueClient, VenueFill};

/// Lease TTL; refreshed every loop iteration and every trade attempt.
const LEASE_TTL_MS: i64 = 30_000;

/// First retry delay after a failed trade attempt.
const TRADE_RETRY_BASE_MS: u64 = 500;

/// Backoff while prices are stale: 1 s doubling to 60 s.
const STALE_BACKOFF_INITIAL: Duration = Duration::from_secs(1);
const STALE_BACKOFF_CAP: Duration = Duration::from_secs(60);

/// Shared dependencies of all liquidation workers.
pub struct LiquidationContext {
    pub repo: Arc<Repository>,
    pub board: Arc<PriceBoard>,
    pub publisher: EventPublisher,
    pub mos_espa: Arc<dyn VenueClient>,
    pub black_spire: Arc<dyn VenueClient>,
    pub clock: Arc<dyn Clock>,
    /// Cap on the jittered retry backoff between trade attempts.
    pub retry_cap_ms: u64,
}

impl LiquidationContext {
    fn venue_client(&self, venue: Venue) -> &dyn VenueClient {
        match venue {
            Venue::MosEspa => self.mos_espa.as_ref(),
            Venue::BlackSpire => self.black_spire.as_ref(),
        }
    }
}

enum LotOutcome {
    Filled(VenueFill),
    PricesStale,
    LeaseLost,
}

/// Liquidate one loan to completion.
///
/// Returns `Ok(())` both on success and when the job belongs to someone else
/// (lease held elsewhere, or the loan already finalized); only store failures
/// propagate.
pub async fn run_liquidation(
    ctx: &LiquidationContext,
    loan_id: &LoanId,
    owner: &str,
) -> Result<(), StoreError> {
    let now = ctx.clock.now();
    if !ctx.repo.acquire_lease(loan_id, owner, LEASE_TTL_MS, now).await? {
        debug!(loan_id = %loan_id, owner, "Lease held by another worker, skipping job");
        return Ok(());
    }

    let result = drive(ctx, loan_id, owner).await;
    // Free the lease eagerly; on failure the TTL frees it anyway.
    ctx.repo.release_lease(loan_id, owner).await.ok();
    result
}

async fn drive(ctx: &LiquidationContext, loan_id: &LoanId, owner: &str) -> Result<(), StoreError> {
    let mut stale_backoff = STALE_BACKOFF_INITIAL;

    loop {
        if !ctx
            .repo
            .refresh_lease(loan_id, owner, LEASE_TTL_MS, ctx.clock.now())
            .await?
        {
            warn!(loan_id = %loan_id, owner, "Lease lost, abandoning liquidation job");
            return Ok(());
        }

        let Some(loan) = ctx.repo.get_loan(loan_id).await? else {
            warn!(loan_id = %loan_id, "Liquidation job for unknown loan");
            return Ok(());
        };
        if loan.status != LoanStatus::Liquidating {
            debug!(loan_id = %loan_id, status = %loan.status, "Loan not liquidating, nothing to do");
            return Ok(());
        }

        let gap = loan.outstanding_balance();
        let remaining = loan.remaining_collateral();
        if !gap.is_positive() || !remaining.is_positive() {
            return finalize(ctx, &loan).await;
        }

        let Some(mid) = ctx.board.mid_price() else {
            debug!(loan_id = %loan_id, backoff_ms = stale_backoff.as_millis() as u64, "Mid price unknown, waiting for fresh ticks");
            tokio::time::sleep(stale_backoff).await;
            stale_backoff = (stale_backoff * 2).min(STALE_BACKOFF_CAP);
            continue;
        };
        stale_backoff = STALE_BACKOFF_INITIAL;

        let Some(lot) = sizing::next_lot(gap, mid, remaining) else {
            return finalize(ctx, &loan).await;
        };

        match execute_lot(ctx, loan_id, owner, lot).await? {
            LotOutcome::Filled(fill) => {
                let updated = ctx
                    .repo
                    .record_liquidation_fill(
                        loan_id,
                        fill.quantity,
                        fill.proceeds_gc,
                        ctx.clock.now(),
                    )
                    .await?;
                info!(
                    loan_id = %loan_id,
                    sold = %updated.collateral_sold,
                    proceeds = %updated.proceeds_gc,
                    "Liquidation lot filled"
                );
            }
            LotOutcome::PricesStale => {
                tokio::time::sleep(stale_backoff).await;
                stale_backoff = (stale_backoff * 2).min(STALE_BACKOFF_CAP);
            }
            LotOutcome::LeaseLost => {
                warn!(loan_id = %loan_id, owner, "Lease lost mid-lot, abandoning liquidation job");
                return Ok(());
            }
        }
    }
}

/// Pick the venue quoting the better sell price for this lot size.
/// Ties go to Mos Espa; a stale venue is simply not a candidate.
fn select_venue(board: &PriceBoard, lot_units: u32) -> Option<(Venue, Decimal)> {
    let mut best: Option<(Venue, Decimal)> = None;
    for venue in Venue::ALL {
        if let Some(price) = board.effective_sell_price(venue, lot_units) {
            let better = match best {
                Some((_, best_price)) => price > best_price,
                None => true,
            };
            if better {
                best = Some((venue, price));
            }
        }
    }
    best
}

/// Execute one lot, retrying the same lot with full-jitter backoff until a
/// venue fills it. Every attempt carries a fresh correlation id so the venue
/// cannot de-duplicate a retry into a phantom fill.
async fn execute_lot(
    ctx: &LiquidationContext,
    loan_id: &LoanId,
    owner: &str,
    lot: Decimal,
) -> Result<LotOutcome, StoreError> {
    let lot_units = lot.ceil_units().max(1);
    let mut attempt: u32 = 0;

    loop {
        if !ctx
            .repo
            .refresh_lease(loan_id, owner, LEASE_TTL_MS, ctx.clock.now())
            .await?
        {
            return Ok(LotOutcome::LeaseLost);
        }

        let Some((venue, quote)) = select_venue(&ctx.board, lot_units) else {
            return Ok(LotOutcome::PricesStale);
        };

        let order = SellOrder {
            client_order_id: Uuid::new_v4().to_string(),
            quantity: lot,
        };

        ctx.repo
            .append_audit(&AuditEntry::new(
                loan_id,
                ctx.clock.now(),
                AuditKind::TradeAttempt,
                serde_json::json!({
                    "clientOrderId": order.client_order_id,
                    "venue": venue.as_str(),
                    "quantity": lot.to_canonical_string(),
                    "quotedSellPrice": quote.to_canonical_string(),
                    "attempt": attempt,
                }),
            ))
            .await?;
        ctx.repo.bump_liquidation_attempts(loan_id).await?;

        match ctx.venue_client(venue).sell(&order).await {
            Ok(fill) => {
                ctx.repo
                    .append_audit(&AuditEntry::new(
                        loan_id,
                        ctx.clock.now(),
                        AuditKind::TradeResult,
                        serde_json::json!({
                            "clientOrderId": order.client_order_id,
                            "venue": venue.as_str(),
                            "orderId": fill.order_id,
                            "quantity": fill.quantity.to_canonical_string(),
                            "proceedsGc": fill.proceeds_gc.to_canonical_string(),
                            "outcome": "filled",
                        }),
                    ))
                    .await?;
                return Ok(LotOutcome::Filled(fill));
            }
            Err(e) => {
                ctx.repo
                    .append_audit(&AuditEntry::new(
                        loan_id,
                        ctx.clock.now(),
                        AuditKind::TradeResult,
                        serde_json::json!({
                            "clientOrderId": order.client_order_id,
                            "venue": venue.as_str(),
                            "outcome": "failed",
                            "error": e.to_string(),
                        }),
                    ))
                    .await?;

                let delay = full_jitter(attempt, TRADE_RETRY_BASE_MS, ctx.retry_cap_ms);
                warn!(
                    loan_id = %loan_id,
                    venue = %venue,
                    attempt,
                    error = %e,
                    retry_in_ms = delay.as_millis() as u64,
                    "Trade attempt failed, retrying same lot"
                );
                tokio::time::sleep(delay).await;
                attempt = attempt.saturating_add(1);
            }
        }
    }
}

/// Finalize: CAS into `liquidated` and emit the single liquidation event.
/// A `StateConflict` means another worker won the race and will emit it.
async fn finalize(ctx: &LiquidationContext, loan: &Loan) -> Result<(), StoreError> {
    let sold = loan.collateral_sold;
    let proceeds = loan.proceeds_gc;

    let finalized = match ctx
        .repo
        .transition(
            &loan.loan_id,
            LoanStatus::Liquidating,
            LoanStatus::Liquidated,
            |l| {
                l.collateral_sold = sold;
                l.proceeds_gc = proceeds;
            },
            ctx.clock.now(),
        )
        .await
    {
        Ok(finalized) => finalized,
        Err(StoreError::StateConflict { .. }) => {
            debug!(loan_id = %loan.loan_id, "Lost finalization race");
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    let event = LoanEvent::Liquidation {
        loan_id: finalized.loan_id.clone(),
        collateral_sold: finalized.collateral_sold,
        collateral_value: finalized.proceeds_gc,
        remaining_collateral: finalized.remaining_collateral(),
        outstanding_balance: finalized.outstanding_balance(),
    };

    if let Err(e) = ctx.publisher.publish(&event).await {
        ctx.repo
            .append_audit(&AuditEntry::new(
                &finalized.loan_id,
                ctx.clock.now(),
                AuditKind::EventPublishUncertain,
                serde_json::json!({
                    "eventId": event.event_id(),
                    "error": e.to_string(),
                }),
            ))
            .await?;
    }

    ctx.repo
        .append_audit(&AuditEntry::new(
            &finalized.loan_id,
            ctx.clock.now(),
            AuditKind::Liquidated,
            serde_json::json!({
                "collateralSold": finalized.collateral_sold.to_canonical_string(),
                "proceedsGc": finalized.proceeds_gc.to_canonical_string(),
                "outstandingBalance": finalized.outstanding_balance().to_canonical_string(),
            }),
        ))
        .await?;

    info!(
        loan_id = %finalized.loan_id,
        collateral_sold = %finalized.collateral_sold,
        proceeds = %finalized.proceeds_gc,
        outstanding = %finalized.outstanding_balance(),
        "Loan liquidated"
    );
    Ok(())
}

/// Full-jitter exponential backoff: uniform over [0, min(cap, base * 2^n)].
fn full_jitter(attempt: u32, base_ms: u64, cap_ms: u64) -> Duration {
    let exp = base_ms.saturating_mul(1u64 << attempt.min(16));
    let ceiling = exp.min(cap_ms).max(1);
    Duration::from_millis(rand::thread_rng().gen_range(0..=ceiling))
}
