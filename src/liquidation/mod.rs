//! Liquidation pipeline: the bounded work queue, the worker pool, and the
//! restart scan that makes the queue durable across process boundaries.
//!
//! This module provides:
//! - Order sizing into tier lots
//! - The per-loan liquidation worker
//! - Queue plumbing and in-flight recovery

pub mod sizing;
pub mod worker;

pub use worker::{run_liquidation, LiquidationContext};

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::db::{Repository, StoreError};
use crate::domain::LoanId;

/// Default bound on queued liquidation jobs. An overflowing enqueue is
/// dropped; the loan is already `liquidating`, so the restart scan picks it
/// back up.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Sending half of the liquidation work queue.
#[derive(Debug, Clone)]
pub struct LiquidationQueue {
    tx: mpsc::Sender<LoanId>,
}

impl LiquidationQueue {
    /// Create a bounded queue; the receiver feeds the worker pool.
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<LoanId>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Enqueue without blocking. Returns `false` when the queue is full or
    /// closed; callers rely on the restart scan for eventual delivery.
    pub fn try_enqueue(&self, loan_id: &LoanId) -> bool {
        match self.tx.try_send(loan_id.clone()) {
            Ok(()) => true,
            Err(e) => {
                warn!(loan_id = %loan_id, error = %e, "Liquidation queue full, deferring enqueue");
                false
            }
        }
    }
}

/// Spawn the liquidation worker pool.
///
/// Each worker drains the shared queue; a job that fails on a store error is
/// retried in place after a pause, because liquidation has no terminal
/// failure state.
pub fn spawn_worker_pool(
    ctx: Arc<LiquidationContext>,
    rx: mpsc::Receiver<LoanId>,
    pool_size: usize,
    process_id: &str,
) -> Vec<JoinHandle<()>> {
    let rx = Arc::new(tokio::sync::Mutex::new(rx));

    (0..pool_size)
        .map(|index| {
            let ctx = ctx.clone();
            let rx = rx.clone();
            let owner = format!("{}/{}", process_id, index);
            tokio::spawn(async move {
                loop {
                    let job = { rx.lock().await.recv().await };
                    let Some(loan_id) = job else {
                        // Queue closed: shutdown.
                        break;
                    };

                    loop {
                        match run_liquidation(&ctx, &loan_id, &owner).await {
                            Ok(()) => break,
                            Err(e) => {
                                error!(
                                    loan_id = %loan_id,
                                    owner = %owner,
                                    error = %e,
                                    "Liquidation store failure, retrying job"
                                );
                                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                            }
                        }
                    }
                }
            })
        })
        .collect()
}

/// Re-enqueue every loan found mid-liquidation. Run at startup so a crash
/// between transition and finalization is always recovered.
pub async fn recover_in_flight(
    repo: &Repository,
    queue: &LiquidationQueue,
) -> Result<usize, StoreError> {
    let loans = repo.loans_in_liquidation().await?;
    let mut enqueued = 0;
    for loan in &loans {
        if queue.try_enqueue(&loan.loan_id) {
            enqueued += 1;
        }
    }
    if !loans.is_empty() {
        info!(
            found = loans.len(),
            enqueued, "Recovered in-flight liquidations"
        );
    }
    Ok(enqueued)
}
