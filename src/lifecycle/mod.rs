//! Lifecycle engine: inbound loan applications and collateral top-ups.
//!
//! Handlers are idempotent on the caller-supplied request id, serialize all
//! work on one loan through the per-loan lock, and emit lifecycle events
//! after the store commit while still holding the lock.

use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::bus::EventPublisher;
use crate::clock::Clock;
use crate::db::{
    AuditEntry, AuditKind, KeyedLocks, Repository, RequestOutcome, StoreError,
};
use crate::domain::{BorrowerId, Decimal, Loan, LoanEvent, LoanId, LoanStatus, RequestId, TimeMs};

/// A loan application as received from the wire, all fields untrusted.
#[derive(Debug, Clone)]
pub struct ApplicationSubmission {
    pub request_id: String,
    pub loan_id: String,
    pub borrower_id: String,
    pub amount: String,
}

/// A collateral top-up as received from the wire.
#[derive(Debug, Clone)]
pub struct TopUpSubmission {
    pub request_id: String,
    pub loan_id: String,
    pub borrower_id: String,
    pub amount: String,
}

/// Acknowledgement returned for an accepted submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionReceipt {
    pub request_id: RequestId,
    pub timestamp: TimeMs,
}

/// Failures surfaced to API callers.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("request {request_id} was already processed")]
    Duplicate {
        request_id: RequestId,
        outcome: RequestOutcome,
    },
    #[error("loan {0} not found")]
    NotFound(LoanId),
    #[error("borrower does not own loan {0}")]
    BorrowerMismatch(LoanId),
    #[error("loan {loan_id} is {status}, no further top-ups")]
    Terminal {
        loan_id: LoanId,
        status: LoanStatus,
    },
    #[error("loan {0} already exists with different terms")]
    Conflict(LoanId),
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for LifecycleError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(loan_id) => LifecycleError::NotFound(loan_id),
            StoreError::Terminal { loan_id, status } => {
                LifecycleError::Terminal { loan_id, status }
            }
            other => LifecycleError::Store(other),
        }
    }
}

/// The lifecycle engine: validates, persists, audits, emits.
#[derive(Clone)]
pub struct LifecycleEngine {
    repo: Arc<Repository>,
    locks: Arc<KeyedLocks>,
    publisher: EventPublisher,
    clock: Arc<dyn Clock>,
}

impl LifecycleEngine {
    pub fn new(
        repo: Arc<Repository>,
        locks: Arc<KeyedLocks>,
        publisher: EventPublisher,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repo,
            locks,
            publisher,
            clock,
        }
    }

    /// Register a new loan.
    ///
    /// Duplicate request ids replay the original outcome. A known loan id
    /// with identical terms is accepted idempotently without a second event;
    /// different terms are a conflict.
    pub async fn submit_application(
        &self,
        submission: ApplicationSubmission,
    ) -> Result<SubmissionReceipt, LifecycleError> {
        let request_id = parse_request_id(&submission.request_id)?;

        // Idempotency before validation: a replayed request id must get its
        // recorded outcome back even when the retried payload no longer
        // parses. The lock key matches what a validated LoanId would yield.
        let _guard = self.locks.lock(submission.loan_id.trim()).await;

        if let Some(processed) = self.repo.lookup_request(&request_id).await? {
            return Err(LifecycleError::Duplicate {
                request_id,
                outcome: processed.outcome,
            });
        }

        let loan_id = LoanId::from_str(&submission.loan_id)
            .map_err(|e| LifecycleError::Validation(format!("loanId: {}", e)))?;
        let borrower_id = BorrowerId::from_str(&submission.borrower_id)
            .map_err(|e| LifecycleError::Validation(format!("borrowerId: {}", e)))?;
        let principal = parse_positive_amount(&submission.amount)?;

        let now = self.clock.now();
        match self.repo.create_loan(&loan_id, &borrower_id, principal, now).await {
            Ok(loan) => {
                self.record(&request_id, &loan_id, RequestOutcome::Accepted, now)
                    .await?;
                self.repo
                    .append_audit(&AuditEntry::new(
                        &loan_id,
                        now,
                        AuditKind::Application,
                        serde_json::json!({
                            "requestId": request_id.as_str(),
                            "borrowerId": borrower_id.as_str(),
                            "principal": principal.to_canonical_string(),
                        }),
                    ))
                    .await?;

                self.emit(
                    &loan,
                    LoanEvent::Application {
                        loan_id: loan_id.clone(),
                        amount: principal,
                    },
                )
                .await?;

                info!(loan_id = %loan_id, principal = %principal, "Loan application accepted");
                Ok(SubmissionReceipt {
                    request_id,
                    timestamp: now,
                })
            }
            Err(StoreError::AlreadyExists(_)) => {
                let existing = self
                    .repo
                    .get_loan(&loan_id)
                    .await?
                    .ok_or(LifecycleError::Conflict(loan_id.clone()))?;

                if existing.borrower_id == borrower_id && existing.principal == principal {
                    // Same application resubmitted under a new request id:
                    // idempotent success, and no second event.
                    self.record(&request_id, &loan_id, RequestOutcome::Accepted, now)
                        .await?;
                    info!(loan_id = %loan_id, "Application matches existing loan, accepted idempotently");
                    Ok(SubmissionReceipt {
                        request_id,
                        timestamp: now,
                    })
                } else {
                    self.record(
                        &request_id,
                        &loan_id,
                        RequestOutcome::Rejected {
                            reason: "loan exists with different terms".to_string(),
                        },
                        now,
                    )
                    .await?;
                    Err(LifecycleError::Conflict(loan_id))
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Add collateral to a loan.
    ///
    /// No event is emitted; activation, if the top-up crosses the threshold,
    /// follows on the next price tick.
    pub async fn submit_top_up(
        &self,
        submission: TopUpSubmission,
    ) -> Result<(SubmissionReceipt, Loan), LifecycleError> {
        let request_id = parse_request_id(&submission.request_id)?;

        // Idempotency before validation, as for applications.
        let _guard = self.locks.lock(submission.loan_id.trim()).await;

        if let Some(processed) = self.repo.lookup_request(&request_id).await? {
            return Err(LifecycleError::Duplicate {
                request_id,
                outcome: processed.outcome,
            });
        }

        let loan_id = LoanId::from_str(&submission.loan_id)
            .map_err(|e| LifecycleError::Validation(format!("loanId: {}", e)))?;
        let borrower_id = BorrowerId::from_str(&submission.borrower_id)
            .map_err(|e| LifecycleError::Validation(format!("borrowerId: {}", e)))?;
        let amount = parse_positive_amount(&submission.amount)?;

        let now = self.clock.now();

        let loan = self
            .repo
            .get_loan(&loan_id)
            .await?
            .ok_or_else(|| LifecycleError::NotFound(loan_id.clone()))?;

        if loan.borrower_id != borrower_id {
            self.record(
                &request_id,
                &loan_id,
                RequestOutcome::Rejected {
                    reason: "borrower mismatch".to_string(),
                },
                now,
            )
            .await?;
            return Err(LifecycleError::BorrowerMismatch(loan_id));
        }

        if loan.status.is_terminal_for_top_ups() {
            self.record(
                &request_id,
                &loan_id,
                RequestOutcome::Rejected {
                    reason: format!("loan is {}", loan.status),
                },
                now,
            )
            .await?;
            return Err(LifecycleError::Terminal {
                loan_id,
                status: loan.status,
            });
        }

        let updated = self.repo.add_collateral(&loan_id, amount, now).await?;
        self.record(&request_id, &loan_id, RequestOutcome::Accepted, now)
            .await?;
        self.repo
            .append_audit(&AuditEntry::new(
                &loan_id,
                now,
                AuditKind::TopUp,
                serde_json::json!({
                    "requestId": request_id.as_str(),
                    "amount": amount.to_canonical_string(),
                    "collateral": updated.collateral.to_canonical_string(),
                }),
            ))
            .await?;

        info!(loan_id = %loan_id, amount = %amount, collateral = %updated.collateral, "Collateral top-up accepted");
        Ok((
            SubmissionReceipt {
                request_id,
                timestamp: now,
            },
            updated,
        ))
    }

    /// Snapshot of loans, optionally filtered by status.
    pub async fn list_loans(
        &self,
        status: Option<LoanStatus>,
    ) -> Result<Vec<Loan>, LifecycleError> {
        Ok(self.repo.list_loans(status).await?)
    }

    async fn record(
        &self,
        request_id: &RequestId,
        loan_id: &LoanId,
        outcome: RequestOutcome,
        now: TimeMs,
    ) -> Result<(), LifecycleError> {
        let inserted = self
            .repo
            .record_request(request_id, loan_id, &outcome, now)
            .await?;
        if !inserted {
            // Another instance processed this request id concurrently.
            let stored = self
                .repo
                .lookup_request(request_id)
                .await?
                .map(|p| p.outcome)
                .unwrap_or(outcome);
            return Err(LifecycleError::Duplicate {
                request_id: request_id.clone(),
                outcome: stored,
            });
        }
        Ok(())
    }

    async fn emit(&self, loan: &Loan, event: LoanEvent) -> Result<(), LifecycleError> {
        if let Err(e) = self.publisher.publish(&event).await {
            warn!(loan_id = %loan.loan_id, error = %e, "Event emission uncertain");
            self.repo
                .append_audit(&AuditEntry::new(
                    &loan.loan_id,
                    self.clock.now(),
                    AuditKind::EventPublishUncertain,
                    serde_json::json!({
                        "eventId": event.event_id(),
                        "error": e.to_string(),
                    }),
                ))
                .await?;
        }
        Ok(())
    }
}

fn parse_request_id(raw: &str) -> Result<RequestId, LifecycleError> {
    RequestId::from_str(raw).map_err(|e| LifecycleError::Validation(format!("requestId: {}", e)))
}

fn parse_positive_amount(raw: &str) -> Result<Decimal, LifecycleError> {
    let amount = Decimal::from_str_canonical(raw.trim())
        .map_err(|_| LifecycleError::Validation(format!("amount is not a decimal: {}", raw)))?;
    if !amount.is_positive() {
        return Err(LifecycleError::Validation(
            "amount must be positive".to_string(),
        ));
    }
    Ok(amount)
}
