//! Repository layer for database operations.
//!
//! This module provides the `Repository` struct for all database operations.
//! Methods are organized across submodules by domain:
//! - `loans.rs` - Loan CRUD, CAS transitions, restart scan
//! - `leases.rs` - Liquidation worker leases
//!
//! The root holds the idempotency and audit primitives.

mod leases;
mod loans;

use crate::domain::{LoanId, LoanStatus, RequestId, TimeMs};
use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use thiserror::Error;

/// Typed failures of store operations.
///
/// Only domain conflicts carry meaning for callers; `Db` and `Corrupt` are
/// internal failures surfaced as 5xx or a crash.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("loan {0} already exists")]
    AlreadyExists(LoanId),
    #[error("loan {0} not found")]
    NotFound(LoanId),
    #[error("loan {loan_id} is in terminal status {status}")]
    Terminal { loan_id: LoanId, status: LoanStatus },
    #[error("loan {loan_id} was not in status {expected}")]
    StateConflict {
        loan_id: LoanId,
        expected: LoanStatus,
    },
    #[error("illegal transition {from} -> {to}")]
    IllegalTransition { from: LoanStatus, to: LoanStatus },
    #[error("corrupted store record: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

/// Terminal outcome of a processed request, kept for idempotent replays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    Accepted,
    Rejected { reason: String },
}

impl RequestOutcome {
    fn to_storage(&self) -> String {
        match self {
            RequestOutcome::Accepted => "accepted".to_string(),
            RequestOutcome::Rejected { reason } => format!("rejected:{}", reason),
        }
    }

    fn from_storage(s: &str) -> Self {
        match s.strip_prefix("rejected:") {
            Some(reason) => RequestOutcome::Rejected {
                reason: reason.to_string(),
            },
            None => RequestOutcome::Accepted,
        }
    }
}

/// An idempotency record: one per externally-supplied request id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedRequest {
    pub request_id: RequestId,
    pub outcome: RequestOutcome,
    pub loan_id: LoanId,
    pub recorded_at: TimeMs,
}

/// Category of an audit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditKind {
    Application,
    TopUp,
    Activation,
    LiquidationScheduled,
    TradeAttempt,
    TradeResult,
    Liquidated,
    EventPublishUncertain,
}

impl AuditKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditKind::Application => "application",
            AuditKind::TopUp => "top_up",
            AuditKind::Activation => "activation",
            AuditKind::LiquidationScheduled => "liquidation_scheduled",
            AuditKind::TradeAttempt => "trade_attempt",
            AuditKind::TradeResult => "trade_result",
            AuditKind::Liquidated => "liquidated",
            AuditKind::EventPublishUncertain => "event_publish_uncertain",
        }
    }
}

/// One append-only audit record.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub loan_id: LoanId,
    pub at: TimeMs,
    pub kind: AuditKind,
    pub detail: serde_json::Value,
}

impl AuditEntry {
    pub fn new(loan_id: &LoanId, at: TimeMs, kind: AuditKind, detail: serde_json::Value) -> Self {
        AuditEntry {
            loan_id: loan_id.clone(),
            at,
            kind,
            detail,
        }
    }
}

/// Repository for database operations.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // =========================================================================
    // Idempotency operations
    // =========================================================================

    /// Record the outcome of a request id.
    ///
    /// Returns `true` when this call inserted the record, `false` when the
    /// request id was already known (duplicate, no side effect).
    pub async fn record_request(
        &self,
        request_id: &RequestId,
        loan_id: &LoanId,
        outcome: &RequestOutcome,
        now: TimeMs,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO processed_requests (request_id, outcome, loan_id, recorded_at_ms)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(request_id) DO NOTHING
            "#,
        )
        .bind(request_id.as_str())
        .bind(outcome.to_storage())
        .bind(loan_id.as_str())
        .bind(now.as_ms())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Look up the recorded outcome of a request id, if any.
    pub async fn lookup_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Option<ProcessedRequest>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT request_id, outcome, loan_id, recorded_at_ms
            FROM processed_requests
            WHERE request_id = ?
            "#,
        )
        .bind(request_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| {
            let outcome_str: String = r.get("outcome");
            ProcessedRequest {
                request_id: RequestId::new(r.get::<String, _>("request_id")),
                outcome: RequestOutcome::from_storage(&outcome_str),
                loan_id: LoanId::new(r.get::<String, _>("loan_id")),
                recorded_at: TimeMs::new(r.get::<i64, _>("recorded_at_ms")),
            }
        }))
    }

    // =========================================================================
    // Audit operations
    // =========================================================================

    /// Append an audit entry. The log is never read back by the core and
    /// never deleted.
    pub async fn append_audit(&self, entry: &AuditEntry) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO audit_log (loan_id, at_ms, kind, detail)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(entry.loan_id.as_str())
        .bind(entry.at.as_ms())
        .bind(entry.kind.as_str())
        .bind(entry.detail.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Number of audit entries for a loan, optionally filtered by kind.
    /// Test support; the API never exposes the audit log.
    pub async fn count_audit(
        &self,
        loan_id: &LoanId,
        kind: Option<AuditKind>,
    ) -> Result<i64, StoreError> {
        let row = match kind {
            Some(kind) => {
                sqlx::query("SELECT COUNT(*) AS n FROM audit_log WHERE loan_id = ? AND kind = ?")
                    .bind(loan_id.as_str())
                    .bind(kind.as_str())
                    .fetch_one(&self.pool)
                    .await?
            }
            None => sqlx::query("SELECT COUNT(*) AS n FROM audit_log WHERE loan_id = ?")
                .bind(loan_id.as_str())
                .fetch_one(&self.pool)
                .await?,
        };
        Ok(row.get("n"))
    }
}
