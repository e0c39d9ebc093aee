//! Loan persistence: creation, collateral top-ups, status transitions.
//!
//! Transitions are compare-and-swap on the status column, so a racing writer
//! loses cleanly with `StateConflict` instead of overwriting. Collateral
//! top-ups CAS on the previous collateral value for the same reason.

use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::{Repository, StoreError};
use crate::domain::{BorrowerId, Decimal, Loan, LoanId, LoanStatus, TimeMs};

/// Top-ups retry their value CAS this many times before giving up. Contention
/// on one loan is already squeezed out by the per-loan lock; this bound only
/// guards against a livelock bug.
const COLLATERAL_CAS_ATTEMPTS: usize = 8;

impl Repository {
    /// Insert a new loan in status `new` with zero collateral.
    pub async fn create_loan(
        &self,
        loan_id: &LoanId,
        borrower_id: &BorrowerId,
        principal: Decimal,
        now: TimeMs,
    ) -> Result<Loan, StoreError> {
        let loan = Loan::new(loan_id.clone(), borrower_id.clone(), principal, now);

        let result = sqlx::query(
            r#"
            INSERT INTO loans
            (loan_id, borrower_id, principal, collateral, status,
             created_at_ms, updated_at_ms, liquidation_attempts, collateral_sold, proceeds_gc)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(loan.loan_id.as_str())
        .bind(loan.borrower_id.as_str())
        .bind(loan.principal.to_canonical_string())
        .bind(loan.collateral.to_canonical_string())
        .bind(loan.status.as_str())
        .bind(loan.created_at.as_ms())
        .bind(loan.updated_at.as_ms())
        .bind(loan.liquidation_attempts)
        .bind(loan.collateral_sold.to_canonical_string())
        .bind(loan.proceeds_gc.to_canonical_string())
        .execute(self.pool())
        .await;

        match result {
            Ok(_) => Ok(loan),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(StoreError::AlreadyExists(loan_id.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Fetch a loan by id.
    pub async fn get_loan(&self, loan_id: &LoanId) -> Result<Option<Loan>, StoreError> {
        let row = sqlx::query("SELECT * FROM loans WHERE loan_id = ?")
            .bind(loan_id.as_str())
            .fetch_optional(self.pool())
            .await?;

        row.map(|r| map_loan_row(&r)).transpose()
    }

    /// Increase a loan's collateral.
    ///
    /// Rejected with `Terminal` once the loan is liquidating or liquidated;
    /// returns the post-mutation snapshot.
    pub async fn add_collateral(
        &self,
        loan_id: &LoanId,
        amount: Decimal,
        now: TimeMs,
    ) -> Result<Loan, StoreError> {
        for _ in 0..COLLATERAL_CAS_ATTEMPTS {
            let mut loan = self
                .get_loan(loan_id)
                .await?
                .ok_or_else(|| StoreError::NotFound(loan_id.clone()))?;

            if loan.status.is_terminal_for_top_ups() {
                return Err(StoreError::Terminal {
                    loan_id: loan_id.clone(),
                    status: loan.status,
                });
            }

            let previous = loan.collateral;
            let updated = previous + amount;

            let result = sqlx::query(
                r#"
                UPDATE loans
                SET collateral = ?, updated_at_ms = ?
                WHERE loan_id = ? AND collateral = ? AND status IN ('new', 'active')
                "#,
            )
            .bind(updated.to_canonical_string())
            .bind(now.as_ms())
            .bind(loan_id.as_str())
            .bind(previous.to_canonical_string())
            .execute(self.pool())
            .await?;

            if result.rows_affected() > 0 {
                loan.collateral = updated;
                loan.updated_at = now;
                return Ok(loan);
            }
            // Lost the CAS to a concurrent writer; re-read and retry.
        }

        Err(StoreError::Db(sqlx::Error::Protocol(
            "collateral CAS exhausted".into(),
        )))
    }

    /// Compare-and-swap status transition with an optional field mutator.
    ///
    /// The mutator runs on the loan snapshot before the write; only the
    /// liquidation accounting fields it may touch (`collateral_sold`,
    /// `proceeds_gc`) are persisted alongside the status. Fails with
    /// `StateConflict` when the stored status is no longer `from`.
    pub async fn transition<F>(
        &self,
        loan_id: &LoanId,
        from: LoanStatus,
        to: LoanStatus,
        mutate: F,
        now: TimeMs,
    ) -> Result<Loan, StoreError>
    where
        F: FnOnce(&mut Loan),
    {
        if !from.can_transition_to(to) {
            return Err(StoreError::IllegalTransition { from, to });
        }

        let mut loan = self
            .get_loan(loan_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(loan_id.clone()))?;

        if loan.status != from {
            return Err(StoreError::StateConflict {
                loan_id: loan_id.clone(),
                expected: from,
            });
        }

        mutate(&mut loan);
        loan.status = to;
        loan.updated_at = now;

        // Collateral and principal are deliberately not written here:
        // principal is immutable and collateral may have been topped up
        // concurrently.
        let result = sqlx::query(
            r#"
            UPDATE loans
            SET status = ?, updated_at_ms = ?, collateral_sold = ?, proceeds_gc = ?
            WHERE loan_id = ? AND status = ?
            "#,
        )
        .bind(to.as_str())
        .bind(now.as_ms())
        .bind(loan.collateral_sold.to_canonical_string())
        .bind(loan.proceeds_gc.to_canonical_string())
        .bind(loan_id.as_str())
        .bind(from.as_str())
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::StateConflict {
                loan_id: loan_id.clone(),
                expected: from,
            });
        }

        // Re-read for an accurate post-commit snapshot.
        self.get_loan(loan_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(loan_id.clone()))
    }

    /// Durably record a filled liquidation lot.
    ///
    /// Progress must survive a crash so a restarted worker never re-sells
    /// collateral it already sold. Only legal while the loan is liquidating.
    pub async fn record_liquidation_fill(
        &self,
        loan_id: &LoanId,
        quantity: Decimal,
        proceeds: Decimal,
        now: TimeMs,
    ) -> Result<Loan, StoreError> {
        let loan = self
            .get_loan(loan_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(loan_id.clone()))?;

        if loan.status != LoanStatus::Liquidating {
            return Err(StoreError::StateConflict {
                loan_id: loan_id.clone(),
                expected: LoanStatus::Liquidating,
            });
        }

        let sold = loan.collateral_sold + quantity;
        let total_proceeds = loan.proceeds_gc + proceeds;

        let result = sqlx::query(
            r#"
            UPDATE loans
            SET collateral_sold = ?, proceeds_gc = ?, updated_at_ms = ?
            WHERE loan_id = ? AND status = 'liquidating'
            "#,
        )
        .bind(sold.to_canonical_string())
        .bind(total_proceeds.to_canonical_string())
        .bind(now.as_ms())
        .bind(loan_id.as_str())
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::StateConflict {
                loan_id: loan_id.clone(),
                expected: LoanStatus::Liquidating,
            });
        }

        self.get_loan(loan_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(loan_id.clone()))
    }

    /// Bump the trade-attempt counter for a liquidating loan.
    pub async fn bump_liquidation_attempts(&self, loan_id: &LoanId) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE loans SET liquidation_attempts = liquidation_attempts + 1 WHERE loan_id = ?",
        )
        .bind(loan_id.as_str())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Snapshot read of all loans, optionally filtered by status.
    pub async fn list_loans(&self, status: Option<LoanStatus>) -> Result<Vec<Loan>, StoreError> {
        let rows = match status {
            Some(status) => {
                sqlx::query(
                    "SELECT * FROM loans WHERE status = ? ORDER BY created_at_ms ASC, loan_id ASC",
                )
                .bind(status.as_str())
                .fetch_all(self.pool())
                .await?
            }
            None => {
                sqlx::query("SELECT * FROM loans ORDER BY created_at_ms ASC, loan_id ASC")
                    .fetch_all(self.pool())
                    .await?
            }
        };

        rows.iter().map(map_loan_row).collect()
    }

    /// All loans currently mid-liquidation; the restart scan re-enqueues these.
    pub async fn loans_in_liquidation(&self) -> Result<Vec<Loan>, StoreError> {
        self.list_loans(Some(LoanStatus::Liquidating)).await
    }
}

fn map_loan_row(row: &SqliteRow) -> Result<Loan, StoreError> {
    let status_str: String = row.get("status");
    let status = status_str
        .parse::<LoanStatus>()
        .map_err(StoreError::Corrupt)?;

    Ok(Loan {
        loan_id: LoanId::new(row.get::<String, _>("loan_id")),
        borrower_id: BorrowerId::new(row.get::<String, _>("borrower_id")),
        principal: parse_decimal_column(row, "principal")?,
        collateral: parse_decimal_column(row, "collateral")?,
        status,
        created_at: TimeMs::new(row.get::<i64, _>("created_at_ms")),
        updated_at: TimeMs::new(row.get::<i64, _>("updated_at_ms")),
        liquidation_attempts: row.get::<i64, _>("liquidation_attempts"),
        collateral_sold: parse_decimal_column(row, "collateral_sold")?,
        proceeds_gc: parse_decimal_column(row, "proceeds_gc")?,
    })
}

fn parse_decimal_column(row: &SqliteRow, column: &str) -> Result<Decimal, StoreError> {
    let raw: String = row.get(column);
    Decimal::from_str_canonical(&raw)
        .map_err(|e| StoreError::Corrupt(format!("column {}: {} ({})", column, raw, e)))
}
