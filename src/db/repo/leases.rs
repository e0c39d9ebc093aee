//! Liquidation worker leases.
//!
//! A lease row grants one worker exclusive ownership of a loan's liquidation.
//! Owners must refresh before expiry; an expired lease is up for grabs by any
//! other worker (including one in another process).

use super::{Repository, StoreError};
use crate::domain::{LoanId, TimeMs};

impl Repository {
    /// Try to acquire the lease on a loan.
    ///
    /// Succeeds when no lease exists, the existing lease has expired, or the
    /// caller already owns it (re-acquire extends). Returns `false` when
    /// another live owner holds the loan.
    pub async fn acquire_lease(
        &self,
        loan_id: &LoanId,
        owner: &str,
        ttl_ms: i64,
        now: TimeMs,
    ) -> Result<bool, StoreError> {
        let expires_at = now.as_ms() + ttl_ms;

        let result = sqlx::query(
            r#"
            INSERT INTO liquidation_leases (loan_id, owner, expires_at_ms)
            VALUES (?, ?, ?)
            ON CONFLICT(loan_id) DO UPDATE SET
                owner = excluded.owner,
                expires_at_ms = excluded.expires_at_ms
            WHERE liquidation_leases.expires_at_ms <= ?
               OR liquidation_leases.owner = excluded.owner
            "#,
        )
        .bind(loan_id.as_str())
        .bind(owner)
        .bind(expires_at)
        .bind(now.as_ms())
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Extend a held lease. Returns `false` when the lease was lost (expired
    /// and taken, or never held); the worker must then abandon the job.
    pub async fn refresh_lease(
        &self,
        loan_id: &LoanId,
        owner: &str,
        ttl_ms: i64,
        now: TimeMs,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE liquidation_leases
            SET expires_at_ms = ?
            WHERE loan_id = ? AND owner = ? AND expires_at_ms > ?
            "#,
        )
        .bind(now.as_ms() + ttl_ms)
        .bind(loan_id.as_str())
        .bind(owner)
        .bind(now.as_ms())
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Drop a held lease so other workers need not wait out the TTL.
    pub async fn release_lease(&self, loan_id: &LoanId, owner: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM liquidation_leases WHERE loan_id = ? AND owner = ?")
            .bind(loan_id.as_str())
            .bind(owner)
            .execute(self.pool())
            .await?;
        Ok(())
    }
}
