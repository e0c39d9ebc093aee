use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::api::AppState;
use crate::domain::{Loan, LoanStatus};
use crate::error::AppError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoansQuery {
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanDto {
    pub loan_id: String,
    pub borrower_id: String,
    pub principal: String,
    pub collateral: String,
    pub status: String,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
    pub liquidation_attempts: i64,
    pub collateral_sold: String,
    pub proceeds_gc: String,
    pub outstanding_balance: String,
}

impl From<Loan> for LoanDto {
    fn from(loan: Loan) -> Self {
        let outstanding_balance = loan.outstanding_balance().to_canonical_string();
        LoanDto {
            loan_id: loan.loan_id.as_str().to_string(),
            borrower_id: loan.borrower_id.as_str().to_string(),
            principal: loan.principal.to_canonical_string(),
            collateral: loan.collateral.to_canonical_string(),
            status: loan.status.as_str().to_string(),
            created_at_ms: loan.created_at.as_ms(),
            updated_at_ms: loan.updated_at.as_ms(),
            liquidation_attempts: loan.liquidation_attempts,
            collateral_sold: loan.collateral_sold.to_canonical_string(),
            proceeds_gc: loan.proceeds_gc.to_canonical_string(),
            outstanding_balance,
        }
    }
}

pub async fn list_loans(
    Query(params): Query<LoansQuery>,
    State(state): State<AppState>,
) -> Result<Json<Vec<LoanDto>>, AppError> {
    let status = params
        .status
        .as_deref()
        .map(LoanStatus::from_str)
        .transpose()
        .map_err(AppError::Validation)?;

    let loans = state.engine.list_loans(status).await?;
    Ok(Json(loans.into_iter().map(LoanDto::from).collect()))
}
