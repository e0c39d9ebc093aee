use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::AppState;
use crate::error::AppError;
use crate::lifecycle::TopUpSubmission;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopUpRequest {
    pub request_id: String,
    pub loan_id: String,
    pub borrower_id: String,
    /// BSK quantity to add, as a decimal string.
    pub amount: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopUpResponse {
    pub request_id: String,
    pub timestamp: String,
    pub accepted: bool,
    /// Collateral after the top-up, as a decimal string.
    pub collateral: String,
}

pub async fn submit_top_up(
    State(state): State<AppState>,
    Json(body): Json<TopUpRequest>,
) -> Result<(StatusCode, Json<TopUpResponse>), AppError> {
    let (receipt, loan) = state
        .engine
        .submit_top_up(TopUpSubmission {
            request_id: body.request_id,
            loan_id: body.loan_id,
            borrower_id: body.borrower_id,
            amount: body.amount,
        })
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(TopUpResponse {
            request_id: receipt.request_id.as_str().to_string(),
            timestamp: receipt.timestamp.to_rfc3339(),
            accepted: true,
            collateral: loan.collateral.to_canonical_string(),
        }),
    ))
}
