use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::AppState;
use crate::error::AppError;
use crate::lifecycle::ApplicationSubmission;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationRequest {
    pub request_id: String,
    pub loan_id: String,
    pub borrower_id: String,
    /// Principal in GC, as a decimal string.
    pub amount: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationResponse {
    pub request_id: String,
    pub timestamp: String,
    pub accepted: bool,
}

pub async fn submit_application(
    State(state): State<AppState>,
    Json(body): Json<ApplicationRequest>,
) -> Result<(StatusCode, Json<ApplicationResponse>), AppError> {
    let receipt = state
        .engine
        .submit_application(ApplicationSubmission {
            request_id: body.request_id,
            loan_id: body.loan_id,
            borrower_id: body.borrower_id,
            amount: body.amount,
        })
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(ApplicationResponse {
            request_id: receipt.request_id.as_str().to_string(),
            timestamp: receipt.timestamp.to_rfc3339(),
            accepted: true,
        }),
    ))
}
