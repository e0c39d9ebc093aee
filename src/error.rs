use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::db::RequestOutcome;
use crate::lifecycle::LifecycleError;

/// HTTP-facing error. Only validation, idempotency and domain conflicts ever
/// reach a caller; everything else collapses into a 500.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Duplicate request: {0}")]
    Duplicate(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Domain conflict: {0}")]
    DomainConflict(String),
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<LifecycleError> for AppError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::Validation(msg) => AppError::Validation(msg),
            LifecycleError::Duplicate { request_id, outcome } => {
                let original = match outcome {
                    RequestOutcome::Accepted => "accepted".to_string(),
                    RequestOutcome::Rejected { reason } => format!("rejected ({})", reason),
                };
                AppError::Duplicate(format!(
                    "request {} already processed, original outcome: {}",
                    request_id, original
                ))
            }
            LifecycleError::Conflict(loan_id) => {
                AppError::Conflict(format!("loan {} exists with different terms", loan_id))
            }
            LifecycleError::NotFound(loan_id) => {
                AppError::NotFound(format!("loan {}", loan_id))
            }
            LifecycleError::BorrowerMismatch(loan_id) => {
                AppError::DomainConflict(format!("borrower does not own loan {}", loan_id))
            }
            LifecycleError::Terminal { loan_id, status } => {
                AppError::DomainConflict(format!("loan {} is {}", loan_id, status))
            }
            LifecycleError::Store(e) => AppError::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Duplicate(msg) => (StatusCode::CONFLICT, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::DomainConflict(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{LoanId, LoanStatus, RequestId};

    fn status_of(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_of(AppError::Validation("bad".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(AppError::Duplicate("dup".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(AppError::NotFound("gone".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(AppError::DomainConflict("terminal".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(AppError::Internal("boom".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_lifecycle_error_conversion() {
        let err: AppError = LifecycleError::Duplicate {
            request_id: RequestId::new("r-1"),
            outcome: RequestOutcome::Accepted,
        }
        .into();
        assert_eq!(status_of(err), StatusCode::CONFLICT);

        let err: AppError = LifecycleError::Terminal {
            loan_id: LoanId::new("L1"),
            status: LoanStatus::Liquidated,
        }
        .into();
        assert_eq!(status_of(err), StatusCode::BAD_REQUEST);

        let err: AppError = LifecycleError::NotFound(LoanId::new("L1")).into();
        assert_eq!(status_of(err), StatusCode::NOT_FOUND);
    }
}
