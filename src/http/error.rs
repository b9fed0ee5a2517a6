//! HTTP error mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::cod::EligibilityError;
use crate::orders::OrderServiceError;
use crate::payments::PaymentServiceError;
use crate::ports::PaymentError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Order(#[from] OrderServiceError),
    #[error(transparent)]
    Payment(#[from] PaymentServiceError),
    #[error(transparent)]
    Eligibility(#[from] EligibilityError),
    #[error("bad request: {0}")]
    BadRequest(String),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Order(OrderServiceError::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::Order(OrderServiceError::Transition(_)) => StatusCode::CONFLICT,
            Self::Order(OrderServiceError::Store(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Payment(PaymentServiceError::MissingFields | PaymentServiceError::NonPositiveAmount) => StatusCode::BAD_REQUEST,
            Self::Payment(PaymentServiceError::Gateway(PaymentError::Rejected { status, .. })) => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            Self::Payment(PaymentServiceError::Gateway(_)) => StatusCode::BAD_GATEWAY,
            Self::Payment(PaymentServiceError::Store(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Eligibility(EligibilityError::AccountMissing(_)) => StatusCode::NOT_FOUND,
            Self::Eligibility(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        // Gateway rejections are passed through so the caller sees the reason.
        let body = match self {
            Self::Payment(PaymentServiceError::Gateway(PaymentError::Rejected { body, .. })) => json!({ "error": body }),
            _ if status == StatusCode::INTERNAL_SERVER_ERROR => json!({ "error": "Internal server error" }),
            other => json!({ "error": other.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}
