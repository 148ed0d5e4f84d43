use crate::models::PaymentMethod;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced to callers of the payment core.
#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("Invalid payment request: {0}")]
    InvalidRequest(String),

    #[error("Unsupported payment method: {0}")]
    UnsupportedMethod(PaymentMethod),

    #[error("Unknown payment: {0}")]
    UnknownPayment(String),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

/// Rail-level failures. The orchestrator turns these into failed results.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Wallet not connected")]
    WalletNotConnected,

    #[error("Insufficient {asset} balance: {available} < {required}")]
    InsufficientBalance {
        asset: String,
        required: f64,
        available: f64,
    },

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Payment rejected: {0}")]
    Rejected(String),

    #[error("Gateway error: {0}")]
    Gateway(#[from] reqwest::Error),

    #[error("Wallet error: {0}")]
    Wallet(#[from] anyhow::Error),
}

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Payment {0} was not successful")]
    NotSettled(String),

    #[error("Payment {0} already recorded")]
    DuplicatePayment(String),

    #[error("Ledger store error: {0}")]
    Store(#[from] anyhow::Error),
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub error_code: String,
    pub timestamp: chrono::DateTime<Utc>,
    pub request_id: String,
}

impl PaymentError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            PaymentError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            PaymentError::UnknownPayment(_) => (StatusCode::NOT_FOUND, "UNKNOWN_PAYMENT"),
            PaymentError::UnsupportedMethod(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "UNSUPPORTED_METHOD")
            }
            PaymentError::InternalError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for PaymentError {
    fn into_response(self) -> Response {
        let (status, error_code) = self.status_and_code();

        let body = ErrorResponse {
            success: false,
            error: self.to_string(),
            error_code: error_code.to_string(),
            timestamp: Utc::now(),
            request_id: Uuid::new_v4().to_string(),
        };

        tracing::error!(
            error = ?self,
            error_code = error_code,
            "Request failed"
        );

        (status, Json(body)).into_response()
    }
}
