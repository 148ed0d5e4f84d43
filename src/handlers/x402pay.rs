use crate::{
    error::PaymentError,
    handlers::AppState,
    models::ApiResponse,
    services::IntentStatus,
};
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct X402Callback {
    pub payment_id: String,
    pub status: IntentStatus,
}

/// Confirmation webhook from x402pay.
pub async fn x402pay_callback(
    State(state): State<AppState>,
    Json(callback): Json<X402Callback>,
) -> Result<Json<ApiResponse<X402Callback>>, PaymentError> {
    let status = state
        .x402pay
        .confirm(&callback.payment_id, callback.status)
        .await?;

    Ok(Json(ApiResponse::ok(X402Callback {
        payment_id: callback.payment_id,
        status,
    })))
}
