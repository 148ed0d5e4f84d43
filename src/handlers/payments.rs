use crate::{
    error::PaymentError,
    handlers::AppState,
    models::{ApiResponse, PaymentRequest, PaymentResult, RevenueRecord},
};
use axum::{extract::State, Json};

pub async fn process_payment(
    State(state): State<AppState>,
    Json(request): Json<PaymentRequest>,
) -> Result<Json<ApiResponse<PaymentResult>>, PaymentError> {
    let result = state.orchestrator.process_payment(request).await?;
    Ok(Json(ApiResponse::ok(result)))
}

pub async fn payment_history(
    State(state): State<AppState>,
) -> Json<ApiResponse<Vec<RevenueRecord>>> {
    Json(ApiResponse::ok(state.orchestrator.payment_history().await))
}
