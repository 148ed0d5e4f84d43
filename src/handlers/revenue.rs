use crate::{
    handlers::AppState,
    models::{ApiResponse, RevenueDistribution},
};
use axum::{extract::State, Json};
use std::collections::BTreeMap;

pub async fn revenue_distributions(
    State(state): State<AppState>,
) -> Json<ApiResponse<Vec<RevenueDistribution>>> {
    Json(ApiResponse::ok(state.orchestrator.revenue_distributions().await))
}

pub async fn revenue_totals(
    State(state): State<AppState>,
) -> Json<ApiResponse<BTreeMap<String, f64>>> {
    Json(ApiResponse::ok(state.orchestrator.revenue_totals().await))
}
