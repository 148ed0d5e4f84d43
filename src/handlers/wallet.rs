use crate::{
    handlers::AppState,
    models::{ApiResponse, ConnectResponse, WalletStatus},
};
use axum::{extract::State, Json};

pub async fn wallet_status(
    State(state): State<AppState>,
) -> Json<ApiResponse<WalletStatus>> {
    Json(ApiResponse::ok(state.orchestrator.wallet_status().await))
}

pub async fn connect_wallet(
    State(state): State<AppState>,
) -> Json<ApiResponse<ConnectResponse>> {
    let connected = state.orchestrator.connect_wallet().await;
    Json(ApiResponse::ok(ConnectResponse { connected }))
}

pub async fn disconnect_wallet(
    State(state): State<AppState>,
) -> Json<ApiResponse<ConnectResponse>> {
    state.orchestrator.disconnect_wallet().await;
    Json(ApiResponse::ok(ConnectResponse { connected: false }))
}
