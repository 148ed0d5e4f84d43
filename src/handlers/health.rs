use crate::{handlers::AppState, models::HealthStatus};
use axum::{extract::State, Json};
use chrono::Utc;

pub async fn health_check(
    State(state): State<AppState>,
) -> Json<HealthStatus> {
    let pending = state.orchestrator.ledger().pending_writes().await;
    let wallet_connected = state.orchestrator.wallet().is_connected().await;

    let status = if pending == 0 { "healthy" } else { "degraded" };

    Json(HealthStatus {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        wallet_connected,
        pending_ledger_writes: pending,
        uptime_seconds: state.started_at.elapsed().as_secs(),
        timestamp: Utc::now(),
    })
}
