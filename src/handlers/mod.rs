pub mod health;
pub mod payments;
pub mod revenue;
pub mod wallet;
pub mod x402pay;

pub use health::*;
pub use payments::*;
pub use revenue::*;
pub use wallet::*;
pub use x402pay::*;

use crate::services::{PaymentOrchestrator, X402PayService};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Instant;
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: PaymentOrchestrator,
    pub x402pay: Arc<X402PayService>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(orchestrator: PaymentOrchestrator, x402pay: Arc<X402PayService>) -> Self {
        Self {
            orchestrator,
            x402pay,
            started_at: Instant::now(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/payments", post(process_payment))
        .route("/api/payments/history", get(payment_history))
        .route("/api/wallet", get(wallet_status))
        .route("/api/wallet/connect", post(connect_wallet))
        .route("/api/wallet/disconnect", post(disconnect_wallet))
        .route("/api/revenue/distributions", get(revenue_distributions))
        .route("/api/revenue/totals", get(revenue_totals))
        .route("/api/x402pay/callback", post(x402pay_callback))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::default().include_headers(true)),
                )
                .layer(CorsLayer::permissive()),
        )
}
