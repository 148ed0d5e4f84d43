use anyhow::{Context, Result};
use soulforge_pay::{
    config::Config,
    handlers::{router, AppState},
    services::*,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    tracing::info!("Starting SoulForge Pay v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Environment: {:?}", config.environment);

    // Revenue ledger
    let store = ledger_store(&config).await;
    let ledger = Arc::new(
        RevenueLedger::restore(config.revenue_split(), store)
            .await
            .context("Failed to restore revenue ledger")?
            .with_store_timeout(config.ledger_store_timeout),
    );

    // Wallet session
    let wallet = Arc::new(WalletSession::new(
        Arc::new(EthersWalletProvider::new(&config)),
        config.wallet_connect_timeout,
    ));

    // Payment rails
    let gateway = Arc::new(HttpX402PayGateway::new(
        config.x402pay_endpoint.clone(),
        config.x402pay_api_key.clone(),
    )?);
    let x402pay = Arc::new(X402PayService::new(
        gateway,
        X402PaySettings {
            recipient: format!("{:?}", config.recipient_address),
            callback_url: config.x402pay_callback_url.clone(),
            poll_interval: config.x402pay_poll_interval,
            confirmation_timeout: config.x402pay_confirmation_timeout,
        },
    ));
    let wallet_rail = Arc::new(WalletPaymentService::new(
        wallet.clone(),
        config.wallet_settlement_timeout,
    ));

    let orchestrator = PaymentOrchestrator::new(wallet, ledger.clone(), config.routing_policy())
        .with_backend(x402pay.clone())
        .with_backend(wallet_rail);

    // Retry ledger writes that failed to reach the store
    tokio::spawn({
        let ledger = ledger.clone();
        let every = config.ledger_retry_interval;
        async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                let remaining = ledger.flush_pending().await;
                if remaining > 0 {
                    tracing::warn!("{} ledger writes still queued", remaining);
                }
            }
        }
    });

    let app = router(AppState::new(orchestrator, x402pay));

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on http://{}", addr);
    tracing::info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let remaining = ledger.flush_pending().await;
    if remaining > 0 {
        tracing::error!("Shutting down with {} unpersisted ledger entries", remaining);
    }

    Ok(())
}

async fn ledger_store(config: &Config) -> Arc<dyn LedgerStore> {
    let Some(url) = &config.redis_url else {
        tracing::warn!("REDIS_URL not set, revenue ledger kept in memory only");
        return Arc::new(MemoryLedgerStore::default());
    };

    match RedisLedgerStore::connect(url).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::warn!("{:#}, revenue ledger kept in memory only", e);
            Arc::new(MemoryLedgerStore::default())
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for ctrl+c: {}", e);
    }
    tracing::info!("Shutting down gracefully...");
}
