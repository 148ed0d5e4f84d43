use crate::error::BackendError;
use crate::models::{BackendOutcome, PaymentMethod, PaymentRequest};
use crate::services::{PaymentBackend, WalletSession};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Asset that settles a payment denominated in `currency`.
pub fn settlement_asset(currency: &str) -> String {
    let currency = currency.to_uppercase();
    if currency == "USD" {
        "USDC".to_string()
    } else {
        currency
    }
}

/// Wallet rail: on-chain transfer from the session wallet to the treasury.
pub struct WalletPaymentService {
    session: Arc<WalletSession>,
    settlement_timeout: Duration,
}

impl WalletPaymentService {
    pub fn new(session: Arc<WalletSession>, settlement_timeout: Duration) -> Self {
        Self {
            session,
            settlement_timeout,
        }
    }
}

#[async_trait]
impl PaymentBackend for WalletPaymentService {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Wallet
    }

    async fn create_payment(&self, request: &PaymentRequest) -> Result<BackendOutcome, BackendError> {
        if !self.session.is_connected().await && !self.session.connect().await {
            return Err(BackendError::WalletNotConnected);
        }

        let asset = settlement_asset(&request.currency);
        let available = self.session.balance_of(&asset).await;
        if available < request.amount {
            return Err(BackendError::InsufficientBalance {
                asset,
                required: request.amount,
                available,
            });
        }

        let payment_id = format!("wallet_{}", Uuid::new_v4().simple());
        tracing::info!(
            "Wallet payment {}: {} {} for {}",
            payment_id,
            request.amount,
            asset,
            request.description
        );

        let transaction_id = tokio::time::timeout(
            self.settlement_timeout,
            self.session.transfer(request.amount, &asset, &request.description),
        )
        .await
        .map_err(|_| {
            tracing::error!(
                payment_id = %payment_id,
                amount = request.amount,
                asset = %asset,
                "Wallet settlement timed out after {:?}, transfer may still land onchain",
                self.settlement_timeout
            );
            BackendError::Timeout(self.settlement_timeout)
        })??;

        self.session.refresh_balances().await;

        Ok(BackendOutcome::settled(payment_id, transaction_id))
    }
}
