use crate::error::{LedgerError, PaymentError};
use crate::models::{
    PaymentMethod, PaymentRequest, PaymentResult, RequestedMethod, RevenueDistribution,
    RevenueRecord, WalletStatus,
};
use crate::services::{PaymentBackend, RevenueLedger, WalletSession};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Auto-resolution policy for requests that do not name a rail.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoutingPolicy {
    pub wallet_min_amount: f64,
}

impl Default for RoutingPolicy {
    fn default() -> Self {
        Self {
            wallet_min_amount: 0.10,
        }
    }
}

impl RoutingPolicy {
    pub fn new(wallet_min_amount: f64) -> Self {
        Self { wallet_min_amount }
    }

    pub fn resolve(&self, requested: RequestedMethod, amount: f64, wallet_connected: bool) -> PaymentMethod {
        match requested {
            RequestedMethod::X402Pay => PaymentMethod::X402Pay,
            RequestedMethod::Wallet => PaymentMethod::Wallet,
            RequestedMethod::Auto if wallet_connected && amount >= self.wallet_min_amount => {
                PaymentMethod::Wallet
            }
            RequestedMethod::Auto => PaymentMethod::X402Pay,
        }
    }
}

/// Single entry point for payments: picks a rail, runs it, and books the
/// revenue of every successful payment.
#[derive(Clone)]
pub struct PaymentOrchestrator {
    backends: HashMap<PaymentMethod, Arc<dyn PaymentBackend>>,
    wallet: Arc<WalletSession>,
    ledger: Arc<RevenueLedger>,
    policy: RoutingPolicy,
}

impl PaymentOrchestrator {
    pub fn new(wallet: Arc<WalletSession>, ledger: Arc<RevenueLedger>, policy: RoutingPolicy) -> Self {
        Self {
            backends: HashMap::new(),
            wallet,
            ledger,
            policy,
        }
    }

    /// Registers `backend` for the rail it reports, replacing any previous one.
    pub fn with_backend(mut self, backend: Arc<dyn PaymentBackend>) -> Self {
        self.backends.insert(backend.method(), backend);
        self
    }

    pub async fn resolve_method(&self, request: &PaymentRequest) -> PaymentMethod {
        let wallet_connected = match request.method {
            RequestedMethod::Auto => self.wallet.is_connected().await,
            _ => false,
        };
        self.policy.resolve(request.method, request.amount, wallet_connected)
    }

    /// Runs one payment to completion, ledger append included.
    ///
    /// Rail failures come back as `Ok` with `success == false`. `Err` is
    /// reserved for invalid requests and rails that were never registered.
    pub async fn process_payment(&self, request: PaymentRequest) -> Result<PaymentResult, PaymentError> {
        let request = request.normalized()?;
        let method = self.resolve_method(&request).await;

        let Some(backend) = self.backends.get(&method).cloned() else {
            tracing::error!("No backend registered for resolved method {}", method);
            return Err(PaymentError::UnsupportedMethod(method));
        };

        // Detached so an abandoned caller does not cancel settlement or bookkeeping
        let ledger = self.ledger.clone();
        let task = tokio::spawn(async move { settle(backend, ledger, method, request).await });

        match task.await {
            Ok(result) => Ok(result),
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => Err(PaymentError::InternalError(e.to_string())),
        }
    }

    pub async fn wallet_status(&self) -> WalletStatus {
        let session = self.wallet.snapshot().await;
        WalletStatus {
            address: session.address,
            balances: session.balances,
            total_revenue: self.ledger.totals().await,
            is_connected: session.is_connected,
        }
    }

    pub async fn connect_wallet(&self) -> bool {
        self.wallet.connect().await
    }

    pub async fn disconnect_wallet(&self) {
        self.wallet.disconnect().await
    }

    pub async fn payment_history(&self) -> Vec<RevenueRecord> {
        self.ledger.history().await
    }

    pub async fn revenue_distributions(&self) -> Vec<RevenueDistribution> {
        self.ledger.distributions().await
    }

    pub async fn revenue_totals(&self) -> BTreeMap<String, f64> {
        self.ledger.totals().await
    }

    pub fn ledger(&self) -> &Arc<RevenueLedger> {
        &self.ledger
    }

    pub fn wallet(&self) -> &Arc<WalletSession> {
        &self.wallet
    }
}

async fn settle(
    backend: Arc<dyn PaymentBackend>,
    ledger: Arc<RevenueLedger>,
    method: PaymentMethod,
    request: PaymentRequest,
) -> PaymentResult {
    let result = match backend.create_payment(&request).await {
        Ok(outcome) => PaymentResult::from_outcome(&request, method, outcome),
        Err(e) => {
            tracing::warn!("{} payment failed for {}: {}", method, request.description, e);
            PaymentResult::failed(&request, method)
        }
    };

    if !result.success {
        return result;
    }

    match ledger.record(&result).await {
        Ok(_) => {}
        Err(LedgerError::DuplicatePayment(id)) => {
            tracing::error!("Backend {} reused payment id {}, ledger unchanged", method, id);
        }
        Err(e) => {
            tracing::error!("Failed to record payment {}: {}", result.payment_id, e);
        }
    }

    tracing::info!(
        payment_id = %result.payment_id,
        method = %result.method,
        amount = result.amount,
        currency = %result.currency,
        "Payment completed"
    );

    result
}
