#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use soulforge_pay::{
    error::BackendError,
    models::{BackendOutcome, LedgerEntry, PaymentMethod, PaymentRequest, RevenueSplit, WalletBalance},
    services::{
        x402pay::{CreateIntentRequest, X402Intent},
        IntentStatus, LedgerStore, MemoryLedgerStore, PaymentBackend, PaymentOrchestrator, RevenueLedger,
        RoutingPolicy, WalletPaymentService, WalletProvider, WalletSession, X402PayGateway,
        X402PayService, X402PaySettings,
    },
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const WALLET_ADDRESS: &str = "0x742d35Cc6634C0532925a3b8D4C9db96590e4CAF";

/// Rail double that counts calls and hands out sequential ids.
pub struct FakeBackend {
    method: PaymentMethod,
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
    pub delay: Duration,
}

impl FakeBackend {
    pub fn new(method: PaymentMethod) -> Arc<Self> {
        Self::with_delay(method, Duration::ZERO)
    }

    pub fn with_delay(method: PaymentMethod, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            method,
            calls: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
            delay,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentBackend for FakeBackend {
    fn method(&self) -> PaymentMethod {
        self.method
    }

    async fn create_payment(&self, _request: &PaymentRequest) -> Result<BackendOutcome, BackendError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(BackendError::Rejected("simulated failure".into()));
        }
        Ok(match self.method {
            PaymentMethod::X402Pay => BackendOutcome::completed(format!("x402_{}", n)),
            PaymentMethod::Wallet => BackendOutcome::settled(format!("wallet_{}", n), format!("0x{:064x}", n + 1)),
        })
    }
}

/// Wallet provider double with a fixed USDC balance.
#[derive(Default)]
pub struct FakeWalletProvider {
    pub offline: AtomicBool,
    pub transfers: AtomicUsize,
}

#[async_trait]
impl WalletProvider for FakeWalletProvider {
    async fn connect(&self) -> Result<String> {
        if self.offline.load(Ordering::SeqCst) {
            bail!("wallet provisioning failed");
        }
        Ok(WALLET_ADDRESS.to_string())
    }

    async fn balances(&self, _address: &str) -> Result<Vec<WalletBalance>> {
        Ok(vec![
            WalletBalance::new("ETH", 0.1),
            WalletBalance::new("USDC", 100.0),
        ])
    }

    async fn transfer(&self, _amount: f64, _asset: &str, _description: &str) -> Result<String> {
        let n = self.transfers.fetch_add(1, Ordering::SeqCst);
        Ok(format!("0x{:064x}", 0xabc0 + n))
    }
}

/// x402pay API double: intents start pending and complete on the first poll,
/// unless `unsettled` is set.
#[derive(Default)]
pub struct FakeGateway {
    created: AtomicUsize,
    pub unsettled: AtomicBool,
}

#[async_trait]
impl X402PayGateway for FakeGateway {
    async fn create_intent(&self, request: &CreateIntentRequest) -> Result<X402Intent, BackendError> {
        let n = self.created.fetch_add(1, Ordering::SeqCst);
        Ok(X402Intent {
            payment_id: format!("x402_{}", n),
            payment_url: format!("https://api.x402pay.com/pay/x402_{}", n),
            amount: request.amount,
            currency: request.currency.clone(),
            status: IntentStatus::Pending,
            expires_at: Utc::now() + chrono::Duration::minutes(15),
        })
    }

    async fn fetch_status(&self, _payment_id: &str) -> Result<IntentStatus, BackendError> {
        if self.unsettled.load(Ordering::SeqCst) {
            return Ok(IntentStatus::Pending);
        }
        Ok(IntentStatus::Completed)
    }
}

/// Ledger store whose writes never answer.
pub struct HungStore;

#[async_trait]
impl LedgerStore for HungStore {
    async fn append(&self, _entry: &LedgerEntry) -> Result<()> {
        futures::future::pending::<Result<()>>().await
    }

    async fn load(&self) -> Result<Vec<LedgerEntry>> {
        Ok(Vec::new())
    }
}

pub fn session(provider: Arc<FakeWalletProvider>) -> Arc<WalletSession> {
    Arc::new(WalletSession::new(provider, Duration::from_millis(500)))
}

pub fn ledger() -> Arc<RevenueLedger> {
    Arc::new(RevenueLedger::new(
        RevenueSplit::default(),
        Arc::new(MemoryLedgerStore::default()),
    ))
}

pub fn x402pay_service(gateway: Arc<FakeGateway>, confirmation_timeout: Duration) -> Arc<X402PayService> {
    Arc::new(X402PayService::new(
        gateway,
        X402PaySettings {
            recipient: WALLET_ADDRESS.to_string(),
            callback_url: None,
            poll_interval: Duration::from_millis(10),
            confirmation_timeout,
        },
    ))
}

/// Orchestrator wired with the real rails over test doubles.
pub fn real_rails(provider: Arc<FakeWalletProvider>) -> (PaymentOrchestrator, Arc<X402PayService>) {
    real_rails_with(
        provider,
        x402pay_service(Arc::new(FakeGateway::default()), Duration::from_secs(2)),
        ledger(),
    )
}

pub fn real_rails_with(
    provider: Arc<FakeWalletProvider>,
    x402pay: Arc<X402PayService>,
    ledger: Arc<RevenueLedger>,
) -> (PaymentOrchestrator, Arc<X402PayService>) {
    let wallet = session(provider);
    let orchestrator = PaymentOrchestrator::new(wallet.clone(), ledger, RoutingPolicy::default())
        .with_backend(x402pay.clone())
        .with_backend(Arc::new(WalletPaymentService::new(wallet, Duration::from_secs(2))));
    (orchestrator, x402pay)
}
