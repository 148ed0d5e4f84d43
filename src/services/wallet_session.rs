use crate::models::{WalletBalance, WalletSessionState};
use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

/// Provisioning and settlement for the wallet behind a session.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Provisions the wallet and returns its public address.
    async fn connect(&self) -> Result<String>;

    async fn balances(&self, address: &str) -> Result<Vec<WalletBalance>>;

    /// Sends `amount` of `asset` to the treasury and returns the settlement tx hash.
    async fn transfer(&self, amount: f64, asset: &str, description: &str) -> Result<String>;

    async fn disconnect(&self) {}
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected {
        address: String,
        balances: Vec<WalletBalance>,
    },
}

/// Process-wide wallet connection. Connect and disconnect are serialized;
/// readers always observe a whole state.
pub struct WalletSession {
    provider: Arc<dyn WalletProvider>,
    connect_timeout: Duration,
    state: RwLock<SessionState>,
    op_lock: Mutex<()>,
}

impl WalletSession {
    pub fn new(provider: Arc<dyn WalletProvider>, connect_timeout: Duration) -> Self {
        Self {
            provider,
            connect_timeout,
            state: RwLock::new(SessionState::Disconnected),
            op_lock: Mutex::new(()),
        }
    }

    /// Returns `true` once connected. Never errors; provisioning problems
    /// leave the session disconnected and return `false`.
    pub async fn connect(&self) -> bool {
        let _op = self.op_lock.lock().await;

        if matches!(*self.state.read().await, SessionState::Connected { .. }) {
            return true;
        }

        *self.state.write().await = SessionState::Connecting;

        let address = match tokio::time::timeout(self.connect_timeout, self.provider.connect()).await {
            Ok(Ok(address)) => address,
            Ok(Err(e)) => {
                tracing::warn!("Wallet connection failed: {:#}", e);
                *self.state.write().await = SessionState::Disconnected;
                return false;
            }
            Err(_) => {
                tracing::warn!("Wallet connection timed out after {:?}", self.connect_timeout);
                *self.state.write().await = SessionState::Disconnected;
                return false;
            }
        };

        let balances = self.fetch_balances(&address).await;

        tracing::info!("Wallet connected: {}", address);
        *self.state.write().await = SessionState::Connected { address, balances };
        true
    }

    pub async fn disconnect(&self) {
        let _op = self.op_lock.lock().await;

        let was_connected = matches!(*self.state.read().await, SessionState::Connected { .. });
        *self.state.write().await = SessionState::Disconnected;

        if was_connected {
            self.provider.disconnect().await;
            tracing::info!("Wallet disconnected");
        }
    }

    pub async fn state(&self) -> SessionState {
        self.state.read().await.clone()
    }

    pub async fn is_connected(&self) -> bool {
        matches!(*self.state.read().await, SessionState::Connected { .. })
    }

    pub async fn address(&self) -> Option<String> {
        match &*self.state.read().await {
            SessionState::Connected { address, .. } => Some(address.clone()),
            _ => None,
        }
    }

    pub async fn balances(&self) -> Vec<WalletBalance> {
        match &*self.state.read().await {
            SessionState::Connected { balances, .. } => balances.clone(),
            _ => Vec::new(),
        }
    }

    /// Known balance of `asset`, zero when the wallet does not hold it.
    pub async fn balance_of(&self, asset: &str) -> f64 {
        self.balances()
            .await
            .iter()
            .filter(|balance| balance.asset.eq_ignore_ascii_case(asset))
            .map(|balance| balance.amount)
            .sum()
    }

    pub async fn snapshot(&self) -> WalletSessionState {
        match &*self.state.read().await {
            SessionState::Connected { address, balances } => WalletSessionState {
                is_connected: true,
                address: Some(address.clone()),
                balances: balances.clone(),
            },
            _ => WalletSessionState::default(),
        }
    }

    /// Re-reads balances from the provider while connected.
    pub async fn refresh_balances(&self) {
        let _op = self.op_lock.lock().await;

        let Some(address) = self.address().await else {
            return;
        };
        let fresh = self.fetch_balances(&address).await;

        if let SessionState::Connected { balances, .. } = &mut *self.state.write().await {
            *balances = fresh;
        }
    }

    pub async fn transfer(&self, amount: f64, asset: &str, description: &str) -> Result<String> {
        if !self.is_connected().await {
            bail!("Wallet not connected");
        }
        self.provider.transfer(amount, asset, description).await
    }

    async fn fetch_balances(&self, address: &str) -> Vec<WalletBalance> {
        match self.provider.balances(address).await {
            Ok(balances) => balances,
            Err(e) => {
                tracing::warn!("Failed to get wallet balance for {}: {:#}", address, e);
                Vec::new()
            }
        }
    }
}
