use crate::config::Config;
use crate::models::WalletBalance;
use crate::services::wallet_session::WalletProvider;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use ethers::{
    prelude::*,
    providers::{Http, Provider},
    types::{Address, TransactionRequest, U256},
    utils::{format_units, parse_units, to_checksum},
};
use std::sync::Arc;
use tokio::sync::RwLock;

// USDC contract ABI for transfer and balance lookups
abigen!(
    IERC20,
    r#"[
        function transfer(address to, uint256 amount) external returns (bool)
        function balanceOf(address account) external view returns (uint256)
    ]"#
);

const USDC_DECIMALS: u32 = 6;

type SignerClient = SignerMiddleware<Provider<Http>, LocalWallet>;

/// Wallet provider backed by a locally held key on an EVM chain.
pub struct EthersWalletProvider {
    rpc_url: String,
    private_key: Option<String>,
    chain_id: u64,
    usdc_address: Address,
    recipient: Address,
    client: RwLock<Option<Arc<SignerClient>>>,
}

impl EthersWalletProvider {
    pub fn new(config: &Config) -> Self {
        Self {
            rpc_url: config.wallet_rpc_url.clone(),
            private_key: config.wallet_private_key.clone(),
            chain_id: config.wallet_chain_id,
            usdc_address: config.usdc_address,
            recipient: config.recipient_address,
            client: RwLock::new(None),
        }
    }

    async fn client(&self) -> Result<Arc<SignerClient>> {
        self.client
            .read()
            .await
            .clone()
            .ok_or_else(|| anyhow!("Wallet not connected"))
    }

    async fn send_usdc(&self, client: Arc<SignerClient>, amount: f64) -> Result<TransactionReceipt> {
        let units: U256 = parse_units(format!("{:.6}", amount), USDC_DECIMALS)
            .context("Invalid USDC amount")?
            .into();

        let usdc = IERC20::new(self.usdc_address, client);
        let tx = usdc.transfer(self.recipient, units);
        let pending_tx = tx.send().await.context("Failed to send USDC transfer")?;

        tracing::info!("USDC transfer sent, waiting for confirmation...");

        pending_tx
            .await
            .context("Failed to get transaction receipt")?
            .ok_or_else(|| anyhow!("Transaction dropped"))
    }

    async fn send_eth(&self, client: Arc<SignerClient>, amount: f64) -> Result<TransactionReceipt> {
        let wei: U256 = parse_units(format!("{:.18}", amount), "ether")
            .context("Invalid ETH amount")?
            .into();

        let tx = TransactionRequest::new().to(self.recipient).value(wei);
        let pending_tx = client
            .send_transaction(tx, None)
            .await
            .context("Failed to send ETH transfer")?;

        tracing::info!("ETH transfer sent, waiting for confirmation...");

        pending_tx
            .await
            .context("Failed to get transaction receipt")?
            .ok_or_else(|| anyhow!("Transaction dropped"))
    }
}

#[async_trait]
impl WalletProvider for EthersWalletProvider {
    async fn connect(&self) -> Result<String> {
        let private_key = self
            .private_key
            .as_deref()
            .context("WALLET_PRIVATE_KEY not configured")?;

        let provider = Provider::<Http>::try_from(self.rpc_url.as_str())?;
        let chain_id = provider
            .get_chainid()
            .await
            .context("Wallet RPC unreachable")?;
        if chain_id != U256::from(self.chain_id) {
            bail!("RPC serves chain {}, expected {}", chain_id, self.chain_id);
        }

        let wallet = private_key
            .parse::<LocalWallet>()
            .context("Invalid WALLET_PRIVATE_KEY")?
            .with_chain_id(self.chain_id);
        let address = to_checksum(&wallet.address(), None);

        *self.client.write().await = Some(Arc::new(SignerMiddleware::new(provider, wallet)));

        Ok(address)
    }

    async fn balances(&self, address: &str) -> Result<Vec<WalletBalance>> {
        let client = self.client().await?;
        let owner: Address = address.parse().context("Invalid wallet address")?;
        let usdc = IERC20::new(self.usdc_address, client.clone());

        let (eth, usdc_balance) = futures::try_join!(
            async { client.get_balance(owner, None).await.map_err(anyhow::Error::from) },
            async { usdc.balance_of(owner).call().await.map_err(anyhow::Error::from) },
        )?;

        Ok(vec![
            WalletBalance::new("ETH", format_units(eth, "ether")?.parse()?),
            WalletBalance::new("USDC", format_units(usdc_balance, USDC_DECIMALS)?.parse()?),
        ])
    }

    async fn transfer(&self, amount: f64, asset: &str, description: &str) -> Result<String> {
        let client = self.client().await?;

        tracing::info!(
            "Sending {} {} to {:?} for {}",
            amount,
            asset,
            self.recipient,
            description
        );

        let receipt = match asset.to_uppercase().as_str() {
            "USDC" => self.send_usdc(client, amount).await?,
            "ETH" => self.send_eth(client, amount).await?,
            other => bail!("Unsupported settlement asset: {}", other),
        };

        if receipt.status != Some(1.into()) {
            bail!("Transaction failed onchain");
        }

        tracing::info!("Payment confirmed: {:?}", receipt.transaction_hash);

        Ok(format!("{:?}", receipt.transaction_hash))
    }

    async fn disconnect(&self) {
        *self.client.write().await = None;
    }
}
