use crate::models::RevenueSplit;
use crate::services::RoutingPolicy;
use anyhow::{bail, Context, Result};
use ethers::types::Address;
use std::str::FromStr;
use std::time::Duration;

// Base Sepolia USDC
const DEFAULT_USDC_ADDRESS: &str = "0x036CbD53842c5426634e7929541eC2318f3dCF7e";

#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    Development,
    Testnet,
    Production,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub environment: Environment,
    pub host: String,
    pub port: u16,

    // Treasury receiving both rails
    pub recipient_address: Address,

    // x402pay
    pub x402pay_endpoint: String,
    pub x402pay_api_key: Option<String>,
    pub x402pay_callback_url: Option<String>,
    pub x402pay_poll_interval: Duration,
    pub x402pay_confirmation_timeout: Duration,

    // Wallet rail
    pub wallet_rpc_url: String,
    pub wallet_chain_id: u64,
    pub usdc_address: Address,
    pub wallet_private_key: Option<String>,
    pub wallet_connect_timeout: Duration,
    pub wallet_settlement_timeout: Duration,

    // Business constants
    pub platform_fee_rate: f64,
    pub wallet_min_amount: f64,

    // Ledger
    pub redis_url: Option<String>,
    pub ledger_retry_interval: Duration,
    pub ledger_store_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup.
    pub fn from_vars<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(&lookup);

        let config = Self {
            environment: Self::parse_environment(&vars.or("ENVIRONMENT", "development"))?,
            host: vars.or("HOST", "0.0.0.0"),
            port: vars.parse("PORT", "8080")?,

            recipient_address: vars.address("RECIPIENT_ADDRESS", None)?,

            x402pay_endpoint: vars
                .or("X402PAY_ENDPOINT", "https://api.x402pay.com")
                .trim_end_matches('/')
                .to_string(),
            x402pay_api_key: vars.get("X402PAY_API_KEY"),
            x402pay_callback_url: vars.get("X402PAY_CALLBACK_URL"),
            x402pay_poll_interval: Duration::from_millis(
                vars.parse("X402PAY_POLL_INTERVAL_MS", "2000")?,
            ),
            x402pay_confirmation_timeout: Duration::from_secs(
                vars.parse("X402PAY_CONFIRMATION_TIMEOUT_SECS", "120")?,
            ),

            wallet_rpc_url: vars.or("WALLET_RPC_URL", "https://sepolia.base.org"),
            wallet_chain_id: vars.parse("WALLET_CHAIN_ID", "84532")?,
            usdc_address: vars.address("USDC_ADDRESS", Some(DEFAULT_USDC_ADDRESS))?,
            wallet_private_key: vars.get("WALLET_PRIVATE_KEY"),
            wallet_connect_timeout: Duration::from_secs(
                vars.parse("WALLET_CONNECT_TIMEOUT_SECS", "10")?,
            ),
            wallet_settlement_timeout: Duration::from_secs(
                vars.parse("WALLET_SETTLEMENT_TIMEOUT_SECS", "60")?,
            ),

            platform_fee_rate: vars.parse("PLATFORM_FEE_RATE", "0.10")?,
            wallet_min_amount: vars.parse("WALLET_MIN_AMOUNT", "0.10")?,

            redis_url: vars.get("REDIS_URL"),
            ledger_retry_interval: Duration::from_secs(
                vars.parse("LEDGER_RETRY_INTERVAL_SECS", "30")?,
            ),
            ledger_store_timeout: Duration::from_secs(
                vars.parse("LEDGER_STORE_TIMEOUT_SECS", "5")?,
            ),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn revenue_split(&self) -> RevenueSplit {
        RevenueSplit::new(self.platform_fee_rate)
    }

    pub fn routing_policy(&self) -> RoutingPolicy {
        RoutingPolicy::new(self.wallet_min_amount)
    }

    fn parse_environment(env: &str) -> Result<Environment> {
        match env.to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "testnet" | "test" => Ok(Environment::Testnet),
            "production" | "prod" => Ok(Environment::Production),
            _ => bail!("Unknown environment: {}", env),
        }
    }

    fn validate(&self) -> Result<()> {
        if !self.x402pay_endpoint.starts_with("http") {
            bail!("X402PAY_ENDPOINT must be HTTP(S) URL");
        }
        if !self.wallet_rpc_url.starts_with("http") {
            bail!("WALLET_RPC_URL must be HTTP(S) URL");
        }

        if let Some(key) = &self.wallet_private_key {
            if !key.starts_with("0x") {
                bail!("WALLET_PRIVATE_KEY must start with 0x");
            }
        }

        if !(0.0..=1.0).contains(&self.platform_fee_rate) {
            bail!("PLATFORM_FEE_RATE must be between 0 and 1");
        }
        if !self.wallet_min_amount.is_finite() || self.wallet_min_amount < 0.0 {
            bail!("WALLET_MIN_AMOUNT must be a non-negative number");
        }

        if self.x402pay_poll_interval.is_zero()
            || self.x402pay_confirmation_timeout.is_zero()
            || self.wallet_connect_timeout.is_zero()
            || self.wallet_settlement_timeout.is_zero()
            || self.ledger_retry_interval.is_zero()
            || self.ledger_store_timeout.is_zero()
        {
            bail!("Poll intervals and timeouts must be greater than zero");
        }

        tracing::info!(
            "Configuration validated for {:?} environment",
            self.environment
        );

        Ok(())
    }
}

struct Vars<'a, F>(&'a F);

impl<F> Vars<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|value| !value.trim().is_empty())
    }

    fn or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn parse<T>(&self, key: &str, default: &str) -> Result<T>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        self.or(key, default)
            .trim()
            .parse()
            .with_context(|| format!("Invalid {}", key))
    }

    fn address(&self, key: &str, default: Option<&str>) -> Result<Address> {
        let addr_str = match (self.get(key), default) {
            (Some(value), _) => value,
            (None, Some(default)) => default.to_string(),
            (None, None) => bail!("{} required", key),
        };
        Address::from_str(&addr_str).with_context(|| format!("Invalid address for {}", key))
    }
}
