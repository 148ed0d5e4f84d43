pub mod ethereum;
pub mod ledger;
pub mod orchestrator;
pub mod wallet_payment;
pub mod wallet_session;
pub mod x402pay;

pub use ethereum::EthersWalletProvider;
pub use ledger::{LedgerStore, MemoryLedgerStore, RedisLedgerStore, RevenueLedger};
pub use orchestrator::{PaymentOrchestrator, RoutingPolicy};
pub use wallet_payment::WalletPaymentService;
pub use wallet_session::{SessionState, WalletProvider, WalletSession};
pub use x402pay::{HttpX402PayGateway, IntentStatus, X402PayGateway, X402PayService, X402PaySettings};

use crate::error::BackendError;
use crate::models::{BackendOutcome, PaymentMethod, PaymentRequest};
use async_trait::async_trait;

/// One payment rail, as seen by the orchestrator.
#[async_trait]
pub trait PaymentBackend: Send + Sync {
    fn method(&self) -> PaymentMethod;

    async fn create_payment(&self, request: &PaymentRequest) -> Result<BackendOutcome, BackendError>;
}
