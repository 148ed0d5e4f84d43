use crate::error::LedgerError;
use crate::models::{LedgerEntry, PaymentResult, RevenueDistribution, RevenueRecord, RevenueSplit};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use redis::AsyncCommands;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

const LEDGER_KEY: &str = "soulforge:ledger";
const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

/// Durable, append-only sink for ledger entries.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn append(&self, entry: &LedgerEntry) -> Result<()>;

    async fn load(&self) -> Result<Vec<LedgerEntry>>;
}

/// Keeps entries in process memory only.
#[derive(Default)]
pub struct MemoryLedgerStore {
    entries: Mutex<Vec<LedgerEntry>>,
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn append(&self, entry: &LedgerEntry) -> Result<()> {
        self.entries.lock().await.push(entry.clone());
        Ok(())
    }

    async fn load(&self) -> Result<Vec<LedgerEntry>> {
        Ok(self.entries.lock().await.clone())
    }
}

/// Redis list, one JSON entry per element. RPUSH keeps appends atomic.
pub struct RedisLedgerStore {
    redis: redis::aio::ConnectionManager,
    key: String,
}

impl RedisLedgerStore {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url).context("Invalid REDIS_URL")?;
        let redis = client
            .get_connection_manager()
            .await
            .context("Redis connection failed")?;

        tracing::info!("Redis ledger store connected");

        Ok(Self {
            redis,
            key: LEDGER_KEY.to_string(),
        })
    }
}

#[async_trait]
impl LedgerStore for RedisLedgerStore {
    async fn append(&self, entry: &LedgerEntry) -> Result<()> {
        let serialized = serde_json::to_string(entry)?;
        let mut redis = self.redis.clone();
        redis
            .rpush::<_, _, ()>(&self.key, serialized)
            .await
            .context("RPUSH to ledger failed")?;
        Ok(())
    }

    async fn load(&self) -> Result<Vec<LedgerEntry>> {
        let mut redis = self.redis.clone();
        let raw: Vec<String> = redis
            .lrange(&self.key, 0, -1)
            .await
            .context("LRANGE on ledger failed")?;

        raw.iter()
            .map(|line| serde_json::from_str(line).context("Corrupt ledger entry"))
            .collect()
    }
}

#[derive(Default)]
struct LedgerState {
    records: Vec<RevenueRecord>,
    distributions: Vec<RevenueDistribution>,
    payment_ids: HashSet<String>,
    // Entries accepted in memory but not yet written to the store
    pending: VecDeque<LedgerEntry>,
}

impl LedgerState {
    fn push(&mut self, entry: &LedgerEntry) -> bool {
        if !self.payment_ids.insert(entry.record.payment_id.clone()) {
            return false;
        }
        self.records.push(entry.record.clone());
        self.distributions.push(entry.distribution.clone());
        true
    }
}

/// Append-only record of completed payments and their revenue split.
pub struct RevenueLedger {
    split: RevenueSplit,
    store: Arc<dyn LedgerStore>,
    store_timeout: Duration,
    state: Mutex<LedgerState>,
}

impl RevenueLedger {
    pub fn new(split: RevenueSplit, store: Arc<dyn LedgerStore>) -> Self {
        Self {
            split,
            store,
            store_timeout: DEFAULT_STORE_TIMEOUT,
            state: Mutex::new(LedgerState::default()),
        }
    }

    /// Bounds every store call. A write that overruns stays queued.
    pub fn with_store_timeout(mut self, store_timeout: Duration) -> Self {
        self.store_timeout = store_timeout;
        self
    }

    /// Rebuilds the in-memory view from whatever the store already holds.
    pub async fn restore(split: RevenueSplit, store: Arc<dyn LedgerStore>) -> Result<Self> {
        let entries = tokio::time::timeout(DEFAULT_STORE_TIMEOUT, store.load())
            .await
            .context("Ledger store load timed out")??;
        let ledger = Self::new(split, store);

        {
            let mut state = ledger.state.lock().await;
            for entry in &entries {
                if !state.push(entry) {
                    tracing::warn!(
                        "Skipping duplicate ledger entry for payment {}",
                        entry.record.payment_id
                    );
                }
            }
        }

        tracing::info!("Revenue ledger restored with {} entries", entries.len());
        Ok(ledger)
    }

    pub fn split(&self) -> RevenueSplit {
        self.split
    }

    pub async fn record(&self, result: &PaymentResult) -> Result<RevenueDistribution, LedgerError> {
        if !result.success {
            return Err(LedgerError::NotSettled(result.payment_id.clone()));
        }

        let record = RevenueRecord {
            payment_id: result.payment_id.clone(),
            method: result.method,
            amount: result.amount,
            currency: result.currency.clone(),
            timestamp: result.timestamp,
            transaction_id: result.transaction_id.clone(),
        };
        let distribution = self.split.distribute(&record, Utc::now());
        let entry = LedgerEntry {
            record,
            distribution: distribution.clone(),
        };

        // Held across the store write so persisted order matches memory order
        let mut state = self.state.lock().await;
        if !state.push(&entry) {
            return Err(LedgerError::DuplicatePayment(entry.record.payment_id));
        }

        tracing::info!(
            payment_id = %distribution.payment_id,
            method = %distribution.method,
            total = distribution.total_amount,
            platform_fee = distribution.platform_fee,
            creator_revenue = distribution.creator_revenue,
            "Revenue distributed"
        );

        state.pending.push_back(entry);
        self.drain(&mut state).await;

        Ok(distribution)
    }

    /// Retries store writes that failed earlier. Returns how many remain queued.
    pub async fn flush_pending(&self) -> usize {
        let mut state = self.state.lock().await;
        self.drain(&mut state).await
    }

    async fn drain(&self, state: &mut LedgerState) -> usize {
        while let Some(entry) = state.pending.front() {
            let failure = match tokio::time::timeout(self.store_timeout, self.store.append(entry)).await {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(format!("{:#}", e)),
                Err(_) => Some(format!("timed out after {:?}", self.store_timeout)),
            };

            if let Some(reason) = failure {
                tracing::error!(
                    payment_id = %entry.record.payment_id,
                    queued = state.pending.len(),
                    "Ledger write failed, will retry: {}",
                    reason
                );
                break;
            }
            state.pending.pop_front();
        }
        state.pending.len()
    }

    pub async fn pending_writes(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    pub async fn history(&self) -> Vec<RevenueRecord> {
        self.state.lock().await.records.clone()
    }

    pub async fn distributions(&self) -> Vec<RevenueDistribution> {
        self.state.lock().await.distributions.clone()
    }

    /// Sum of recorded amounts per currency.
    pub async fn totals(&self) -> BTreeMap<String, f64> {
        let state = self.state.lock().await;
        let mut totals = BTreeMap::new();
        for record in &state.records {
            *totals.entry(record.currency.clone()).or_insert(0.0) += record.amount;
        }
        totals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PaymentMethod;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn settled(payment_id: &str, amount: f64, currency: &str) -> PaymentResult {
        PaymentResult {
            success: true,
            payment_id: payment_id.to_string(),
            transaction_id: None,
            method: PaymentMethod::X402Pay,
            amount,
            currency: currency.to_string(),
            timestamp: Utc::now(),
        }
    }

    fn ledger_with(store: Arc<dyn LedgerStore>) -> RevenueLedger {
        RevenueLedger::new(RevenueSplit::default(), store)
    }

    /// Fails every write while `down` is set.
    #[derive(Default)]
    struct FlakyStore {
        down: AtomicBool,
        inner: MemoryLedgerStore,
    }

    #[async_trait]
    impl LedgerStore for FlakyStore {
        async fn append(&self, entry: &LedgerEntry) -> Result<()> {
            if self.down.load(Ordering::SeqCst) {
                anyhow::bail!("store unavailable");
            }
            self.inner.append(entry).await
        }

        async fn load(&self) -> Result<Vec<LedgerEntry>> {
            self.inner.load().await
        }
    }

    #[tokio::test]
    async fn test_record_appends_record_and_distribution() {
        let store = Arc::new(MemoryLedgerStore::default());
        let ledger = ledger_with(store.clone());

        let distribution = ledger.record(&settled("x402_1", 0.99, "USD")).await.unwrap();

        assert!((distribution.platform_fee - 0.099).abs() < 1e-9);
        assert!((distribution.creator_revenue - 0.891).abs() < 1e-9);
        assert_eq!(ledger.history().await.len(), 1);
        assert_eq!(ledger.distributions().await, vec![distribution]);
        assert_eq!(store.load().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rejects_failed_and_duplicate_payments() {
        let ledger = ledger_with(Arc::new(MemoryLedgerStore::default()));

        let mut failed = settled("failed", 1.0, "USD");
        failed.success = false;
        assert!(matches!(
            ledger.record(&failed).await,
            Err(LedgerError::NotSettled(_))
        ));

        ledger.record(&settled("x402_1", 1.0, "USD")).await.unwrap();
        assert!(matches!(
            ledger.record(&settled("x402_1", 1.0, "USD")).await,
            Err(LedgerError::DuplicatePayment(id)) if id == "x402_1"
        ));
        assert_eq!(ledger.history().await.len(), 1);
    }

    #[tokio::test]
    async fn test_totals_per_currency() {
        let ledger = ledger_with(Arc::new(MemoryLedgerStore::default()));
        ledger.record(&settled("a", 0.99, "USD")).await.unwrap();
        ledger.record(&settled("b", 5.0, "USD")).await.unwrap();
        ledger.record(&settled("c", 2.5, "EUR")).await.unwrap();

        let totals = ledger.totals().await;
        assert!((totals["USD"] - 5.99).abs() < 1e-9);
        assert!((totals["EUR"] - 2.5).abs() < 1e-9);
        assert_eq!(totals.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_writes_are_queued_and_retried_in_order() {
        let store = Arc::new(FlakyStore::default());
        store.down.store(true, Ordering::SeqCst);
        let ledger = ledger_with(store.clone());

        ledger.record(&settled("a", 1.0, "USD")).await.unwrap();
        ledger.record(&settled("b", 2.0, "USD")).await.unwrap();

        assert_eq!(ledger.history().await.len(), 2);
        assert_eq!(ledger.pending_writes().await, 2);
        assert!(store.load().await.unwrap().is_empty());

        store.down.store(false, Ordering::SeqCst);
        assert_eq!(ledger.flush_pending().await, 0);

        let persisted: Vec<String> = store
            .load()
            .await
            .unwrap()
            .into_iter()
            .map(|entry| entry.record.payment_id)
            .collect();
        assert_eq!(persisted, vec!["a", "b"]);
    }

    /// Never answers a write.
    #[derive(Default)]
    struct HungStore;

    #[async_trait]
    impl LedgerStore for HungStore {
        async fn append(&self, _entry: &LedgerEntry) -> Result<()> {
            futures::future::pending::<Result<()>>().await
        }

        async fn load(&self) -> Result<Vec<LedgerEntry>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_hung_store_does_not_block_ledger() {
        let ledger = Arc::new(
            ledger_with(Arc::new(HungStore)).with_store_timeout(Duration::from_millis(50)),
        );

        let recorded = tokio::time::timeout(
            Duration::from_secs(1),
            ledger.record(&settled("a", 1.0, "USD")),
        )
        .await;
        assert!(matches!(recorded, Ok(Ok(_))));

        let history = tokio::time::timeout(Duration::from_secs(1), ledger.history())
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(ledger.pending_writes().await, 1);
        assert_eq!(ledger.flush_pending().await, 1);
    }

    #[tokio::test]
    async fn test_restore_skips_duplicates() {
        let store = Arc::new(MemoryLedgerStore::default());
        {
            let ledger = ledger_with(store.clone());
            ledger.record(&settled("a", 1.0, "USD")).await.unwrap();
            ledger.record(&settled("b", 3.0, "USD")).await.unwrap();
        }
        let entries = store.load().await.unwrap();
        store.append(&entries[0]).await.unwrap();

        let restored = RevenueLedger::restore(RevenueSplit::default(), store).await.unwrap();

        assert_eq!(restored.history().await.len(), 2);
        assert_eq!(restored.totals().await["USD"], 4.0);
        assert!(matches!(
            restored.record(&settled("a", 1.0, "USD")).await,
            Err(LedgerError::DuplicatePayment(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_records_are_not_lost() {
        let ledger = Arc::new(ledger_with(Arc::new(MemoryLedgerStore::default())));

        let handles: Vec<_> = (0..50)
            .map(|i| {
                let ledger = ledger.clone();
                tokio::spawn(async move { ledger.record(&settled(&format!("p{}", i), 1.0, "USD")).await })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(ledger.history().await.len(), 50);
        assert_eq!(ledger.totals().await["USD"], 50.0);
    }
}
