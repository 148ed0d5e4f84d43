use crate::error::{BackendError, PaymentError};
use crate::models::{BackendOutcome, PaymentMethod, PaymentRequest};
use crate::services::PaymentBackend;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

const INTENT_RETENTION: Duration = Duration::from_secs(3600);
const MAX_TRACKED_INTENTS: u64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentStatus {
    Pending,
    Completed,
    Failed,
    Expired,
}

impl IntentStatus {
    pub fn is_terminal(self) -> bool {
        self != IntentStatus::Pending
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct X402Intent {
    pub payment_id: String,
    pub payment_url: String,
    pub amount: f64,
    pub currency: String,
    pub status: IntentStatus,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIntentRequest {
    pub amount: f64,
    pub currency: String,
    pub description: String,
    pub recipient: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: IntentStatus,
}

/// The x402pay API.
#[async_trait]
pub trait X402PayGateway: Send + Sync {
    async fn create_intent(&self, request: &CreateIntentRequest) -> Result<X402Intent, BackendError>;

    async fn fetch_status(&self, payment_id: &str) -> Result<IntentStatus, BackendError>;
}

pub struct HttpX402PayGateway {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpX402PayGateway {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }
}

#[async_trait]
impl X402PayGateway for HttpX402PayGateway {
    async fn create_intent(&self, request: &CreateIntentRequest) -> Result<X402Intent, BackendError> {
        let response = self
            .authorize(self.client.post(format!("{}/payments", self.endpoint)))
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(BackendError::Rejected(format!(
                "x402pay returned {}",
                response.status()
            )));
        }

        Ok(response.json().await?)
    }

    async fn fetch_status(&self, payment_id: &str) -> Result<IntentStatus, BackendError> {
        let response = self
            .authorize(
                self.client
                    .get(format!("{}/payments/{}", self.endpoint, payment_id)),
            )
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(BackendError::Rejected(format!(
                "x402pay status lookup returned {}",
                response.status()
            )));
        }

        let body: StatusResponse = response.json().await?;
        Ok(body.status)
    }
}

#[derive(Debug, Clone)]
pub struct X402PaySettings {
    pub recipient: String,
    pub callback_url: Option<String>,
    pub poll_interval: Duration,
    pub confirmation_timeout: Duration,
}

struct TrackedIntent {
    intent: X402Intent,
    status: watch::Sender<IntentStatus>,
    // Set once the rail has reported this intent as unsettled
    abandoned: AtomicBool,
}

impl TrackedIntent {
    fn current(&self) -> IntentStatus {
        *self.status.borrow()
    }

    /// Moves a pending intent to `next`. Terminal states never change.
    fn transition(&self, next: IntentStatus) -> IntentStatus {
        self.status.send_if_modified(|current| {
            if current.is_terminal() || *current == next {
                return false;
            }
            *current = next;
            true
        });
        self.current()
    }
}

/// x402pay rail: creates an intent, then waits for confirmation by polling
/// the gateway and listening for webhook confirmations.
pub struct X402PayService {
    gateway: Arc<dyn X402PayGateway>,
    settings: X402PaySettings,
    intents: Cache<String, Arc<TrackedIntent>>,
}

impl X402PayService {
    pub fn new(gateway: Arc<dyn X402PayGateway>, settings: X402PaySettings) -> Self {
        let intents = Cache::builder()
            .max_capacity(MAX_TRACKED_INTENTS)
            .time_to_live(INTENT_RETENTION)
            .build();

        Self {
            gateway,
            settings,
            intents,
        }
    }

    pub async fn create_intent(&self, request: &PaymentRequest) -> Result<X402Intent, BackendError> {
        let mut metadata = Map::new();
        metadata.insert("source".to_string(), Value::from("soulforge"));
        metadata.insert("timestamp".to_string(), Value::from(Utc::now().to_rfc3339()));
        metadata.extend(request.metadata.clone());

        let intent = self
            .gateway
            .create_intent(&CreateIntentRequest {
                amount: request.amount,
                currency: request.currency.to_uppercase(),
                description: request.description.clone(),
                recipient: self.settings.recipient.clone(),
                callback_url: self.settings.callback_url.clone(),
                metadata,
            })
            .await?;

        let (status, _) = watch::channel(intent.status);
        self.intents
            .insert(
                intent.payment_id.clone(),
                Arc::new(TrackedIntent {
                    intent: intent.clone(),
                    status,
                    abandoned: AtomicBool::new(false),
                }),
            )
            .await;

        tracing::info!(
            "x402pay intent {} created for {} {} ({})",
            intent.payment_id,
            intent.amount,
            intent.currency,
            intent.payment_url
        );

        Ok(intent)
    }

    pub async fn check_status(&self, payment_id: &str) -> Option<IntentStatus> {
        self.intents
            .get(payment_id)
            .await
            .map(|tracked| tracked.current())
    }

    /// Handles a webhook notification for a tracked intent. The reported
    /// status is only a hint; the intent moves to whatever the gateway says.
    pub async fn confirm(&self, payment_id: &str, reported: IntentStatus) -> Result<IntentStatus, PaymentError> {
        let tracked = self
            .intents
            .get(payment_id)
            .await
            .ok_or_else(|| PaymentError::UnknownPayment(payment_id.to_string()))?;

        let verified = match self.gateway.fetch_status(payment_id).await {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!("x402pay callback for {} not verified: {}", payment_id, e);
                return Ok(tracked.current());
            }
        };

        if verified != reported {
            tracing::warn!(
                "x402pay callback for {} reported {:?}, gateway reports {:?}",
                payment_id,
                reported,
                verified
            );
        }

        let before = tracked.current();
        let current = tracked.transition(verified);
        tracing::info!("x402pay intent {} confirmed as {:?}", payment_id, current);

        if before != current
            && current == IntentStatus::Completed
            && tracked.abandoned.load(Ordering::SeqCst)
        {
            tracing::error!(
                payment_id = %payment_id,
                amount = tracked.intent.amount,
                currency = %tracked.intent.currency,
                "x402pay intent completed after its payment was reported failed, revenue not booked"
            );
        }

        Ok(current)
    }

    /// Waits for a terminal status, bounded by the confirmation timeout and
    /// the intent's expiry.
    pub async fn await_completion(&self, payment_id: &str) -> Result<IntentStatus, BackendError> {
        let tracked = self
            .intents
            .get(payment_id)
            .await
            .ok_or_else(|| BackendError::Rejected(format!("untracked intent {}", payment_id)))?;

        let until_expiry = (tracked.intent.expires_at - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO);
        let bound = self.settings.confirmation_timeout.min(until_expiry);

        let waited = tokio::time::timeout(bound, self.watch(&tracked)).await;

        let status = match waited {
            Ok(status) => status,
            Err(_) if Utc::now() >= tracked.intent.expires_at => {
                tracked.transition(IntentStatus::Expired)
            }
            Err(_) => {
                tracing::warn!(
                    "x402pay intent {} still pending after {:?}",
                    payment_id,
                    bound
                );
                tracked.current()
            }
        };

        if status != IntentStatus::Completed {
            tracked.abandoned.store(true, Ordering::SeqCst);
        }
        Ok(status)
    }

    async fn watch(&self, tracked: &TrackedIntent) -> IntentStatus {
        let payment_id = &tracked.intent.payment_id;
        let mut updates = tracked.status.subscribe();
        let mut ticker = tokio::time::interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let current = *updates.borrow_and_update();
            if current.is_terminal() {
                return current;
            }

            tokio::select! {
                changed = updates.changed() => {
                    if changed.is_err() {
                        return tracked.current();
                    }
                }
                _ = ticker.tick() => {
                    match self.gateway.fetch_status(payment_id).await {
                        Ok(status) => {
                            tracing::debug!("x402pay intent {} polled: {:?}", payment_id, status);
                            tracked.transition(status);
                        }
                        Err(e) => tracing::warn!("x402pay status poll for {} failed: {}", payment_id, e),
                    }
                }
            }
        }
    }
}

#[async_trait]
impl PaymentBackend for X402PayService {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::X402Pay
    }

    async fn create_payment(&self, request: &PaymentRequest) -> Result<BackendOutcome, BackendError> {
        let intent = self.create_intent(request).await?;
        let status = self.await_completion(&intent.payment_id).await?;

        if status == IntentStatus::Completed {
            Ok(BackendOutcome::completed(intent.payment_id))
        } else {
            tracing::warn!("x402pay intent {} ended as {:?}", intent.payment_id, status);
            Ok(BackendOutcome::unsettled(intent.payment_id))
        }
    }
}
