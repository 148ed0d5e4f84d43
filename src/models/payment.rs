use crate::error::PaymentError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Payment id reported when a rail failed before assigning one.
pub const FAILED_PAYMENT_ID: &str = "failed";

/// A concrete payment rail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentMethod {
    #[serde(rename = "x402pay")]
    X402Pay,
    #[serde(rename = "wallet")]
    Wallet,
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentMethod::X402Pay => f.write_str("x402pay"),
            PaymentMethod::Wallet => f.write_str("wallet"),
        }
    }
}

/// The rail a caller asks for. `Auto` is resolved by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RequestedMethod {
    #[serde(rename = "x402pay")]
    X402Pay,
    #[serde(rename = "wallet")]
    Wallet,
    #[default]
    #[serde(rename = "auto")]
    Auto,
}

impl From<PaymentMethod> for RequestedMethod {
    fn from(method: PaymentMethod) -> Self {
        match method {
            PaymentMethod::X402Pay => RequestedMethod::X402Pay,
            PaymentMethod::Wallet => RequestedMethod::Wallet,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub amount: f64,
    pub currency: String,
    pub description: String,
    #[serde(default)]
    pub method: RequestedMethod,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl PaymentRequest {
    pub fn new(amount: f64, currency: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            amount,
            currency: currency.into(),
            description: description.into(),
            method: RequestedMethod::Auto,
            metadata: Map::new(),
        }
    }

    pub fn with_method(mut self, method: RequestedMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Checks the request and returns it with the currency uppercased.
    pub fn normalized(mut self) -> Result<Self, PaymentError> {
        if !self.amount.is_finite() || self.amount <= 0.0 {
            return Err(PaymentError::InvalidRequest(format!(
                "amount must be a positive number, got {}",
                self.amount
            )));
        }

        let currency = self.currency.trim();
        if currency.is_empty() {
            return Err(PaymentError::InvalidRequest("currency is required".to_string()));
        }
        self.currency = currency.to_uppercase();

        Ok(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResult {
    pub success: bool,
    pub payment_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    pub method: PaymentMethod,
    pub amount: f64,
    pub currency: String,
    pub timestamp: DateTime<Utc>,
}

impl PaymentResult {
    pub fn from_outcome(request: &PaymentRequest, method: PaymentMethod, outcome: BackendOutcome) -> Self {
        Self {
            success: outcome.success,
            payment_id: outcome.payment_id,
            transaction_id: outcome.transaction_id,
            method,
            amount: request.amount,
            currency: request.currency.clone(),
            timestamp: Utc::now(),
        }
    }

    pub fn failed(request: &PaymentRequest, method: PaymentMethod) -> Self {
        Self {
            success: false,
            payment_id: FAILED_PAYMENT_ID.to_string(),
            transaction_id: None,
            method,
            amount: request.amount,
            currency: request.currency.clone(),
            timestamp: Utc::now(),
        }
    }
}

/// What a rail reports back for one payment attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendOutcome {
    pub success: bool,
    pub payment_id: String,
    pub transaction_id: Option<String>,
}

impl BackendOutcome {
    pub fn completed(payment_id: impl Into<String>) -> Self {
        Self {
            success: true,
            payment_id: payment_id.into(),
            transaction_id: None,
        }
    }

    pub fn settled(payment_id: impl Into<String>, transaction_id: impl Into<String>) -> Self {
        Self {
            success: true,
            payment_id: payment_id.into(),
            transaction_id: Some(transaction_id.into()),
        }
    }

    pub fn unsettled(payment_id: impl Into<String>) -> Self {
        Self {
            success: false,
            payment_id: payment_id.into(),
            transaction_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults_to_auto() {
        let request: PaymentRequest = serde_json::from_str(
            r#"{"amount":0.99,"currency":"usd","description":"Create Agent"}"#,
        )
        .unwrap();

        assert_eq!(request.method, RequestedMethod::Auto);
        assert!(request.metadata.is_empty());
    }

    #[test]
    fn test_unknown_method_rejected() {
        let parsed = serde_json::from_str::<PaymentRequest>(
            r#"{"amount":1.0,"currency":"USD","description":"x","method":"paypal"}"#,
        );
        assert!(parsed.is_err());
    }

    #[test]
    fn test_normalized_uppercases_currency() {
        let request = PaymentRequest::new(1.0, " usd ", "Premium chat").normalized().unwrap();
        assert_eq!(request.currency, "USD");
    }

    #[test]
    fn test_normalized_rejects_bad_amounts() {
        for amount in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let result = PaymentRequest::new(amount, "USD", "x").normalized();
            assert!(matches!(result, Err(PaymentError::InvalidRequest(_))));
        }
        assert!(PaymentRequest::new(1.0, "  ", "x").normalized().is_err());
    }

    #[test]
    fn test_result_serializes_camel_case() {
        let request = PaymentRequest::new(0.5, "USD", "x");
        let result = PaymentResult::from_outcome(
            &request,
            PaymentMethod::Wallet,
            BackendOutcome::settled("wallet_1", "0xabc"),
        );
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["paymentId"], "wallet_1");
        assert_eq!(json["transactionId"], "0xabc");
        assert_eq!(json["method"], "wallet");
    }

    #[test]
    fn test_failed_result_has_no_transaction() {
        let request = PaymentRequest::new(2.0, "USD", "x");
        let result = PaymentResult::failed(&request, PaymentMethod::X402Pay);
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(result.payment_id, FAILED_PAYMENT_ID);
        assert!(json.get("transactionId").is_none());
    }
}
