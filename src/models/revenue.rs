use crate::models::PaymentMethod;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenueRecord {
    pub payment_id: String,
    pub method: PaymentMethod,
    pub amount: f64,
    pub currency: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenueDistribution {
    pub payment_id: String,
    pub total_amount: f64,
    pub platform_fee: f64,
    pub creator_revenue: f64,
    pub method: PaymentMethod,
    pub timestamp: DateTime<Utc>,
}

/// One persisted ledger line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub record: RevenueRecord,
    pub distribution: RevenueDistribution,
}

/// Division of a completed payment between platform and creator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RevenueSplit {
    pub platform_fee_rate: f64,
}

impl Default for RevenueSplit {
    fn default() -> Self {
        Self { platform_fee_rate: 0.10 }
    }
}

impl RevenueSplit {
    pub fn new(platform_fee_rate: f64) -> Self {
        Self { platform_fee_rate }
    }

    /// Returns `(platform_fee, creator_revenue)`; the two always sum to `amount`.
    pub fn split(&self, amount: f64) -> (f64, f64) {
        let platform_fee = amount * self.platform_fee_rate;
        (platform_fee, amount - platform_fee)
    }

    pub fn distribute(&self, record: &RevenueRecord, at: DateTime<Utc>) -> RevenueDistribution {
        let (platform_fee, creator_revenue) = self.split(record.amount);
        RevenueDistribution {
            payment_id: record.payment_id.clone(),
            total_amount: record.amount,
            platform_fee,
            creator_revenue,
            method: record.method,
            timestamp: at,
        }
    }
}
