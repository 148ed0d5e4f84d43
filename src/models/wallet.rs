use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletBalance {
    pub asset: String,
    pub amount: f64,
}

impl WalletBalance {
    pub fn new(asset: impl Into<String>, amount: f64) -> Self {
        Self {
            asset: asset.into(),
            amount,
        }
    }
}

/// Point-in-time view of the wallet session.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletSessionState {
    pub is_connected: bool,
    pub address: Option<String>,
    pub balances: Vec<WalletBalance>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletStatus {
    pub address: Option<String>,
    pub balances: Vec<WalletBalance>,
    pub total_revenue: BTreeMap<String, f64>,
    pub is_connected: bool,
}
