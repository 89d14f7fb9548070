//! Stock domain models.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Daily classification of a stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalType {
    Buy,
    Hold,
}

/// Domain model for a stock signal
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Signal {
    pub stock_id: String,
    pub signal_date: NaiveDate,
    pub signal_type: SignalType,
}

impl Signal {
    pub fn is_buy(&self) -> bool {
        self.signal_type == SignalType::Buy
    }
}

/// Domain model for a stock
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Stock {
    pub id: String,
    pub ticker: String,
    pub name: String,
    pub sector: Option<String>,
    pub exchange: Option<String>,
    #[serde(default)]
    pub signal: Option<Signal>,
}

/// Normalizes a ticker to the stored form (trimmed, uppercase).
pub fn normalize_ticker(ticker: &str) -> String {
    ticker.trim().to_uppercase()
}
