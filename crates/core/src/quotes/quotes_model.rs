use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Latest price for a ticker
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub ticker: String,
    pub price: Decimal,
    pub timestamp: DateTime<Utc>,
    /// Source of the quote (MANUAL, STATIC, a provider id, ...)
    pub source: String,
}

impl Quote {
    pub fn new(ticker: impl Into<String>, price: Decimal, source: impl Into<String>) -> Self {
        Self {
            ticker: ticker.into(),
            price,
            timestamp: Utc::now(),
            source: source.into(),
        }
    }
}

/// Historical OHLCV bar
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BarInterval {
    Minute,
    Hour,
    Day,
    Week,
}
