use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{Bar, BarInterval, MarketDataError, Quote};
use crate::errors::Result;

/// Source of live prices consumed by the allocation engine and NAV refresh.
///
/// Implementations may fan batch requests out in parallel; callers treat the
/// batch call as a single suspension point.
#[async_trait]
pub trait QuoteSourceTrait: Send + Sync {
    /// Latest quote for one ticker.
    async fn get_quote(&self, ticker: &str) -> Result<Quote>;

    /// Latest quotes for many tickers. Tickers without a quote are absent from
    /// the returned map rather than failing the whole call.
    async fn get_batch_quotes(&self, tickers: &[String]) -> Result<HashMap<String, Quote>>;

    /// Historical bars in `[from, to]`. Sources without history report `NotSupported`.
    async fn get_historical_bars(
        &self,
        ticker: &str,
        _from: DateTime<Utc>,
        _to: DateTime<Utc>,
        _interval: BarInterval,
    ) -> Result<Vec<Bar>> {
        Err(MarketDataError::NotSupported(format!("historical bars for {}", ticker)).into())
    }
}
