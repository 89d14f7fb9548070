use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use rust_decimal::Decimal;
use stratfolio_core::errors::Error;
use stratfolio_core::quotes::{MarketDataError, Quote, QuoteSourceTrait};
use stratfolio_core::stocks::normalize_ticker;
use stratfolio_core::Result;

use crate::errors::StorageError;

/// Source id stamped on quotes served by [`StaticQuoteSource`].
pub const STATIC_QUOTE_SOURCE: &str = "STATIC";

/// Quote source backed by manually set prices.
#[derive(Debug, Default)]
pub struct StaticQuoteSource {
    prices: RwLock<HashMap<String, Decimal>>,
}

impl StaticQuoteSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prices<I, S>(prices: I) -> Self
    where
        I: IntoIterator<Item = (S, Decimal)>,
        S: AsRef<str>,
    {
        let prices = prices
            .into_iter()
            .map(|(ticker, price)| (normalize_ticker(ticker.as_ref()), price))
            .collect();
        Self {
            prices: RwLock::new(prices),
        }
    }

    /// Sets the price of a ticker. Non-positive prices are rejected.
    pub fn set_price(&self, ticker: &str, price: Decimal) -> Result<()> {
        if price <= Decimal::ZERO {
            return Err(MarketDataError::InvalidData(format!(
                "price {} for {} must be positive",
                price, ticker
            ))
            .into());
        }
        self.prices
            .write()
            .map_err(StorageError::from)?
            .insert(normalize_ticker(ticker), price);
        Ok(())
    }

    pub fn remove_price(&self, ticker: &str) -> Result<()> {
        self.prices
            .write()
            .map_err(StorageError::from)?
            .remove(&normalize_ticker(ticker));
        Ok(())
    }

    fn price_of(&self, ticker: &str) -> Result<Option<Decimal>> {
        let prices = self.prices.read().map_err(StorageError::from)?;
        Ok(prices.get(&normalize_ticker(ticker)).copied())
    }
}

#[async_trait]
impl QuoteSourceTrait for StaticQuoteSource {
    async fn get_quote(&self, ticker: &str) -> Result<Quote> {
        self.price_of(ticker)?
            .map(|price| Quote::new(ticker, price, STATIC_QUOTE_SOURCE))
            .ok_or_else(|| Error::from(MarketDataError::NotFound(ticker.to_string())))
    }

    async fn get_batch_quotes(&self, tickers: &[String]) -> Result<HashMap<String, Quote>> {
        let mut quotes = HashMap::with_capacity(tickers.len());
        for ticker in tickers {
            if let Some(price) = self.price_of(ticker)? {
                quotes.insert(
                    ticker.clone(),
                    Quote::new(ticker.clone(), price, STATIC_QUOTE_SOURCE),
                );
            }
        }
        Ok(quotes)
    }
}
