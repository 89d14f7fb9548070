use std::collections::HashMap;
use std::sync::Arc;

use log::debug;
use stratfolio_core::errors::Error;
use stratfolio_core::stocks::{
    normalize_ticker, Signal, SignalRepositoryTrait, Stock, StockRepositoryTrait,
};
use stratfolio_core::Result;

use crate::db::{MemoryDb, Tables};
use crate::errors::StorageError;

/// Stocks and their signal history.
pub struct StockRepository {
    db: Arc<MemoryDb>,
}

impl StockRepository {
    pub fn new(db: Arc<MemoryDb>) -> Self {
        StockRepository { db }
    }

    /// Inserts or replaces a stock. Tickers are stored normalized and must be unique.
    pub fn save_stock(&self, mut stock: Stock) -> Result<Stock> {
        stock.ticker = normalize_ticker(&stock.ticker);
        if stock.id.is_empty() || stock.ticker.is_empty() {
            return Err(Error::invalid_input("stock id and ticker are required"));
        }

        let mut tables = self.db.write()?;
        if let Some(other) = tables
            .stocks
            .values()
            .find(|s| s.ticker == stock.ticker && s.id != stock.id)
        {
            return Err(StorageError::Duplicate(format!(
                "ticker {} already belongs to stock {}",
                stock.ticker, other.id
            ))
            .into());
        }

        if let Some(signal) = stock.signal.take() {
            let signal = Signal {
                stock_id: stock.id.clone(),
                ..signal
            };
            push_signal(&mut tables, signal);
        }
        tables.stocks.insert(stock.id.clone(), stock.clone());
        stock.signal = latest_signal(&tables, &stock.id);
        Ok(stock)
    }

    /// Appends a signal to the stock's history.
    pub fn record_signal(&self, signal: Signal) -> Result<()> {
        let mut tables = self.db.write()?;
        if !tables.stocks.contains_key(&signal.stock_id) {
            return Err(StorageError::NotFound(format!("stock {}", signal.stock_id)).into());
        }
        debug!(
            "Recording {:?} signal for {} on {}",
            signal.signal_type, signal.stock_id, signal.signal_date
        );
        push_signal(&mut tables, signal);
        Ok(())
    }

    pub fn get_all(&self) -> Result<Vec<Stock>> {
        let tables = self.db.read()?;
        Ok(tables
            .stocks
            .values()
            .map(|s| with_latest_signal(&tables, s))
            .collect())
    }

    pub fn find_by_ticker(&self, ticker: &str) -> Result<Option<Stock>> {
        let ticker = normalize_ticker(ticker);
        let tables = self.db.read()?;
        Ok(tables
            .stocks
            .values()
            .find(|s| s.ticker == ticker)
            .map(|s| with_latest_signal(&tables, s)))
    }
}

fn push_signal(tables: &mut Tables, signal: Signal) {
    tables
        .signals
        .entry(signal.stock_id.clone())
        .or_default()
        .push(signal);
}

/// Latest signal by date; among signals of the same date the last recorded wins.
fn latest_signal(tables: &Tables, stock_id: &str) -> Option<Signal> {
    tables
        .signals
        .get(stock_id)?
        .iter()
        .enumerate()
        .max_by_key(|(index, signal)| (signal.signal_date, *index))
        .map(|(_, signal)| signal.clone())
}

fn with_latest_signal(tables: &Tables, stock: &Stock) -> Stock {
    Stock {
        signal: latest_signal(tables, &stock.id),
        ..stock.clone()
    }
}

impl StockRepositoryTrait for StockRepository {
    fn get_by_ids(&self, ids: &[String]) -> Result<Vec<Stock>> {
        let tables = self.db.read()?;
        Ok(ids
            .iter()
            .filter_map(|id| tables.stocks.get(id))
            .map(|s| with_latest_signal(&tables, s))
            .collect())
    }
}

impl SignalRepositoryTrait for StockRepository {
    fn get_latest_signals(&self, stock_ids: &[String]) -> Result<HashMap<String, Signal>> {
        let tables = self.db.read()?;
        Ok(stock_ids
            .iter()
            .filter_map(|id| latest_signal(&tables, id).map(|signal| (id.clone(), signal)))
            .collect())
    }
}
