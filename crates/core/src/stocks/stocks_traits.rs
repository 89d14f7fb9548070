use std::collections::HashMap;

use crate::errors::Result;

use super::{Signal, Stock};

/// Read access to stocks.
pub trait StockRepositoryTrait: Send + Sync {
    /// Loads the stocks with the given ids. Unknown ids are skipped.
    fn get_by_ids(&self, ids: &[String]) -> Result<Vec<Stock>>;
}

/// Read access to the most recent signal per stock.
pub trait SignalRepositoryTrait: Send + Sync {
    /// Returns the latest signal for each stock that has one, keyed by stock id.
    fn get_latest_signals(&self, stock_ids: &[String]) -> Result<HashMap<String, Signal>>;
}
