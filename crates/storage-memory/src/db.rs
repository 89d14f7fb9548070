//! Shared in-memory tables and the bundle of repositories built on them.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use stratfolio_core::portfolio::{NavHistory, Portfolio, Position};
use stratfolio_core::stocks::{Signal, Stock};
use stratfolio_core::strategies::Strategy;
use stratfolio_core::Result;

use crate::errors::StorageError;
use crate::{PortfolioRepository, StaticQuoteSource, StockRepository, StrategyRepository};

/// Row storage. Ordered maps keep listings deterministic.
#[derive(Debug, Default)]
pub(crate) struct Tables {
    pub strategies: BTreeMap<String, Strategy>,
    pub stocks: BTreeMap<String, Stock>,
    /// Signal history per stock id, in insertion order.
    pub signals: HashMap<String, Vec<Signal>>,
    pub portfolios: BTreeMap<String, Portfolio>,
    /// Keyed by position id.
    pub positions: BTreeMap<String, Position>,
    /// NAV rows per portfolio id, in insertion order.
    pub nav_history: HashMap<String, Vec<NavHistory>>,
}

/// Lock-guarded tables shared by every repository of one store.
#[derive(Debug, Default)]
pub struct MemoryDb {
    tables: RwLock<Tables>,
}

impl MemoryDb {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn read(&self) -> Result<RwLockReadGuard<'_, Tables>> {
        Ok(self.tables.read().map_err(StorageError::from)?)
    }

    pub(crate) fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>> {
        Ok(self.tables.write().map_err(StorageError::from)?)
    }
}

/// Every repository and the quote source over one `MemoryDb`.
#[derive(Clone)]
pub struct MemoryStorage {
    pub db: Arc<MemoryDb>,
    pub strategies: Arc<StrategyRepository>,
    pub stocks: Arc<StockRepository>,
    pub portfolios: Arc<PortfolioRepository>,
    pub quotes: Arc<StaticQuoteSource>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        let db = MemoryDb::new();
        Self {
            strategies: Arc::new(StrategyRepository::new(db.clone())),
            stocks: Arc::new(StockRepository::new(db.clone())),
            portfolios: Arc::new(PortfolioRepository::new(db.clone())),
            quotes: Arc::new(StaticQuoteSource::new()),
            db,
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}
