//! JSON seed data for demos and tests.

use std::collections::HashMap;
use std::path::Path;

use log::info;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use stratfolio_core::allocation::{AllocationConstraints, AllocationRequest};
use stratfolio_core::portfolio::{CreatePortfolioRequest, Portfolio, PortfolioServiceTrait};
use stratfolio_core::stocks::{Signal, Stock};
use stratfolio_core::strategies::Strategy;
use stratfolio_core::Result;

use crate::db::MemoryStorage;
use crate::errors::StorageError;

/// Reference data loaded into a [`MemoryStorage`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedData {
    #[serde(default)]
    pub stocks: Vec<Stock>,
    #[serde(default)]
    pub signals: Vec<Signal>,
    /// Strategies with their stock memberships.
    #[serde(default)]
    pub strategies: Vec<Strategy>,
    /// Ticker -> price served by the static quote source.
    #[serde(default)]
    pub prices: HashMap<String, Decimal>,
    /// Portfolios built from a fresh allocation once the reference data is in.
    #[serde(default)]
    pub portfolios: Vec<PortfolioSeed>,
}

/// A portfolio to allocate and create at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioSeed {
    pub user_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub strategy_ids: Vec<String>,
    pub total_investment: Decimal,
    pub constraints: AllocationConstraints,
    #[serde(default)]
    pub excluded_stock_ids: Vec<String>,
}

impl PortfolioSeed {
    pub fn allocation_request(&self) -> AllocationRequest {
        AllocationRequest {
            strategy_ids: self.strategy_ids.clone(),
            total_investment: self.total_investment,
            constraints: self.constraints.clone(),
            excluded_stock_ids: self.excluded_stock_ids.clone(),
        }
    }
}

impl SeedData {
    /// Writes the seed into `storage`. Stocks go first so signals and
    /// memberships can refer to them.
    pub fn apply(&self, storage: &MemoryStorage) -> Result<()> {
        for stock in &self.stocks {
            storage.stocks.save_stock(stock.clone())?;
        }
        for signal in &self.signals {
            storage.stocks.record_signal(signal.clone())?;
        }
        for strategy in &self.strategies {
            storage.strategies.save_strategy(strategy.clone())?;
        }
        for (ticker, price) in &self.prices {
            storage.quotes.set_price(ticker, *price)?;
        }
        info!(
            "Seeded {} stocks, {} signals, {} strategies and {} prices",
            self.stocks.len(),
            self.signals.len(),
            self.strategies.len(),
            self.prices.len()
        );
        Ok(())
    }

    /// Allocates and creates every seeded portfolio through `service`. Must run
    /// after [`SeedData::apply`] so strategies, stocks and prices resolve.
    pub async fn create_portfolios(
        &self,
        service: &dyn PortfolioServiceTrait,
    ) -> Result<Vec<Portfolio>> {
        let mut created = Vec::with_capacity(self.portfolios.len());
        for seed in &self.portfolios {
            let preview = service
                .generate_allocation_preview(&seed.allocation_request())
                .await?;
            let portfolio = service
                .create_portfolio(CreatePortfolioRequest::from_preview(
                    seed.user_id.clone(),
                    seed.name.clone(),
                    seed.description.clone(),
                    preview,
                ))
                .await?;
            created.push(portfolio);
        }
        if !created.is_empty() {
            info!("Created {} seeded portfolios", created.len());
        }
        Ok(created)
    }
}

/// Reads a JSON seed file.
pub fn load_seed_file(path: impl AsRef<Path>) -> Result<SeedData> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(StorageError::from)?;
    let seed: SeedData = serde_json::from_str(&content).map_err(StorageError::from)?;
    info!("Loaded seed data from {}", path.display());
    Ok(seed)
}
