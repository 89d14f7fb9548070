use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use log::debug;
use stratfolio_core::portfolio::{NavHistory, Portfolio, PortfolioRepositoryTrait, Position};
use stratfolio_core::Result;

use crate::db::{MemoryDb, Tables};
use crate::errors::StorageError;

pub struct PortfolioRepository {
    db: Arc<MemoryDb>,
}

impl PortfolioRepository {
    pub fn new(db: Arc<MemoryDb>) -> Self {
        PortfolioRepository { db }
    }
}

fn ensure_portfolio(tables: &Tables, portfolio_id: &str) -> std::result::Result<(), StorageError> {
    if tables.portfolios.contains_key(portfolio_id) {
        Ok(())
    } else {
        Err(StorageError::NotFound(format!("portfolio {}", portfolio_id)))
    }
}

fn ensure_unique_stock(
    tables: &Tables,
    position: &Position,
) -> std::result::Result<(), StorageError> {
    let clash = tables.positions.values().any(|p| {
        p.portfolio_id == position.portfolio_id
            && p.stock_id == position.stock_id
            && p.id != position.id
    });
    if clash {
        Err(StorageError::Duplicate(format!(
            "portfolio {} already holds stock {}",
            position.portfolio_id, position.stock_id
        )))
    } else {
        Ok(())
    }
}

#[async_trait]
impl PortfolioRepositoryTrait for PortfolioRepository {
    fn get_portfolio(&self, portfolio_id: &str) -> Result<Portfolio> {
        let tables = self.db.read()?;
        tables
            .portfolios
            .get(portfolio_id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("portfolio {}", portfolio_id)).into())
    }

    fn get_portfolios_by_user(&self, user_id: &str) -> Result<Vec<Portfolio>> {
        let tables = self.db.read()?;
        let mut portfolios: Vec<Portfolio> = tables
            .portfolios
            .values()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect();
        portfolios.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(portfolios)
    }

    fn get_all_portfolio_ids(&self) -> Result<Vec<String>> {
        Ok(self.db.read()?.portfolios.keys().cloned().collect())
    }

    fn get_positions(&self, portfolio_id: &str) -> Result<Vec<Position>> {
        let tables = self.db.read()?;
        ensure_portfolio(&tables, portfolio_id)?;
        let mut positions: Vec<Position> = tables
            .positions
            .values()
            .filter(|p| p.portfolio_id == portfolio_id)
            .cloned()
            .collect();
        positions.sort_by(|a, b| a.ticker.cmp(&b.ticker));
        Ok(positions)
    }

    fn get_nav_history(&self, portfolio_id: &str) -> Result<Vec<NavHistory>> {
        let tables = self.db.read()?;
        ensure_portfolio(&tables, portfolio_id)?;
        let mut history = tables
            .nav_history
            .get(portfolio_id)
            .cloned()
            .unwrap_or_default();
        // Stable: rows with equal timestamps keep their insertion order.
        history.sort_by_key(|row| row.timestamp);
        Ok(history)
    }

    async fn create_portfolio(
        &self,
        portfolio: Portfolio,
        positions: Vec<Position>,
        initial_nav: NavHistory,
    ) -> Result<Portfolio> {
        let mut tables = self.db.write()?;
        if tables.portfolios.contains_key(&portfolio.id) {
            return Err(StorageError::Duplicate(format!("portfolio {}", portfolio.id)).into());
        }

        // Validate everything before the first write so a failure leaves no trace.
        let mut stock_ids = HashSet::new();
        for position in &positions {
            if position.portfolio_id != portfolio.id {
                return Err(StorageError::NotFound(format!(
                    "portfolio {} for position {}",
                    position.portfolio_id, position.id
                ))
                .into());
            }
            if tables.positions.contains_key(&position.id) {
                return Err(StorageError::Duplicate(format!("position {}", position.id)).into());
            }
            if !stock_ids.insert(position.stock_id.as_str()) {
                return Err(StorageError::Duplicate(format!(
                    "stock {} in portfolio {}",
                    position.stock_id, portfolio.id
                ))
                .into());
            }
        }

        for position in positions {
            tables.positions.insert(position.id.clone(), position);
        }
        tables
            .nav_history
            .insert(portfolio.id.clone(), vec![initial_nav]);
        tables
            .portfolios
            .insert(portfolio.id.clone(), portfolio.clone());
        debug!("Stored portfolio {}", portfolio.id);
        Ok(portfolio)
    }

    async fn update_portfolio(&self, portfolio: Portfolio) -> Result<Portfolio> {
        let mut tables = self.db.write()?;
        let slot = tables
            .portfolios
            .get_mut(&portfolio.id)
            .ok_or_else(|| StorageError::NotFound(format!("portfolio {}", portfolio.id)))?;
        *slot = portfolio.clone();
        Ok(portfolio)
    }

    async fn insert_position(&self, position: Position) -> Result<Position> {
        let mut tables = self.db.write()?;
        ensure_portfolio(&tables, &position.portfolio_id)?;
        if tables.positions.contains_key(&position.id) {
            return Err(StorageError::Duplicate(format!("position {}", position.id)).into());
        }
        ensure_unique_stock(&tables, &position)?;
        tables
            .positions
            .insert(position.id.clone(), position.clone());
        Ok(position)
    }

    async fn update_position(&self, position: Position) -> Result<Position> {
        let mut tables = self.db.write()?;
        if !tables.positions.contains_key(&position.id) {
            return Err(StorageError::NotFound(format!("position {}", position.id)).into());
        }
        ensure_unique_stock(&tables, &position)?;
        tables
            .positions
            .insert(position.id.clone(), position.clone());
        Ok(position)
    }

    async fn append_nav_history(&self, entry: NavHistory) -> Result<NavHistory> {
        let mut tables = self.db.write()?;
        ensure_portfolio(&tables, &entry.portfolio_id)?;
        tables
            .nav_history
            .entry(entry.portfolio_id.clone())
            .or_default()
            .push(entry.clone());
        Ok(entry)
    }
}
