use std::collections::HashSet;
use std::sync::Arc;

use log::debug;
use stratfolio_core::errors::Error;
use stratfolio_core::strategies::{
    validate_user_percent_weights, Strategy, StrategyRepositoryTrait, StrategyStock,
};
use stratfolio_core::Result;
use uuid::Uuid;

use crate::db::MemoryDb;
use crate::errors::StorageError;

pub struct StrategyRepository {
    db: Arc<MemoryDb>,
}

impl StrategyRepository {
    pub fn new(db: Arc<MemoryDb>) -> Self {
        StrategyRepository { db }
    }

    /// Inserts or replaces a strategy. An empty id is assigned a fresh one.
    ///
    /// The owner's percent-mode weights must stay at or below 100.
    pub fn save_strategy(&self, mut strategy: Strategy) -> Result<Strategy> {
        if strategy.name.trim().is_empty() {
            return Err(Error::invalid_input("strategy name is required"));
        }
        if strategy.id.is_empty() {
            strategy.id = Uuid::new_v4().to_string();
        }
        for membership in strategy.stocks.iter_mut() {
            membership.strategy_id = strategy.id.clone();
        }
        let mut seen = HashSet::new();
        strategy.stocks.retain(|m| seen.insert(m.stock_id.clone()));

        let mut tables = self.db.write()?;
        let existing: Vec<Strategy> = tables.strategies.values().cloned().collect();
        validate_user_percent_weights(&existing, &strategy)?;

        debug!("Saving strategy {} ({})", strategy.name, strategy.id);
        tables
            .strategies
            .insert(strategy.id.clone(), strategy.clone());
        Ok(strategy)
    }

    /// Adds a stock to a strategy, or updates the eligibility of an existing member.
    pub fn set_membership(&self, strategy_id: &str, stock_id: &str, eligible: bool) -> Result<()> {
        let mut tables = self.db.write()?;
        if !tables.stocks.contains_key(stock_id) {
            return Err(StorageError::NotFound(format!("stock {}", stock_id)).into());
        }
        let strategy = tables
            .strategies
            .get_mut(strategy_id)
            .ok_or_else(|| StorageError::NotFound(format!("strategy {}", strategy_id)))?;

        match strategy.stocks.iter_mut().find(|m| m.stock_id == stock_id) {
            Some(membership) => membership.eligible = eligible,
            None => strategy.stocks.push(StrategyStock {
                strategy_id: strategy_id.to_string(),
                stock_id: stock_id.to_string(),
                eligible,
            }),
        }
        Ok(())
    }

    pub fn get_user_strategies(&self, user_id: &str) -> Result<Vec<Strategy>> {
        Ok(self
            .db
            .read()?
            .strategies
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect())
    }
}

impl StrategyRepositoryTrait for StrategyRepository {
    fn get_by_ids(&self, ids: &[String]) -> Result<Vec<Strategy>> {
        let tables = self.db.read()?;
        let mut seen = HashSet::new();
        Ok(ids
            .iter()
            .filter(|id| seen.insert(id.as_str()))
            .filter_map(|id| tables.strategies.get(id).cloned())
            .collect())
    }

    fn get_strategy_memberships(&self, strategy_id: &str) -> Result<Vec<StrategyStock>> {
        Ok(self
            .db
            .read()?
            .strategies
            .get(strategy_id)
            .map(|s| s.stocks.clone())
            .unwrap_or_default())
    }
}
