use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::{
    calculate_drawdown, calculate_performance_metrics, value_positions, CreatePortfolioRequest,
    NavHistory, NavValuation, PerformanceMetrics, Portfolio, PortfolioRepositoryTrait,
    PortfolioLocks, PortfolioServiceTrait, Position, RebalanceRequest, RebalanceResult,
};
use crate::allocation::{
    AllocationEngineTrait, AllocationError, AllocationPreview, AllocationPreviewCache,
    AllocationRequest, StockAllocation,
};
use crate::constants::ONE_HUNDRED;
use crate::errors::{Error, Result};
use crate::quotes::QuoteSourceTrait;
use crate::strategies::StrategyRepositoryTrait;

/// Orchestrates allocation previews, portfolio persistence and NAV refresh.
pub struct PortfolioService {
    engine: Arc<dyn AllocationEngineTrait>,
    strategy_repository: Arc<dyn StrategyRepositoryTrait>,
    portfolio_repository: Arc<dyn PortfolioRepositoryTrait>,
    quote_source: Arc<dyn QuoteSourceTrait>,
    preview_cache: Arc<AllocationPreviewCache>,
    /// Serializes NAV appends and rebalances of one portfolio.
    portfolio_locks: PortfolioLocks,
}

impl PortfolioService {
    pub fn new(
        engine: Arc<dyn AllocationEngineTrait>,
        strategy_repository: Arc<dyn StrategyRepositoryTrait>,
        portfolio_repository: Arc<dyn PortfolioRepositoryTrait>,
        quote_source: Arc<dyn QuoteSourceTrait>,
        preview_cache: Arc<AllocationPreviewCache>,
    ) -> Self {
        Self {
            engine,
            strategy_repository,
            portfolio_repository,
            quote_source,
            preview_cache,
            portfolio_locks: PortfolioLocks::new(),
        }
    }

    fn validate_allocation_request(request: &AllocationRequest) -> Result<()> {
        if request.strategy_ids.is_empty() {
            return Err(Error::invalid_input("at least one strategy is required"));
        }
        if request.total_investment <= Decimal::ZERO {
            return Err(Error::invalid_input("total investment must be positive"));
        }
        let max = request.constraints.max_allocation_per_stock;
        if max <= Decimal::ZERO || max > ONE_HUNDRED {
            return Err(Error::invalid_input(format!(
                "max allocation per stock must be in (0, 100], got {}",
                max
            )));
        }
        if request.constraints.min_allocation_amount < Decimal::ZERO {
            return Err(Error::invalid_input("min allocation amount cannot be negative"));
        }
        Ok(())
    }

    /// Fails unless every requested strategy id resolves.
    fn verify_strategies_exist(&self, strategy_ids: &[String]) -> Result<()> {
        let found: HashSet<String> = self
            .strategy_repository
            .get_by_ids(strategy_ids)?
            .into_iter()
            .map(|s| s.id)
            .collect();

        let mut missing: Vec<String> = strategy_ids
            .iter()
            .filter(|id| !found.contains(*id))
            .cloned()
            .collect();
        missing.sort();
        missing.dedup();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(AllocationError::StrategyNotFound { ids: missing }.into())
        }
    }

    fn validate_create_request(request: &CreatePortfolioRequest) -> Result<Vec<&StockAllocation>> {
        if request.user_id.trim().is_empty() {
            return Err(Error::invalid_input("user id is required"));
        }
        if request.name.trim().is_empty() {
            return Err(Error::invalid_input("portfolio name is required"));
        }
        if request.total_investment <= Decimal::ZERO {
            return Err(Error::invalid_input("total investment must be positive"));
        }

        let mut seen = HashSet::new();
        for allocation in &request.allocations {
            if !seen.insert(allocation.stock_id.as_str()) {
                return Err(Error::invalid_input(format!(
                    "stock {} appears more than once",
                    allocation.ticker
                )));
            }
            if allocation.quantity < 0 {
                return Err(Error::invalid_input(format!(
                    "negative quantity for {}",
                    allocation.ticker
                )));
            }
            if allocation.quantity > 0 && allocation.price <= Decimal::ZERO {
                return Err(Error::invalid_input(format!(
                    "missing price for {}",
                    allocation.ticker
                )));
            }
        }

        let held: Vec<_> = request
            .allocations
            .iter()
            .filter(|a| a.quantity > 0)
            .collect();
        if held.is_empty() {
            return Err(Error::invalid_input(
                "allocation contains no purchasable positions",
            ));
        }

        let invested: Decimal = held
            .iter()
            .map(|a| a.price * Decimal::from(a.quantity))
            .sum();
        if invested > request.total_investment {
            return Err(Error::invalid_input(format!(
                "positions cost {} which exceeds the investment of {}",
                invested, request.total_investment
            )));
        }
        Ok(held)
    }

    /// Strategy ids recorded in the positions' contribution maps, sorted.
    fn reconstruct_strategy_ids(positions: &[Position]) -> Vec<String> {
        positions
            .iter()
            .flat_map(|p| p.strategy_contrib.keys().cloned())
            .collect::<BTreeSet<String>>()
            .into_iter()
            .collect()
    }

    /// Values the portfolio and appends a NAV row. Callers hold the
    /// portfolio's lock.
    async fn refresh_nav(&self, portfolio_id: &str) -> Result<NavHistory> {
        let portfolio = self.portfolio_repository.get_portfolio(portfolio_id)?;
        let positions = self.portfolio_repository.get_positions(portfolio_id)?;
        let valuation = self.value_portfolio(&portfolio, &positions).await?;

        let history = self.portfolio_repository.get_nav_history(portfolio_id)?;
        let high_water_mark = history
            .iter()
            .map(|row| row.nav)
            .fold(valuation.nav, Decimal::max);

        let entry = NavHistory {
            id: Uuid::new_v4().to_string(),
            portfolio_id: portfolio_id.to_string(),
            timestamp: Utc::now(),
            nav: valuation.nav,
            pnl: valuation.pnl,
            drawdown: Some(calculate_drawdown(valuation.nav, high_water_mark)),
        };
        debug!(
            "Portfolio {} NAV {} (PnL {}, high-water mark {})",
            portfolio_id, entry.nav, entry.pnl, high_water_mark
        );
        self.portfolio_repository.append_nav_history(entry).await
    }

    async fn value_portfolio(
        &self,
        portfolio: &Portfolio,
        positions: &[Position],
    ) -> Result<NavValuation> {
        if positions.is_empty() {
            return Ok(NavValuation {
                nav: portfolio.cash,
                pnl: Decimal::ZERO,
            });
        }

        let tickers: Vec<String> = positions
            .iter()
            .map(|p| p.ticker.clone())
            .collect::<BTreeSet<String>>()
            .into_iter()
            .collect();
        let quotes = self.quote_source.get_batch_quotes(&tickers).await?;
        value_positions(positions, &quotes, portfolio.cash)
    }
}

#[async_trait]
impl PortfolioServiceTrait for PortfolioService {
    async fn generate_allocation_preview(
        &self,
        request: &AllocationRequest,
    ) -> Result<AllocationPreview> {
        Self::validate_allocation_request(request)?;
        self.verify_strategies_exist(&request.strategy_ids)?;

        if let Some(cached) = self.preview_cache.get(request) {
            debug!("Allocation preview cache hit for {}", request.cache_key());
            return Ok(cached);
        }

        let preview = self.engine.calculate_allocations(request).await?;
        self.preview_cache.insert(request, preview.clone());
        Ok(preview)
    }

    async fn generate_allocation_preview_with_exclusions(
        &self,
        request: &AllocationRequest,
        new_exclusions: &[String],
    ) -> Result<AllocationPreview> {
        Self::validate_allocation_request(request)?;
        self.verify_strategies_exist(&request.strategy_ids)?;

        let merged = request.with_exclusions(new_exclusions);
        if let Some(cached) = self.preview_cache.get(&merged) {
            debug!("Allocation preview cache hit for {}", merged.cache_key());
            return Ok(cached);
        }

        let preview = self
            .engine
            .recalculate_with_exclusions(request, new_exclusions)
            .await?;
        self.preview_cache.insert(&merged, preview.clone());
        Ok(preview)
    }

    async fn create_portfolio(&self, request: CreatePortfolioRequest) -> Result<Portfolio> {
        let held = Self::validate_create_request(&request)?;
        let now = Utc::now();
        let portfolio_id = Uuid::new_v4().to_string();

        let invested: Decimal = held
            .iter()
            .map(|a| a.price * Decimal::from(a.quantity))
            .sum();

        let positions: Vec<Position> = held
            .iter()
            .map(|a| Position {
                id: Uuid::new_v4().to_string(),
                portfolio_id: portfolio_id.clone(),
                stock_id: a.stock_id.clone(),
                ticker: a.ticker.clone(),
                quantity: a.quantity,
                entry_price: a.price,
                allocation_value: a.allocation_value,
                strategy_contrib: a.strategy_contrib.clone(),
                created_at: now,
                updated_at: now,
            })
            .collect();

        let portfolio = Portfolio {
            id: portfolio_id.clone(),
            user_id: request.user_id.clone(),
            name: request.name.trim().to_string(),
            description: request.description.clone(),
            total_investment: request.total_investment,
            cash: request.total_investment - invested,
            created_at: now,
            updated_at: now,
        };

        let initial_nav = NavHistory {
            id: Uuid::new_v4().to_string(),
            portfolio_id: portfolio_id.clone(),
            timestamp: now,
            nav: request.total_investment,
            pnl: Decimal::ZERO,
            drawdown: Some(Decimal::ZERO),
        };

        let position_count = positions.len();
        let created = self
            .portfolio_repository
            .create_portfolio(portfolio, positions, initial_nav)
            .await?;
        info!(
            "Created portfolio '{}' ({}) with {} positions, {} cash",
            created.name, created.id, position_count, created.cash
        );
        Ok(created)
    }

    async fn update_portfolio_nav(&self, portfolio_id: &str) -> Result<NavHistory> {
        let _guard = self.portfolio_locks.lock(portfolio_id).await;
        self.refresh_nav(portfolio_id).await
    }

    async fn generate_rebalance_preview(
        &self,
        portfolio_id: &str,
        request: &RebalanceRequest,
    ) -> Result<AllocationPreview> {
        // Existence check first so an unknown id reports not-found.
        self.portfolio_repository.get_portfolio(portfolio_id)?;
        let positions = self.portfolio_repository.get_positions(portfolio_id)?;

        let strategy_ids = Self::reconstruct_strategy_ids(&positions);
        if strategy_ids.is_empty() {
            return Err(Error::invalid_input(format!(
                "portfolio {} has no strategy contributions to rebalance from",
                portfolio_id
            )));
        }

        let allocation_request = AllocationRequest {
            strategy_ids,
            total_investment: request.total_investment,
            constraints: request.constraints.clone(),
            excluded_stock_ids: request.excluded_stock_ids.clone(),
        };
        self.generate_allocation_preview(&allocation_request).await
    }

    async fn rebalance_portfolio(
        &self,
        portfolio_id: &str,
        request: &RebalanceRequest,
    ) -> Result<RebalanceResult> {
        let _guard = self.portfolio_locks.lock(portfolio_id).await;
        let mut portfolio = self.portfolio_repository.get_portfolio(portfolio_id)?;
        let preview = self.generate_rebalance_preview(portfolio_id, request).await?;

        let existing: HashMap<String, Position> = self
            .portfolio_repository
            .get_positions(portfolio_id)?
            .into_iter()
            .map(|p| (p.stock_id.clone(), p))
            .collect();

        let now = Utc::now();
        let mut updated_positions = 0;
        let mut inserted_positions = 0;

        // Positions missing from the new allocation are left as they are.
        for allocation in preview.allocations.iter().filter(|a| a.quantity > 0) {
            match existing.get(&allocation.stock_id) {
                Some(position) => {
                    let updated = Position {
                        quantity: allocation.quantity,
                        entry_price: allocation.price,
                        allocation_value: allocation.allocation_value,
                        strategy_contrib: allocation.strategy_contrib.clone(),
                        updated_at: now,
                        ..position.clone()
                    };
                    self.portfolio_repository.update_position(updated).await?;
                    updated_positions += 1;
                }
                None => {
                    let inserted = Position {
                        id: Uuid::new_v4().to_string(),
                        portfolio_id: portfolio_id.to_string(),
                        stock_id: allocation.stock_id.clone(),
                        ticker: allocation.ticker.clone(),
                        quantity: allocation.quantity,
                        entry_price: allocation.price,
                        allocation_value: allocation.allocation_value,
                        strategy_contrib: allocation.strategy_contrib.clone(),
                        created_at: now,
                        updated_at: now,
                    };
                    self.portfolio_repository.insert_position(inserted).await?;
                    inserted_positions += 1;
                }
            }
        }

        portfolio.total_investment = request.total_investment;
        portfolio.cash = preview.unallocated_cash;
        portfolio.updated_at = now;
        let portfolio = self.portfolio_repository.update_portfolio(portfolio).await?;

        let nav = self.refresh_nav(portfolio_id).await?;
        info!(
            "Rebalanced portfolio {}: {} updated, {} inserted, NAV {}",
            portfolio_id, updated_positions, inserted_positions, nav.nav
        );

        Ok(RebalanceResult {
            portfolio,
            preview,
            nav,
            updated_positions,
            inserted_positions,
        })
    }

    fn get_portfolio_performance_metrics(&self, portfolio_id: &str) -> Result<PerformanceMetrics> {
        self.portfolio_repository.get_portfolio(portfolio_id)?;
        let history = self.portfolio_repository.get_nav_history(portfolio_id)?;
        Ok(calculate_performance_metrics(&history))
    }

    fn get_portfolio(&self, portfolio_id: &str) -> Result<Portfolio> {
        self.portfolio_repository.get_portfolio(portfolio_id)
    }

    fn get_user_portfolios(&self, user_id: &str) -> Result<Vec<Portfolio>> {
        self.portfolio_repository.get_portfolios_by_user(user_id)
    }

    fn get_positions(&self, portfolio_id: &str) -> Result<Vec<Position>> {
        self.portfolio_repository.get_positions(portfolio_id)
    }

    fn get_nav_history(&self, portfolio_id: &str) -> Result<Vec<NavHistory>> {
        self.portfolio_repository.get_nav_history(portfolio_id)
    }
}
