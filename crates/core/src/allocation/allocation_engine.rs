//! Allocation engine: turns weighted strategies and an investment amount into
//! whole-share stock allocations.
//!
//! The pipeline runs strategy-weight resolution, stock distribution,
//! constraint gating and application, normalization and price/quantity
//! resolution, then a non-fatal detailed validation pass.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, warn};
use num_traits::ToPrimitive;
use rust_decimal::Decimal;

use super::{
    validate_allocations, validate_constraints_config, AllocationConstraints, AllocationError,
    AllocationPreview, AllocationRequest, StockAllocation,
};
use crate::constants::{NORMALIZATION_RESIDUE_TOLERANCE, ONE_HUNDRED, PERCENT_SCALE};
use crate::errors::{Error, Result};
use crate::quotes::{Quote, QuoteSourceTrait};
use crate::stocks::{SignalRepositoryTrait, Stock, StockRepositoryTrait};
use crate::strategies::{Strategy, StrategyRepositoryTrait};

/// Trait for the allocation engine.
#[async_trait]
pub trait AllocationEngineTrait: Send + Sync {
    /// Runs the full allocation pipeline for a request.
    async fn calculate_allocations(&self, request: &AllocationRequest)
        -> Result<AllocationPreview>;

    /// Merges `new_exclusions` into the request's exclusions and re-runs the
    /// full pipeline.
    async fn recalculate_with_exclusions(
        &self,
        request: &AllocationRequest,
        new_exclusions: &[String],
    ) -> Result<AllocationPreview>;

    /// Rebalancing needs persisted positions and is handled by the portfolio service.
    async fn rebalance_allocations(&self, portfolio_id: &str) -> Result<AllocationPreview>;
}

pub struct AllocationEngine {
    strategy_repository: Arc<dyn StrategyRepositoryTrait>,
    stock_repository: Arc<dyn StockRepositoryTrait>,
    signal_repository: Arc<dyn SignalRepositoryTrait>,
    quote_source: Arc<dyn QuoteSourceTrait>,
}

impl AllocationEngine {
    pub fn new(
        strategy_repository: Arc<dyn StrategyRepositoryTrait>,
        stock_repository: Arc<dyn StockRepositoryTrait>,
        signal_repository: Arc<dyn SignalRepositoryTrait>,
        quote_source: Arc<dyn QuoteSourceTrait>,
    ) -> Self {
        Self {
            strategy_repository,
            stock_repository,
            signal_repository,
            quote_source,
        }
    }

    /// Spreads each strategy's cash equally over its eligible, non-excluded,
    /// Buy-signalled stocks. A strategy with no such stock contributes nothing.
    fn distribute_to_stocks(
        &self,
        strategies: &[Strategy],
        strategy_amounts: &HashMap<String, Decimal>,
        excluded: &HashSet<&str>,
    ) -> Result<Vec<StockAllocation>> {
        let mut candidates: Vec<(&Strategy, Vec<String>)> = Vec::with_capacity(strategies.len());
        let mut all_ids: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for strategy in strategies {
            let memberships = self
                .strategy_repository
                .get_strategy_memberships(&strategy.id)?;
            let mut ids: Vec<String> = Vec::new();
            for membership in memberships {
                if !membership.eligible || excluded.contains(membership.stock_id.as_str()) {
                    continue;
                }
                if ids.contains(&membership.stock_id) {
                    continue;
                }
                if seen.insert(membership.stock_id.clone()) {
                    all_ids.push(membership.stock_id.clone());
                }
                ids.push(membership.stock_id);
            }
            candidates.push((strategy, ids));
        }

        let signals = self.signal_repository.get_latest_signals(&all_ids)?;
        let stocks: HashMap<String, Stock> = self
            .stock_repository
            .get_by_ids(&all_ids)?
            .into_iter()
            .map(|s| (s.id.clone(), s))
            .collect();

        let mut order: Vec<String> = Vec::new();
        let mut by_stock: HashMap<String, StockAllocation> = HashMap::new();

        for (strategy, ids) in candidates {
            let amount = strategy_amounts
                .get(&strategy.id)
                .copied()
                .unwrap_or(Decimal::ZERO);
            if amount <= Decimal::ZERO {
                debug!("Strategy '{}' resolved to no cash, skipping", strategy.id);
                continue;
            }

            let eligible: Vec<&Stock> = ids
                .iter()
                .filter(|id| signals.get(*id).is_some_and(|signal| signal.is_buy()))
                .filter_map(|id| {
                    let stock = stocks.get(id);
                    if stock.is_none() {
                        warn!("Stock '{}' of strategy '{}' is unknown, skipping", id, strategy.id);
                    }
                    stock
                })
                .collect();

            if eligible.is_empty() {
                debug!(
                    "Strategy '{}' has no eligible Buy-signalled stocks, {} stays unallocated",
                    strategy.id, amount
                );
                continue;
            }

            let per_stock = amount / Decimal::from(eligible.len());
            for stock in eligible {
                let allocation = by_stock.entry(stock.id.clone()).or_insert_with(|| {
                    order.push(stock.id.clone());
                    StockAllocation::empty(&stock.id, &stock.ticker, &stock.name)
                });
                allocation.add_contribution(&strategy.id, per_stock);
            }
        }

        if by_stock.is_empty() {
            return Err(AllocationError::NoEligibleStocks {
                strategy_ids: strategies.iter().map(|s| s.id.clone()).collect(),
            }
            .into());
        }

        Ok(order
            .into_iter()
            .filter_map(|id| by_stock.remove(&id))
            .collect())
    }

    /// Fetches quotes for all surviving tickers in one batch and converts
    /// allocation values into whole-share quantities.
    async fn add_prices_and_quantities(
        &self,
        allocations: Vec<StockAllocation>,
    ) -> Result<Vec<StockAllocation>> {
        let tickers: Vec<String> = allocations.iter().map(|a| a.ticker.clone()).collect();
        let quotes = self.quote_source.get_batch_quotes(&tickers).await?;
        apply_quotes(allocations, &quotes)
    }
}

#[async_trait]
impl AllocationEngineTrait for AllocationEngine {
    async fn calculate_allocations(
        &self,
        request: &AllocationRequest,
    ) -> Result<AllocationPreview> {
        let total_investment = request.total_investment;
        if total_investment <= Decimal::ZERO {
            let config = validate_constraints_config(&request.constraints, total_investment);
            return Err(AllocationError::ConstraintViolation {
                violations: config.violations,
            }
            .into());
        }

        let strategies = self.strategy_repository.get_by_ids(&request.strategy_ids)?;
        if strategies.is_empty() {
            return Err(AllocationError::NoStrategiesFound.into());
        }
        debug!(
            "Calculating allocation of {} across {} strategies",
            total_investment,
            strategies.len()
        );

        let strategy_amounts = calculate_strategy_weights(&strategies, total_investment)?;

        let excluded: HashSet<&str> = request
            .excluded_stock_ids
            .iter()
            .map(String::as_str)
            .collect();
        let allocations = self.distribute_to_stocks(&strategies, &strategy_amounts, &excluded)?;
        debug!("Distributed cash over {} stocks", allocations.len());

        let config = validate_constraints_config(&request.constraints, total_investment);
        if !config.is_valid {
            return Err(AllocationError::ConstraintViolation {
                violations: config.violations,
            }
            .into());
        }

        let allocations = apply_constraints(allocations, &request.constraints, total_investment);
        if allocations.is_empty() {
            return Err(AllocationError::InsufficientAllocation {
                unallocated: total_investment,
                total_investment,
            }
            .into());
        }

        let allocations = normalize_allocations(
            allocations,
            total_investment,
            request.constraints.max_allocation_amount(total_investment),
        );
        let mut allocations = self.add_prices_and_quantities(allocations).await?;

        let detailed = validate_allocations(&allocations, &request.constraints, total_investment);
        for violation in &detailed.violations {
            warn!("Allocation warning: {}", violation);
        }

        allocations.sort_by(|a, b| {
            b.allocation_value
                .cmp(&a.allocation_value)
                .then_with(|| a.ticker.cmp(&b.ticker))
        });

        let total_allocated: Decimal = allocations.iter().map(|a| a.actual_value).sum();
        let unallocated_cash = total_investment - total_allocated;
        debug!(
            "Allocated {} of {} ({} unallocated)",
            total_allocated, total_investment, unallocated_cash
        );

        Ok(AllocationPreview {
            total_investment,
            allocations,
            unallocated_cash,
            total_allocated,
            constraints: request.constraints.clone(),
            warnings: detailed.violations,
        })
    }

    async fn recalculate_with_exclusions(
        &self,
        request: &AllocationRequest,
        new_exclusions: &[String],
    ) -> Result<AllocationPreview> {
        let merged = request.with_exclusions(new_exclusions);
        self.calculate_allocations(&merged).await
    }

    async fn rebalance_allocations(&self, portfolio_id: &str) -> Result<AllocationPreview> {
        Err(AllocationError::Unsupported(format!(
            "engine-level rebalance of portfolio {}; use the portfolio service",
            portfolio_id
        ))
        .into())
    }
}

/// Resolves every strategy to a cash amount.
///
/// Budget strategies take their literal amount first; percent strategies share
/// what remains, each receiving `remaining * weight / 100`.
pub fn calculate_strategy_weights(
    strategies: &[Strategy],
    total_investment: Decimal,
) -> std::result::Result<HashMap<String, Decimal>, AllocationError> {
    if let Some(negative) = strategies.iter().find(|s| s.weight_value < Decimal::ZERO) {
        return Err(AllocationError::InvalidStrategyWeights {
            total_percent: negative.weight_value,
            message: format!("strategy '{}' has a negative weight", negative.id),
        });
    }

    let (budget, percent): (Vec<&Strategy>, Vec<&Strategy>) =
        strategies.iter().partition(|s| s.is_budget());

    let budget_total: Decimal = budget.iter().map(|s| s.weight_value).sum();
    if budget_total > total_investment {
        return Err(AllocationError::BudgetExceedsInvestment {
            budget_total,
            total_investment,
            excess: budget_total - total_investment,
        });
    }

    let remaining = total_investment - budget_total;
    let percent_total: Decimal = percent.iter().map(|s| s.weight_value).sum();
    if percent_total > ONE_HUNDRED {
        return Err(AllocationError::InvalidStrategyWeights {
            total_percent: percent_total,
            message: "percent strategies exceed 100%".to_string(),
        });
    }

    let mut amounts = HashMap::with_capacity(strategies.len());
    for strategy in budget {
        *amounts.entry(strategy.id.clone()).or_insert(Decimal::ZERO) += strategy.weight_value;
    }
    for strategy in percent {
        *amounts.entry(strategy.id.clone()).or_insert(Decimal::ZERO) +=
            remaining * strategy.weight_value / ONE_HUNDRED;
    }
    Ok(amounts)
}

/// Caps each allocation at `max_allocation_per_stock` percent of the investment,
/// then drops allocations still below `min_allocation_amount`.
pub fn apply_constraints(
    allocations: Vec<StockAllocation>,
    constraints: &AllocationConstraints,
    total_investment: Decimal,
) -> Vec<StockAllocation> {
    let cap = constraints.max_allocation_amount(total_investment);

    allocations
        .into_iter()
        .map(|mut allocation| {
            if allocation.allocation_value > cap {
                debug!(
                    "Capping {} from {} to {}",
                    allocation.ticker, allocation.allocation_value, cap
                );
                allocation.cap_at(cap);
            }
            allocation
        })
        .filter(|allocation| {
            let keep = allocation.allocation_value >= constraints.min_allocation_amount;
            if !keep {
                debug!(
                    "Dropping {}: {} is below the minimum of {}",
                    allocation.ticker,
                    allocation.allocation_value,
                    constraints.min_allocation_amount
                );
            }
            keep
        })
        .collect()
}

/// Scales allocations toward `total_investment` without letting any value
/// pass `max_value`, then recomputes each weight.
///
/// A set above the total is scaled down proportionally. Otherwise allocations
/// at the cap are frozen and the remaining gap is spread proportionally over
/// the others, repeating while the rescale pushes new allocations onto the
/// cap. When every allocation is capped the shortfall is left for unallocated
/// cash. A set already summing to the total keeps its values.
pub fn normalize_allocations(
    mut allocations: Vec<StockAllocation>,
    total_investment: Decimal,
    max_value: Decimal,
) -> Vec<StockAllocation> {
    if total_investment <= Decimal::ZERO || max_value <= Decimal::ZERO {
        return allocations;
    }
    for allocation in allocations.iter_mut() {
        allocation.cap_at(max_value);
    }

    let current_sum: Decimal = allocations.iter().map(|a| a.allocation_value).sum();
    if current_sum > total_investment {
        let factor = total_investment / current_sum;
        for allocation in allocations.iter_mut() {
            allocation.scale(factor);
        }
    }

    loop {
        let (capped, free): (Vec<&mut StockAllocation>, Vec<&mut StockAllocation>) = allocations
            .iter_mut()
            .partition(|a| a.allocation_value >= max_value);
        let capped_sum: Decimal = capped.iter().map(|a| a.allocation_value).sum();
        let free_sum: Decimal = free.iter().map(|a| a.allocation_value).sum();
        let target = total_investment - capped_sum;
        if free_sum <= Decimal::ZERO || target <= Decimal::ZERO || free_sum == target {
            break;
        }

        let factor = target / free_sum;
        let mut newly_capped = 0;
        for allocation in free {
            allocation.scale(factor);
            if allocation.allocation_value > max_value {
                allocation.cap_at(max_value);
                newly_capped += 1;
            }
        }
        if newly_capped == 0 {
            break;
        }
        debug!("Normalization froze {} more allocations at the cap", newly_capped);
    }

    settle_residue(&mut allocations, total_investment, max_value);

    for allocation in allocations.iter_mut() {
        allocation.weight = (allocation.allocation_value / total_investment * ONE_HUNDRED)
            .round_dp(PERCENT_SCALE);
    }
    allocations
}

/// Decimal division leaves a residue in the last digits; park it on the
/// largest uncapped allocation that can take it without passing the cap.
fn settle_residue(
    allocations: &mut [StockAllocation],
    total_investment: Decimal,
    max_value: Decimal,
) {
    let sum: Decimal = allocations.iter().map(|a| a.allocation_value).sum();
    let residue = total_investment - sum;
    if residue.is_zero() || residue.abs() > NORMALIZATION_RESIDUE_TOLERANCE {
        return;
    }

    let target = allocations
        .iter_mut()
        .filter(|a| {
            a.allocation_value > Decimal::ZERO
                && a.allocation_value < max_value
                && a.allocation_value + residue <= max_value
        })
        .max_by(|a, b| a.allocation_value.cmp(&b.allocation_value));
    if let Some(largest) = target {
        largest.allocation_value += residue;
        if let Some(contrib) = largest.strategy_contrib.values_mut().max_by(|a, b| a.cmp(b)) {
            *contrib += residue;
        }
    }
}

/// Resolves prices and whole-share quantities. Fails when any ticker lacks a
/// usable quote.
pub fn apply_quotes(
    allocations: Vec<StockAllocation>,
    quotes: &HashMap<String, Quote>,
) -> Result<Vec<StockAllocation>> {
    let missing: Vec<String> = allocations
        .iter()
        .filter(|a| {
            quotes
                .get(&a.ticker)
                .map_or(true, |quote| quote.price <= Decimal::ZERO)
        })
        .map(|a| a.ticker.clone())
        .collect();
    if !missing.is_empty() {
        return Err(AllocationError::MissingMarketData { tickers: missing }.into());
    }

    allocations
        .into_iter()
        .map(|mut allocation| -> Result<StockAllocation> {
            let price = quotes
                .get(&allocation.ticker)
                .map(|quote| quote.price)
                .ok_or_else(|| Error::Unexpected(format!("quote vanished for {}", allocation.ticker)))?;
            let quantity = (allocation.allocation_value / price)
                .floor()
                .to_i64()
                .ok_or_else(|| {
                    Error::Unexpected(format!(
                        "share quantity out of range for {}",
                        allocation.ticker
                    ))
                })?;
            allocation.price = price;
            allocation.quantity = quantity;
            allocation.actual_value = price * Decimal::from(quantity);
            Ok(allocation)
        })
        .collect()
}
