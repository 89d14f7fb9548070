//! Allocation domain models and the allocation error taxonomy.

use std::collections::{HashMap, HashSet};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::constants::ONE_HUNDRED;

/// Per-stock limits applied to an allocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AllocationConstraints {
    /// Largest share of the total investment a single stock may receive, in percent (0, 100].
    pub max_allocation_per_stock: Decimal,
    /// Smallest cash amount worth allocating to a stock.
    pub min_allocation_amount: Decimal,
}

impl AllocationConstraints {
    pub fn new(max_allocation_per_stock: Decimal, min_allocation_amount: Decimal) -> Self {
        Self {
            max_allocation_per_stock,
            min_allocation_amount,
        }
    }

    /// Cash cap per stock for the given investment.
    pub fn max_allocation_amount(&self, total_investment: Decimal) -> Decimal {
        total_investment * self.max_allocation_per_stock / ONE_HUNDRED
    }
}

/// Input for an allocation calculation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AllocationRequest {
    pub strategy_ids: Vec<String>,
    pub total_investment: Decimal,
    pub constraints: AllocationConstraints,
    #[serde(default)]
    pub excluded_stock_ids: Vec<String>,
}

impl AllocationRequest {
    /// Returns a copy of this request with `new_exclusions` merged into the
    /// existing exclusion list. Existing order is kept and duplicates dropped.
    pub fn with_exclusions(&self, new_exclusions: &[String]) -> AllocationRequest {
        let mut seen: HashSet<String> = HashSet::new();
        let excluded_stock_ids = self
            .excluded_stock_ids
            .iter()
            .chain(new_exclusions.iter())
            .filter(|id| seen.insert((*id).clone()))
            .cloned()
            .collect();

        AllocationRequest {
            excluded_stock_ids,
            ..self.clone()
        }
    }

    /// Deterministic cache key. Id order and duplicates do not affect the key,
    /// and numerically equal amounts map to the same key.
    pub fn cache_key(&self) -> String {
        fn canonical(ids: &[String]) -> String {
            let mut ids: Vec<&str> = ids.iter().map(String::as_str).collect();
            ids.sort_unstable();
            ids.dedup();
            ids.join(",")
        }

        format!(
            "inv={}|max={}|min={}|strategies={}|excluded={}",
            self.total_investment.normalize(),
            self.constraints.max_allocation_per_stock.normalize(),
            self.constraints.min_allocation_amount.normalize(),
            canonical(&self.strategy_ids),
            canonical(&self.excluded_stock_ids),
        )
    }
}

/// One stock's share of an allocation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StockAllocation {
    pub stock_id: String,
    pub ticker: String,
    pub name: String,
    /// Share of the total investment in percent, from the normalized allocation value.
    pub weight: Decimal,
    /// Target cash amount before whole-share rounding.
    pub allocation_value: Decimal,
    pub price: Decimal,
    pub quantity: i64,
    /// `price * quantity`
    pub actual_value: Decimal,
    /// Strategy id -> cash contributed by that strategy.
    pub strategy_contrib: HashMap<String, Decimal>,
}

impl StockAllocation {
    /// An allocation with no cash assigned yet.
    pub fn empty(
        stock_id: impl Into<String>,
        ticker: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            stock_id: stock_id.into(),
            ticker: ticker.into(),
            name: name.into(),
            weight: Decimal::ZERO,
            allocation_value: Decimal::ZERO,
            price: Decimal::ZERO,
            quantity: 0,
            actual_value: Decimal::ZERO,
            strategy_contrib: HashMap::new(),
        }
    }

    /// Adds `amount` contributed by `strategy_id`.
    pub fn add_contribution(&mut self, strategy_id: &str, amount: Decimal) {
        self.allocation_value += amount;
        *self
            .strategy_contrib
            .entry(strategy_id.to_string())
            .or_insert(Decimal::ZERO) += amount;
    }

    /// Multiplies the allocation value and every contribution by `factor`.
    pub fn scale(&mut self, factor: Decimal) {
        self.allocation_value *= factor;
        for amount in self.strategy_contrib.values_mut() {
            *amount *= factor;
        }
    }

    /// Lowers the value to `cap`, scaling contributions by the same factor.
    pub fn cap_at(&mut self, cap: Decimal) {
        if self.allocation_value > cap && self.allocation_value > Decimal::ZERO {
            self.scale(cap / self.allocation_value);
            self.allocation_value = cap;
        }
    }
}

/// Unpersisted result of an allocation calculation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AllocationPreview {
    pub total_investment: Decimal,
    pub allocations: Vec<StockAllocation>,
    /// `total_investment - total_allocated`, including whole-share rounding losses.
    pub unallocated_cash: Decimal,
    /// Sum of `actual_value` over all allocations.
    pub total_allocated: Decimal,
    pub constraints: AllocationConstraints,
    /// Non-fatal findings of the detailed validation pass.
    #[serde(default)]
    pub warnings: Vec<ConstraintViolation>,
}

/// Machine-readable kind of a constraint finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViolationType {
    InvalidMaxAllocation,
    ConflictingConstraints,
    HighMinAllocation,
    ZeroInvestment,
    BelowMinimum,
    AboveMaximum,
    LowAllocationRatio,
    ConcentrationRisk,
}

impl ViolationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationType::InvalidMaxAllocation => "INVALID_MAX_ALLOCATION",
            ViolationType::ConflictingConstraints => "CONFLICTING_CONSTRAINTS",
            ViolationType::HighMinAllocation => "HIGH_MIN_ALLOCATION",
            ViolationType::ZeroInvestment => "ZERO_INVESTMENT",
            ViolationType::BelowMinimum => "BELOW_MINIMUM",
            ViolationType::AboveMaximum => "ABOVE_MAXIMUM",
            ViolationType::LowAllocationRatio => "LOW_ALLOCATION_RATIO",
            ViolationType::ConcentrationRisk => "CONCENTRATION_RISK",
        }
    }
}

impl std::fmt::Display for ViolationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single constraint finding with remediation hints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConstraintViolation {
    pub violation_type: ViolationType,
    pub ticker: Option<String>,
    pub current_value: Decimal,
    pub limit_value: Decimal,
    pub message: String,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

impl std::fmt::Display for ConstraintViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.ticker {
            Some(ticker) => write!(f, "[{}] {}: {}", self.violation_type, ticker, self.message),
            None => write!(f, "[{}] {}", self.violation_type, self.message),
        }
    }
}

/// Outcome of a validation pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub is_valid: bool,
    pub violations: Vec<ConstraintViolation>,
}

impl ValidationResult {
    pub fn from_violations(violations: Vec<ConstraintViolation>) -> Self {
        Self {
            is_valid: violations.is_empty(),
            violations,
        }
    }

    pub fn has(&self, violation_type: ViolationType) -> bool {
        self.violations
            .iter()
            .any(|v| v.violation_type == violation_type)
    }
}

/// Typed allocation failures.
///
/// Every variant exposes a machine-readable [`AllocationError::error_type`] and
/// structured [`AllocationError::details`] for the transport layer.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AllocationError {
    #[error("no strategies found")]
    NoStrategiesFound,

    #[error("strategies not found: {}", .ids.join(", "))]
    StrategyNotFound { ids: Vec<String> },

    #[error("invalid strategy weights ({total_percent}%): {message}")]
    InvalidStrategyWeights {
        total_percent: Decimal,
        message: String,
    },

    #[error("budget strategies total {budget_total} which exceeds the investment of {total_investment} by {excess}")]
    BudgetExceedsInvestment {
        budget_total: Decimal,
        total_investment: Decimal,
        excess: Decimal,
    },

    #[error("no Buy-signalled eligible stocks for strategies: {}", .strategy_ids.join(", "))]
    NoEligibleStocks { strategy_ids: Vec<String> },

    #[error("constraint violation: {}", .violations.iter().map(|v| v.to_string()).collect::<Vec<_>>().join("; "))]
    ConstraintViolation { violations: Vec<ConstraintViolation> },

    #[error("no stock satisfies the constraints, {unallocated} of {total_investment} left unallocated")]
    InsufficientAllocation {
        unallocated: Decimal,
        total_investment: Decimal,
    },

    #[error("missing market data for: {}", .tickers.join(", "))]
    MissingMarketData { tickers: Vec<String> },

    #[error("unsupported operation: {0}")]
    Unsupported(String),
}

impl AllocationError {
    pub fn error_type(&self) -> &'static str {
        match self {
            AllocationError::NoStrategiesFound => "NO_STRATEGIES_FOUND",
            AllocationError::StrategyNotFound { .. } => "STRATEGY_NOT_FOUND",
            AllocationError::InvalidStrategyWeights { .. } => "INVALID_STRATEGY_WEIGHTS",
            AllocationError::BudgetExceedsInvestment { .. } => "BUDGET_EXCEEDS_INVESTMENT",
            AllocationError::NoEligibleStocks { .. } => "NO_ELIGIBLE_STOCKS",
            AllocationError::ConstraintViolation { .. } => "CONSTRAINT_VIOLATION",
            AllocationError::InsufficientAllocation { .. } => "INSUFFICIENT_ALLOCATION",
            AllocationError::MissingMarketData { .. } => "MISSING_MARKET_DATA",
            AllocationError::Unsupported(_) => "UNSUPPORTED_OPERATION",
        }
    }

    pub fn details(&self) -> serde_json::Value {
        match self {
            AllocationError::NoStrategiesFound => json!({}),
            AllocationError::StrategyNotFound { ids } => json!({ "strategyIds": ids }),
            AllocationError::InvalidStrategyWeights {
                total_percent,
                message,
            } => json!({ "totalPercent": total_percent, "message": message }),
            AllocationError::BudgetExceedsInvestment {
                budget_total,
                total_investment,
                excess,
            } => json!({
                "budgetTotal": budget_total,
                "totalInvestment": total_investment,
                "excess": excess,
            }),
            AllocationError::NoEligibleStocks { strategy_ids } => {
                json!({ "strategyIds": strategy_ids })
            }
            AllocationError::ConstraintViolation { violations } => {
                json!({ "violations": violations })
            }
            AllocationError::InsufficientAllocation {
                unallocated,
                total_investment,
            } => json!({ "unallocated": unallocated, "totalInvestment": total_investment }),
            AllocationError::MissingMarketData { tickers } => json!({ "tickers": tickers }),
            AllocationError::Unsupported(operation) => json!({ "operation": operation }),
        }
    }
}
