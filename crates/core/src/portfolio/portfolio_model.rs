//! Portfolio domain models.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::allocation::{AllocationConstraints, AllocationPreview, StockAllocation};

/// Domain model for a portfolio
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Portfolio {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub description: Option<String>,
    pub total_investment: Decimal,
    /// Cash left over after whole-share purchasing.
    pub cash: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Domain model for a held position
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub id: String,
    pub portfolio_id: String,
    pub stock_id: String,
    pub ticker: String,
    pub quantity: i64,
    pub entry_price: Decimal,
    pub allocation_value: Decimal,
    /// Strategy id -> cash contributed by that strategy.
    #[serde(default)]
    pub strategy_contrib: HashMap<String, Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One NAV observation of a portfolio
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NavHistory {
    pub id: String,
    pub portfolio_id: String,
    pub timestamp: DateTime<Utc>,
    pub nav: Decimal,
    pub pnl: Decimal,
    /// Decline from the high-water mark in percent.
    pub drawdown: Option<Decimal>,
}

/// Input model for creating a portfolio from a computed allocation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePortfolioRequest {
    pub user_id: String,
    pub name: String,
    pub description: Option<String>,
    pub total_investment: Decimal,
    pub allocations: Vec<StockAllocation>,
}

impl CreatePortfolioRequest {
    /// Builds a request from a preview the client accepted.
    pub fn from_preview(
        user_id: impl Into<String>,
        name: impl Into<String>,
        description: Option<String>,
        preview: AllocationPreview,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            name: name.into(),
            description,
            total_investment: preview.total_investment,
            allocations: preview.allocations,
        }
    }
}

/// Input model for rebalancing an existing portfolio
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RebalanceRequest {
    pub total_investment: Decimal,
    pub constraints: AllocationConstraints,
    #[serde(default)]
    pub excluded_stock_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RebalanceResult {
    pub portfolio: Portfolio,
    pub preview: AllocationPreview,
    pub nav: NavHistory,
    pub updated_positions: usize,
    pub inserted_positions: usize,
}

/// Read-only projection over a NAV history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetrics {
    pub initial_nav: Decimal,
    pub current_nav: Decimal,
    pub total_return: Decimal,
    /// Linear (non-compounding) estimate.
    pub annualized_return: Decimal,
    pub max_drawdown: Decimal,
    pub current_drawdown: Decimal,
    pub high_water_mark: Decimal,
    pub days_active: i64,
}
