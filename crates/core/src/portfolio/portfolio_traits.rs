use async_trait::async_trait;

use super::{
    CreatePortfolioRequest, NavHistory, PerformanceMetrics, Portfolio, Position,
    RebalanceRequest, RebalanceResult,
};
use crate::allocation::{AllocationPreview, AllocationRequest};
use crate::errors::Result;

/// Trait for portfolio repository operations
#[async_trait]
pub trait PortfolioRepositoryTrait: Send + Sync {
    fn get_portfolio(&self, portfolio_id: &str) -> Result<Portfolio>;
    fn get_portfolios_by_user(&self, user_id: &str) -> Result<Vec<Portfolio>>;
    /// Ids of every portfolio, used by the NAV scheduler.
    fn get_all_portfolio_ids(&self) -> Result<Vec<String>>;
    fn get_positions(&self, portfolio_id: &str) -> Result<Vec<Position>>;
    /// NAV rows of a portfolio, oldest first.
    fn get_nav_history(&self, portfolio_id: &str) -> Result<Vec<NavHistory>>;

    /// Persists a portfolio, its positions and its first NAV row atomically.
    async fn create_portfolio(
        &self,
        portfolio: Portfolio,
        positions: Vec<Position>,
        initial_nav: NavHistory,
    ) -> Result<Portfolio>;
    async fn update_portfolio(&self, portfolio: Portfolio) -> Result<Portfolio>;
    async fn insert_position(&self, position: Position) -> Result<Position>;
    async fn update_position(&self, position: Position) -> Result<Position>;
    async fn append_nav_history(&self, entry: NavHistory) -> Result<NavHistory>;
}

/// Trait for portfolio service operations
#[async_trait]
pub trait PortfolioServiceTrait: Send + Sync {
    async fn generate_allocation_preview(
        &self,
        request: &AllocationRequest,
    ) -> Result<AllocationPreview>;

    async fn generate_allocation_preview_with_exclusions(
        &self,
        request: &AllocationRequest,
        new_exclusions: &[String],
    ) -> Result<AllocationPreview>;

    async fn create_portfolio(&self, request: CreatePortfolioRequest) -> Result<Portfolio>;

    /// Marks the portfolio to market and appends a NAV row.
    async fn update_portfolio_nav(&self, portfolio_id: &str) -> Result<NavHistory>;

    async fn generate_rebalance_preview(
        &self,
        portfolio_id: &str,
        request: &RebalanceRequest,
    ) -> Result<AllocationPreview>;

    async fn rebalance_portfolio(
        &self,
        portfolio_id: &str,
        request: &RebalanceRequest,
    ) -> Result<RebalanceResult>;

    fn get_portfolio_performance_metrics(&self, portfolio_id: &str) -> Result<PerformanceMetrics>;

    fn get_portfolio(&self, portfolio_id: &str) -> Result<Portfolio>;
    fn get_user_portfolios(&self, user_id: &str) -> Result<Vec<Portfolio>>;
    fn get_positions(&self, portfolio_id: &str) -> Result<Vec<Position>>;
    fn get_nav_history(&self, portfolio_id: &str) -> Result<Vec<NavHistory>>;
}
