//! Persisted portfolios: creation from an allocation, NAV refresh,
//! rebalancing and performance metrics.

mod performance;
mod portfolio_locks;
mod portfolio_model;
mod portfolio_service;
mod portfolio_traits;


pub use performance::*;
pub use portfolio_locks::{PortfolioLockGuard, PortfolioLocks};
pub use portfolio_model::*;
pub use portfolio_service::PortfolioService;
pub use portfolio_traits::*;
