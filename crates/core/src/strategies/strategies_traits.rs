use crate::errors::Result;

use super::{Strategy, StrategyStock};

/// Read access to strategies and their stock memberships.
pub trait StrategyRepositoryTrait: Send + Sync {
    /// Loads the strategies with the given ids. Unknown ids are skipped.
    fn get_by_ids(&self, ids: &[String]) -> Result<Vec<Strategy>>;

    /// Loads the stock memberships of one strategy.
    fn get_strategy_memberships(&self, strategy_id: &str) -> Result<Vec<StrategyStock>>;
}
