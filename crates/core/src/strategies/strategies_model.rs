//! Strategy domain models.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::allocation::AllocationError;
use crate::constants::ONE_HUNDRED;

/// How a strategy's `weight_value` is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeightMode {
    /// Relative share (0-100) of the cash left after budget strategies.
    Percent,
    /// Fixed absolute cash amount.
    Budget,
}

/// Domain model for a strategy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Strategy {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub weight_mode: WeightMode,
    pub weight_value: Decimal,
    #[serde(default)]
    pub stocks: Vec<StrategyStock>,
}

/// Membership of a stock in a strategy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StrategyStock {
    pub strategy_id: String,
    pub stock_id: String,
    pub eligible: bool,
}

impl Strategy {
    pub fn is_percent(&self) -> bool {
        self.weight_mode == WeightMode::Percent
    }

    pub fn is_budget(&self) -> bool {
        self.weight_mode == WeightMode::Budget
    }
}

/// Checks that adding (or replacing) `candidate` keeps the owner's percent-mode
/// weights at or below 100.
///
/// `existing` may contain strategies of other users and a previous version of
/// `candidate` itself; both are ignored.
pub fn validate_user_percent_weights(
    existing: &[Strategy],
    candidate: &Strategy,
) -> std::result::Result<(), AllocationError> {
    if candidate.weight_value < Decimal::ZERO {
        return Err(AllocationError::InvalidStrategyWeights {
            total_percent: candidate.weight_value,
            message: format!("strategy '{}' has a negative weight", candidate.name),
        });
    }
    if !candidate.is_percent() {
        return Ok(());
    }

    let others: Decimal = existing
        .iter()
        .filter(|s| s.user_id == candidate.user_id && s.id != candidate.id && s.is_percent())
        .map(|s| s.weight_value)
        .sum();
    let total = others + candidate.weight_value;

    if total > ONE_HUNDRED {
        return Err(AllocationError::InvalidStrategyWeights {
            total_percent: total,
            message: format!(
                "percent strategies of user '{}' would total {}%, only {}% remains",
                candidate.user_id,
                total,
                ONE_HUNDRED - others
            ),
        });
    }
    Ok(())
}
