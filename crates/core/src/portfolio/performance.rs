//! NAV valuation and performance metrics over a NAV history.

use std::collections::HashMap;

use rust_decimal::Decimal;

use super::{NavHistory, PerformanceMetrics, Position};
use crate::constants::{DAYS_PER_YEAR, ONE_HUNDRED, PERCENT_SCALE};
use crate::errors::Result;
use crate::quotes::{MarketDataError, Quote};

/// Marked-to-market value of a portfolio.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NavValuation {
    pub nav: Decimal,
    pub pnl: Decimal,
}

/// Values positions at the given quotes: `nav = cash + sum(quantity * price)` and
/// `pnl = sum((price - entry_price) * quantity)`.
///
/// Every held ticker must have a quote.
pub fn value_positions(
    positions: &[Position],
    quotes: &HashMap<String, Quote>,
    cash: Decimal,
) -> Result<NavValuation> {
    let missing: Vec<&str> = positions
        .iter()
        .filter(|p| !quotes.contains_key(&p.ticker))
        .map(|p| p.ticker.as_str())
        .collect();
    if !missing.is_empty() {
        return Err(MarketDataError::NotFound(missing.join(", ")).into());
    }

    let mut nav = cash;
    let mut pnl = Decimal::ZERO;
    for position in positions {
        if let Some(quote) = quotes.get(&position.ticker) {
            let quantity = Decimal::from(position.quantity);
            nav += quote.price * quantity;
            pnl += (quote.price - position.entry_price) * quantity;
        }
    }
    Ok(NavValuation { nav, pnl })
}

/// Percentage decline of `nav` from `high_water_mark`; zero at or above the mark.
pub fn calculate_drawdown(nav: Decimal, high_water_mark: Decimal) -> Decimal {
    if high_water_mark <= Decimal::ZERO || nav >= high_water_mark {
        return Decimal::ZERO;
    }
    ((high_water_mark - nav) / high_water_mark * ONE_HUNDRED).round_dp(PERCENT_SCALE)
}

/// Derives performance metrics from a NAV history. An empty history yields
/// all-zero metrics.
pub fn calculate_performance_metrics(history: &[NavHistory]) -> PerformanceMetrics {
    let mut rows: Vec<&NavHistory> = history.iter().collect();
    rows.sort_by_key(|row| row.timestamp);

    let (first, last) = match (rows.first(), rows.last()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => return PerformanceMetrics::default(),
    };

    let initial_nav = first.nav;
    let current_nav = last.nav;

    let total_return = if initial_nav > Decimal::ZERO {
        ((current_nav - initial_nav) / initial_nav * ONE_HUNDRED).round_dp(PERCENT_SCALE)
    } else {
        Decimal::ZERO
    };

    let mut high_water_mark = Decimal::ZERO;
    let mut max_drawdown = Decimal::ZERO;
    for row in &rows {
        high_water_mark = high_water_mark.max(row.nav);
        max_drawdown = max_drawdown.max(calculate_drawdown(row.nav, high_water_mark));
    }

    let days_active = (last.timestamp - first.timestamp).num_days();
    let annualized_return = if days_active > 0 {
        (total_return * DAYS_PER_YEAR / Decimal::from(days_active)).round_dp(PERCENT_SCALE)
    } else {
        total_return
    };

    PerformanceMetrics {
        initial_nav,
        current_nav,
        total_return,
        annualized_return,
        max_drawdown,
        current_drawdown: calculate_drawdown(current_nav, high_water_mark),
        high_water_mark,
        days_active,
    }
}
