//! Stateless checks over allocation constraints and computed allocations.
//!
//! `validate_constraints_config` looks at the constraint pair alone and is used
//! by the engine as a gate before constraints are applied. `validate_allocations`
//! inspects a finished allocation set and only produces diagnostics.

use std::collections::HashSet;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::{
    AllocationConstraints, ConstraintViolation, StockAllocation, ValidationResult, ViolationType,
};
use crate::constants::{
    CONCENTRATION_RISK_PERCENT, LOW_ALLOCATION_RATIO_PERCENT, ONE_HUNDRED, PERCENT_SCALE,
};
use crate::strategies::Strategy;

/// Validates the constraint configuration against the investment amount.
pub fn validate_constraints_config(
    constraints: &AllocationConstraints,
    total_investment: Decimal,
) -> ValidationResult {
    let mut violations = Vec::new();

    if total_investment <= Decimal::ZERO {
        violations.push(ConstraintViolation {
            violation_type: ViolationType::ZeroInvestment,
            ticker: None,
            current_value: total_investment,
            limit_value: Decimal::ZERO,
            message: "Total investment must be greater than zero".to_string(),
            suggestions: vec!["Enter a positive investment amount".to_string()],
        });
        return ValidationResult::from_violations(violations);
    }

    let max_percent = constraints.max_allocation_per_stock;
    let min_amount = constraints.min_allocation_amount;

    if max_percent <= Decimal::ZERO || max_percent > ONE_HUNDRED {
        violations.push(ConstraintViolation {
            violation_type: ViolationType::InvalidMaxAllocation,
            ticker: None,
            current_value: max_percent,
            limit_value: ONE_HUNDRED,
            message: format!(
                "Maximum allocation per stock must be between 0 and 100%, got {}%",
                max_percent
            ),
            suggestions: vec!["Use a maximum allocation per stock between 1% and 100%".to_string()],
        });
    } else {
        let cap = constraints.max_allocation_amount(total_investment);
        if min_amount > cap {
            let required_percent = (min_amount / total_investment * ONE_HUNDRED).ceil();
            let mut suggestions = vec![format!(
                "Lower the minimum allocation amount to {} or less",
                cap.round_dp(2)
            )];
            if required_percent <= ONE_HUNDRED {
                suggestions.push(format!(
                    "Raise the maximum allocation per stock to at least {}%",
                    required_percent
                ));
            }
            violations.push(ConstraintViolation {
                violation_type: ViolationType::ConflictingConstraints,
                ticker: None,
                current_value: min_amount,
                limit_value: cap,
                message: format!(
                    "Minimum allocation {} exceeds the per-stock cap of {} ({}% of {}); no stock can qualify",
                    min_amount,
                    cap.round_dp(2),
                    max_percent,
                    total_investment
                ),
                suggestions,
            });
        }
    }

    // Fewer than two stocks could ever receive the minimum.
    if min_amount > Decimal::ZERO && min_amount * dec!(2) > total_investment {
        let limit = total_investment / dec!(2);
        violations.push(ConstraintViolation {
            violation_type: ViolationType::HighMinAllocation,
            ticker: None,
            current_value: min_amount,
            limit_value: limit,
            message: format!(
                "Minimum allocation {} leaves room for fewer than two stocks in {}",
                min_amount, total_investment
            ),
            suggestions: vec![format!(
                "Lower the minimum allocation amount below {} to diversify",
                limit.round_dp(2)
            )],
        });
    }

    ValidationResult::from_violations(violations)
}

/// Checks a finished allocation set against the constraints.
///
/// Findings are diagnostics: the caller decides whether to block or warn.
pub fn validate_allocations(
    allocations: &[StockAllocation],
    constraints: &AllocationConstraints,
    total_investment: Decimal,
) -> ValidationResult {
    let mut violations = Vec::new();

    if total_investment <= Decimal::ZERO {
        violations.push(ConstraintViolation {
            violation_type: ViolationType::ZeroInvestment,
            ticker: None,
            current_value: total_investment,
            limit_value: Decimal::ZERO,
            message: "Total investment must be greater than zero".to_string(),
            suggestions: vec![],
        });
        return ValidationResult::from_violations(violations);
    }

    let cap = constraints.max_allocation_amount(total_investment);
    let min_amount = constraints.min_allocation_amount;

    for allocation in allocations {
        let value = allocation.actual_value;

        if value < min_amount {
            violations.push(ConstraintViolation {
                violation_type: ViolationType::BelowMinimum,
                ticker: Some(allocation.ticker.clone()),
                current_value: value,
                limit_value: min_amount,
                message: format!(
                    "{} is allocated {} which is below the minimum of {}",
                    allocation.ticker, value, min_amount
                ),
                suggestions: vec![
                    format!("Exclude {} from this allocation", allocation.ticker),
                    "Lower the minimum allocation amount".to_string(),
                ],
            });
        }

        if value > cap {
            violations.push(ConstraintViolation {
                violation_type: ViolationType::AboveMaximum,
                ticker: Some(allocation.ticker.clone()),
                current_value: value,
                limit_value: cap,
                message: format!(
                    "{} is allocated {} which is above the cap of {}",
                    allocation.ticker,
                    value,
                    cap.round_dp(2)
                ),
                suggestions: vec![
                    "Add strategies or eligible stocks to spread the investment".to_string(),
                    "Raise the maximum allocation per stock".to_string(),
                ],
            });
        }

        let share = (value / total_investment * ONE_HUNDRED).round_dp(PERCENT_SCALE);
        if share > CONCENTRATION_RISK_PERCENT {
            violations.push(ConstraintViolation {
                violation_type: ViolationType::ConcentrationRisk,
                ticker: Some(allocation.ticker.clone()),
                current_value: share,
                limit_value: CONCENTRATION_RISK_PERCENT,
                message: format!(
                    "{} makes up {}% of the portfolio",
                    allocation.ticker, share
                ),
                suggestions: vec![format!(
                    "Lower the maximum allocation per stock to {}% or less",
                    CONCENTRATION_RISK_PERCENT
                )],
            });
        }
    }

    let allocated: Decimal = allocations.iter().map(|a| a.actual_value).sum();
    let ratio = (allocated / total_investment * ONE_HUNDRED).round_dp(PERCENT_SCALE);
    if ratio < LOW_ALLOCATION_RATIO_PERCENT {
        violations.push(ConstraintViolation {
            violation_type: ViolationType::LowAllocationRatio,
            ticker: None,
            current_value: ratio,
            limit_value: LOW_ALLOCATION_RATIO_PERCENT,
            message: format!(
                "Only {}% of the investment is allocated; constraints are removing most stocks",
                ratio
            ),
            suggestions: vec![
                "Lower the minimum allocation amount".to_string(),
                "Raise the maximum allocation per stock".to_string(),
                "Select strategies with more Buy-signalled stocks".to_string(),
            ],
        });
    }

    ValidationResult::from_violations(violations)
}

/// Produces advisory text for constraints that are likely to starve the allocation.
pub fn suggest_constraint_adjustments(
    strategies: &[Strategy],
    total_investment: Decimal,
    constraints: &AllocationConstraints,
) -> Vec<String> {
    let mut suggestions = Vec::new();

    if total_investment <= Decimal::ZERO {
        suggestions.push("Enter a positive investment amount".to_string());
        return suggestions;
    }

    let min_amount = constraints.min_allocation_amount;
    let cap = constraints.max_allocation_amount(total_investment);

    if min_amount > cap {
        suggestions.push(format!(
            "Minimum allocation {} exceeds the per-stock cap of {}; lower the minimum or raise the maximum percentage",
            min_amount,
            cap.round_dp(2)
        ));
    }

    let eligible: HashSet<&str> = strategies
        .iter()
        .flat_map(|s| s.stocks.iter())
        .filter(|m| m.eligible)
        .map(|m| m.stock_id.as_str())
        .collect();

    if eligible.is_empty() {
        suggestions.push(
            "None of the selected strategies has eligible stocks; mark stocks eligible or choose other strategies"
                .to_string(),
        );
    } else {
        let pool = Decimal::from(eligible.len());
        let equal_share = total_investment / pool;

        if min_amount > equal_share {
            suggestions.push(format!(
                "Minimum allocation {} exceeds the equal share of {} across {} eligible stocks; consider lowering it to {}",
                min_amount,
                equal_share.round_dp(2),
                eligible.len(),
                (equal_share / dec!(2)).round_dp(2)
            ));
        }

        if cap * pool < total_investment {
            suggestions.push(format!(
                "A maximum of {}% per stock cannot absorb the investment across {} eligible stocks; consider raising it to at least {}%",
                constraints.max_allocation_per_stock,
                eligible.len(),
                (ONE_HUNDRED / pool).ceil()
            ));
        }
    }

    if !strategies.is_empty() {
        let count = Decimal::from(strategies.len());
        if min_amount * count > total_investment {
            suggestions.push(format!(
                "Minimum allocation {} is high for {} strategies and an investment of {}; consider lowering it below {}",
                min_amount,
                strategies.len(),
                total_investment,
                (total_investment / count).round_dp(2)
            ));
        }
    }

    suggestions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::{StrategyStock, WeightMode};
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn allocation(ticker: &str, actual: Decimal) -> StockAllocation {
        StockAllocation {
            stock_id: ticker.to_lowercase(),
            ticker: ticker.to_string(),
            name: ticker.to_string(),
            weight: Decimal::ZERO,
            allocation_value: actual,
            price: dec!(1),
            quantity: 0,
            actual_value: actual,
            strategy_contrib: HashMap::new(),
        }
    }

    fn strategy_with_stocks(id: &str, stocks: &[(&str, bool)]) -> Strategy {
        Strategy {
            id: id.to_string(),
            user_id: "u1".to_string(),
            name: id.to_string(),
            weight_mode: WeightMode::Percent,
            weight_value: dec!(50),
            stocks: stocks
                .iter()
                .map(|(stock, eligible)| StrategyStock {
                    strategy_id: id.to_string(),
                    stock_id: stock.to_string(),
                    eligible: *eligible,
                })
                .collect(),
        }
    }

    #[test]
    fn config_accepts_sane_constraints() {
        let result =
            validate_constraints_config(&AllocationConstraints::new(dec!(50), dec!(100)), dec!(10000));
        assert!(result.is_valid);
        assert!(result.violations.is_empty());
    }

    #[test]
    fn config_zero_investment_is_its_own_violation() {
        let result =
            validate_constraints_config(&AllocationConstraints::new(dec!(50), dec!(100)), dec!(0));
        assert!(!result.is_valid);
        assert_eq!(result.violations.len(), 1);
        assert!(result.has(ViolationType::ZeroInvestment));
    }

    #[test]
    fn config_rejects_max_out_of_range() {
        for max in [dec!(0), dec!(-5), dec!(100.01)] {
            let result =
                validate_constraints_config(&AllocationConstraints::new(max, dec!(0)), dec!(10000));
            assert!(result.has(ViolationType::InvalidMaxAllocation), "max {}", max);
        }
        let result =
            validate_constraints_config(&AllocationConstraints::new(dec!(100), dec!(0)), dec!(10000));
        assert!(result.is_valid);
    }

    #[test]
    fn config_detects_conflicting_constraints() {
        // 10% of 10,000 is 1,000 < 1,500
        let result = validate_constraints_config(
            &AllocationConstraints::new(dec!(10), dec!(1500)),
            dec!(10000),
        );
        assert!(result.has(ViolationType::ConflictingConstraints));
        let violation = &result.violations[0];
        assert_eq!(violation.current_value, dec!(1500));
        assert_eq!(violation.limit_value, dec!(1000));
        assert!(violation
            .suggestions
            .iter()
            .any(|s| s.contains("at least 15%")));
    }

    #[test]
    fn config_flags_minimum_that_fits_fewer_than_two_stocks() {
        let result = validate_constraints_config(
            &AllocationConstraints::new(dec!(100), dec!(6000)),
            dec!(10000),
        );
        assert!(result.has(ViolationType::HighMinAllocation));
        assert!(!result.has(ViolationType::ConflictingConstraints));

        let ok = validate_constraints_config(
            &AllocationConstraints::new(dec!(100), dec!(5000)),
            dec!(10000),
        );
        assert!(ok.is_valid);
    }

    #[test]
    fn allocations_report_bounds_with_tickers() {
        let constraints = AllocationConstraints::new(dec!(30), dec!(500));
        let allocations = vec![
            allocation("AAA", dec!(3500)),
            allocation("BBB", dec!(3000)),
            allocation("CCC", dec!(3200)),
            allocation("DDD", dec!(200)),
        ];
        let result = validate_allocations(&allocations, &constraints, dec!(10000));

        assert!(!result.is_valid);
        let above: Vec<_> = result
            .violations
            .iter()
            .filter(|v| v.violation_type == ViolationType::AboveMaximum)
            .collect();
        assert_eq!(above.len(), 2);
        assert!(above.iter().any(|v| v.ticker.as_deref() == Some("AAA")));
        assert!(above.iter().any(|v| v.ticker.as_deref() == Some("CCC")));

        let below: Vec<_> = result
            .violations
            .iter()
            .filter(|v| v.violation_type == ViolationType::BelowMinimum)
            .collect();
        assert_eq!(below.len(), 1);
        assert_eq!(below[0].ticker.as_deref(), Some("DDD"));
        assert!(!result.has(ViolationType::LowAllocationRatio));
    }

    #[test]
    fn allocations_report_low_ratio_and_concentration() {
        let constraints = AllocationConstraints::new(dec!(100), dec!(0));
        let allocations = vec![allocation("AAA", dec!(4500)), allocation("BBB", dec!(1000))];
        let result = validate_allocations(&allocations, &constraints, dec!(10000));

        assert!(result.has(ViolationType::LowAllocationRatio));
        let concentration: Vec<_> = result
            .violations
            .iter()
            .filter(|v| v.violation_type == ViolationType::ConcentrationRisk)
            .collect();
        assert_eq!(concentration.len(), 1);
        assert_eq!(concentration[0].ticker.as_deref(), Some("AAA"));
        assert_eq!(concentration[0].current_value, dec!(45));
    }

    #[test]
    fn suggestions_for_high_minimum() {
        let strategies = vec![
            strategy_with_stocks("s1", &[("a", true), ("b", true)]),
            strategy_with_stocks("s2", &[("c", true), ("d", false)]),
        ];
        let constraints = AllocationConstraints::new(dec!(100), dec!(4000));
        let suggestions = suggest_constraint_adjustments(&strategies, dec!(10000), &constraints);

        assert!(suggestions
            .iter()
            .any(|s| s.contains("equal share") && s.contains("3 eligible stocks")));
    }

    #[test]
    fn suggestions_for_tight_maximum_and_empty_pool() {
        let strategies = vec![strategy_with_stocks("s1", &[("a", true), ("b", true)])];
        let constraints = AllocationConstraints::new(dec!(25), dec!(0));
        let suggestions = suggest_constraint_adjustments(&strategies, dec!(10000), &constraints);
        assert!(suggestions.iter().any(|s| s.contains("at least 50%")));

        let empty = vec![strategy_with_stocks("s1", &[("a", false)])];
        let suggestions = suggest_constraint_adjustments(&empty, dec!(10000), &constraints);
        assert!(suggestions.iter().any(|s| s.contains("no eligible") || s.contains("None")));
    }

    #[test]
    fn no_suggestions_for_comfortable_constraints() {
        let strategies = vec![strategy_with_stocks(
            "s1",
            &[("a", true), ("b", true), ("c", true)],
        )];
        let constraints = AllocationConstraints::new(dec!(50), dec!(100));
        assert!(suggest_constraint_adjustments(&strategies, dec!(10000), &constraints).is_empty());
    }
}
